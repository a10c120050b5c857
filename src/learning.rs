use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{keys, KvStore};

/// One tracked task. `total_ms` accumulates finished runs; while running,
/// the live elapsed time is `total_ms` plus the span since `started_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearningTask {
    pub id: String,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<String>,
    #[serde(default)]
    pub total_ms: i64,
    #[serde(default)]
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
}

impl LearningTask {
    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        match (self.running, self.started_at) {
            (true, Some(started_at)) => self.total_ms + (now_ms - started_at),
            _ => self.total_ms,
        }
    }

    /// Label shown in the panel: the task name, or a numbered placeholder
    /// for unnamed rows.
    pub fn display_label(&self) -> String {
        if self.name.is_empty() {
            format!("Task #{}", self.number)
        } else {
            self.name.clone()
        }
    }

    fn stop(&mut self, now_ms: i64) {
        if let (true, Some(started_at)) = (self.running, self.started_at) {
            self.total_ms += now_ms - started_at;
        }
        self.running = false;
        self.started_at = None;
    }
}

pub fn load_tasks(store: &KvStore) -> Option<Vec<LearningTask>> {
    store.get_json(keys::LEARNING_TASKS)
}

pub fn save_tasks(store: &KvStore, tasks: &[LearningTask]) {
    store.set_json(keys::LEARNING_TASKS, &tasks);
}

pub fn active_task_id(store: &KvStore) -> Option<String> {
    store.get(keys::LEARNING_ACTIVE_ID)
}

/// Start one task and stop every other running task in the same write.
/// At most one task runs system-wide.
pub fn start_task(tasks: &mut [LearningTask], id: &str, now_ms: i64) {
    for task in tasks.iter_mut() {
        if task.id == id {
            if !task.running {
                task.running = true;
                task.started_at = Some(now_ms);
            }
        } else {
            task.stop(now_ms);
        }
    }
}

pub fn pause_task(tasks: &mut [LearningTask], id: &str, now_ms: i64) {
    for task in tasks.iter_mut() {
        if task.id == id {
            task.stop(now_ms);
        }
    }
}

pub fn reset_task(tasks: &mut [LearningTask], id: &str) {
    for task in tasks.iter_mut() {
        if task.id == id {
            task.total_ms = 0;
            task.running = false;
            task.started_at = None;
        }
    }
}

/// The action-runner semantic: flip the given task between running and
/// stopped, and stop every other running task either way. Returns whether
/// the task is running after the write, so callers know to clear the
/// active-id marker.
pub fn toggle_task(tasks: &mut [LearningTask], id: &str, now_ms: i64) -> bool {
    let mut still_running = false;
    for task in tasks.iter_mut() {
        if task.id == id {
            if task.running {
                task.stop(now_ms);
            } else {
                task.running = true;
                task.started_at = Some(now_ms);
                still_running = true;
            }
        } else {
            task.stop(now_ms);
        }
    }
    still_running
}

// ---------- Markdown task table ----------

const TABLE_HEADER: &str = "| No. | Task name | Cat | Urgency | Links | Duration |";
const TABLE_SEPARATOR: &str = "| --- | --------- | --- | ------- | ----- | -------- |";

/// Parse a markdown task table into tasks. Rows are matched to `existing`
/// by number so accumulated time and running state survive a re-import; the
/// duration column is ignored on input (it is derived from tracking).
pub fn parse_table(raw: &str, existing: &[LearningTask]) -> Vec<LearningTask> {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut tasks = Vec::new();
    // Skip header and separator.
    for line in lines.iter().skip(2) {
        if !line.starts_with('|') {
            continue;
        }
        let cols: Vec<&str> = line.split('|').map(str::trim).collect();
        if cols.len() < 7 {
            continue;
        }
        let Ok(number) = cols[1].parse::<u32>() else {
            continue;
        };
        if number == 0 {
            continue;
        }

        let previous = existing.iter().find(|t| t.number == number);
        tasks.push(LearningTask {
            id: previous
                .map(|t| t.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            number,
            name: cols[2].to_string(),
            category: non_empty(cols[3]),
            urgency: non_empty(cols[4]),
            links: non_empty(cols[5]),
            total_ms: previous.map(|t| t.total_ms).unwrap_or(0),
            running: previous.map(|t| t.running).unwrap_or(false),
            started_at: previous.and_then(|t| t.started_at),
        });
    }
    tasks
}

/// Render the tasks back into the table shape, with live durations.
pub fn export_table(tasks: &[LearningTask], now_ms: i64) -> String {
    let mut sorted: Vec<&LearningTask> = tasks.iter().collect();
    sorted.sort_by_key(|t| t.number);

    let mut lines = vec![TABLE_HEADER.to_string(), TABLE_SEPARATOR.to_string()];
    for task in sorted {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            task.number,
            task.name,
            task.category.as_deref().unwrap_or(""),
            task.urgency.as_deref().unwrap_or(""),
            task.links.as_deref().unwrap_or(""),
            format_duration(task.elapsed_ms(now_ms)),
        ));
    }
    lines.join("\n")
}

pub fn format_duration(ms: i64) -> String {
    let total_sec = (ms / 1000).max(0);
    let hours = total_sec / 3600;
    let minutes = (total_sec % 3600) / 60;
    let seconds = total_sec % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
