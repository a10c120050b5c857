use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use crate::activity::{
    ActivityProcess, ActivityRegistry, ActionRunnerRegistry, MetaValue, ProcessKind,
};
use crate::store::{keys, KvStore};

/// The floating panel: a terminal rendering of the activity registry plus
/// the open/collapsed flag, which is persisted so every process agrees on
/// whether the panel is expanded.
pub struct ActivityPanel {
    store: KvStore,
    registry: Arc<ActivityRegistry>,
    runners: Arc<ActionRunnerRegistry>,
}

impl ActivityPanel {
    pub fn new(
        store: KvStore,
        registry: Arc<ActivityRegistry>,
        runners: Arc<ActionRunnerRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            runners,
        }
    }

    /// Collapsed is the default for a flag that was never written.
    pub fn is_open(&self) -> bool {
        self.store
            .get(keys::ACTIVITY_PANEL_OPEN)
            .map(|v| v == "1")
            .unwrap_or(false)
    }

    pub fn set_open(&self, open: bool) {
        self.store
            .set(keys::ACTIVITY_PANEL_OPEN, if open { "1" } else { "0" });
    }

    /// Forward a button press to whatever runner is currently registered
    /// for the pair. Unknown pairs are ignored.
    pub fn invoke(&self, process_id: &str, action_id: &str) {
        self.runners.invoke(process_id, action_id);
    }

    pub fn render(&self) -> String {
        let processes = self.registry.list();

        if !self.is_open() {
            return format!("Activity ({}) [collapsed]\n", processes.len());
        }

        let mut out = format!("Activity ({})\n", processes.len());
        if processes.is_empty() {
            out.push_str("  No running processes.\n");
            return out;
        }
        for process in &processes {
            render_card(&mut out, process);
        }
        out
    }
}

fn render_card(out: &mut String, process: &ActivityProcess) {
    let kind_tag = match process.kind {
        ProcessKind::Timer => "Pomodoro",
        ProcessKind::Media => "Media",
        ProcessKind::Generic => {
            // The task tracker is the only generic contributor today; its
            // processes carry a task number.
            if meta_number(process, "number").is_some() {
                "Learning"
            } else {
                "Activity"
            }
        }
    };

    let _ = writeln!(
        out,
        "  [{kind_tag}] {}  ({}, {})",
        process.label,
        process.status.as_deref().unwrap_or("unknown"),
        format_updated(process.updated_at),
    );

    match process.kind {
        ProcessKind::Timer => {
            let seconds_left = meta_number(process, "secondsLeft").unwrap_or(0.0) as i64;
            let mode = meta_text(process, "mode").unwrap_or("work");
            let _ = writeln!(out, "    {}  {mode}", format_mm_ss(seconds_left));
        }
        ProcessKind::Media => {
            if let Some(title) = meta_text(process, "title") {
                let _ = writeln!(out, "    {title}");
            }
            let position = meta_number(process, "positionSec").unwrap_or(0.0);
            let duration = meta_number(process, "durationSec").unwrap_or(0.0);
            if duration > 0.0 {
                let _ = writeln!(out, "    {}", progress_bar(position / duration));
            }
        }
        ProcessKind::Generic => {
            let elapsed_ms = meta_number(process, "elapsedMs").unwrap_or(0.0) as i64;
            let mut line = format!("    {}", format_hms(elapsed_ms / 1000));
            if let Some(category) = meta_text(process, "category") {
                let _ = write!(line, "  {category}");
            }
            if let Some(urgency) = meta_text(process, "urgency") {
                let _ = write!(line, "  {urgency}");
            }
            let _ = writeln!(out, "{line}");
        }
    }

    if let Some(actions) = &process.actions {
        if !actions.is_empty() {
            let buttons: Vec<String> = actions
                .iter()
                .map(|a| format!("[{}]", a.label))
                .collect();
            let _ = writeln!(out, "    {}", buttons.join(" "));
        }
    }
}

fn meta_number(process: &ActivityProcess, key: &str) -> Option<f64> {
    process
        .meta
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(MetaValue::as_number)
}

fn meta_text<'a>(process: &'a ActivityProcess, key: &str) -> Option<&'a str> {
    process
        .meta
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(MetaValue::as_text)
}

fn format_updated(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

pub fn format_mm_ss(total_sec: i64) -> String {
    let total_sec = total_sec.max(0);
    format!("{:02}:{:02}", total_sec / 60, total_sec % 60)
}

pub fn format_hms(total_sec: i64) -> String {
    let total_sec = total_sec.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total_sec / 3600,
        (total_sec % 3600) / 60,
        total_sec % 60
    )
}

fn progress_bar(fraction: f64) -> String {
    const WIDTH: usize = 20;
    let filled = ((fraction.clamp(0.0, 1.0)) * WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActionKind, ActivityAction, ActivityMeta};

    fn panel() -> ActivityPanel {
        ActivityPanel::new(
            KvStore::open_in_memory().unwrap(),
            Arc::new(ActivityRegistry::new()),
            Arc::new(ActionRunnerRegistry::new()),
        )
    }

    fn timer_process() -> ActivityProcess {
        let mut meta = ActivityMeta::new();
        meta.insert("secondsLeft".into(), 125_i64.into());
        meta.insert("mode".into(), "work".into());
        ActivityProcess {
            id: "pomodoro-main".into(),
            kind: ProcessKind::Timer,
            label: "Pomodoro Timer".into(),
            status: Some("running".into()),
            meta: Some(meta),
            actions: Some(vec![
                ActivityAction {
                    id: "toggle".into(),
                    label: "Pause".into(),
                    kind: ActionKind::Primary,
                },
                ActivityAction {
                    id: "reset".into(),
                    label: "Reset".into(),
                    kind: ActionKind::Secondary,
                },
            ]),
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn open_flag_defaults_to_collapsed_and_round_trips() {
        let panel = panel();
        assert!(!panel.is_open());

        panel.set_open(true);
        assert!(panel.is_open());
        panel.set_open(false);
        assert!(!panel.is_open());
    }

    #[test]
    fn collapsed_render_is_a_single_summary_line() {
        let panel = panel();
        panel.registry.upsert(timer_process());

        let rendered = panel.render();
        assert_eq!(rendered, "Activity (1) [collapsed]\n");
    }

    #[test]
    fn open_render_shows_timer_countdown_and_buttons() {
        let panel = panel();
        panel.set_open(true);
        panel.registry.upsert(timer_process());

        let rendered = panel.render();
        assert!(rendered.contains("[Pomodoro] Pomodoro Timer"));
        assert!(rendered.contains("running"));
        assert!(rendered.contains("02:05  work"));
        assert!(rendered.contains("[Pause] [Reset]"));
    }

    #[test]
    fn open_render_with_nothing_running_says_so() {
        let panel = panel();
        panel.set_open(true);
        assert!(panel.render().contains("No running processes."));
    }

    #[test]
    fn generic_process_with_task_number_is_tagged_learning() {
        let panel = panel();
        panel.set_open(true);

        let mut meta = ActivityMeta::new();
        meta.insert("number".into(), 3_u32.into());
        meta.insert("elapsedMs".into(), 90_000_i64.into());
        meta.insert("category".into(), "cs".into());
        panel.registry.upsert(ActivityProcess {
            id: "learning-active-task".into(),
            kind: ProcessKind::Generic,
            label: "Read paper".into(),
            status: Some("running".into()),
            meta: Some(meta),
            actions: None,
            updated_at: 1_700_000_000_000,
        });

        let rendered = panel.render();
        assert!(rendered.contains("[Learning] Read paper"));
        assert!(rendered.contains("00:01:30  cs"));
    }

    #[test]
    fn invoke_routes_to_the_runner_registry() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let panel = panel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        panel.runners.register("pomodoro-main", "toggle", move || {
            flag.store(true, Ordering::SeqCst);
        });

        panel.invoke("pomodoro-main", "toggle");
        assert!(fired.load(Ordering::SeqCst));

        // Unknown pairs fall through silently.
        panel.invoke("ghost", "toggle");
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_mm_ss(125), "02:05");
        assert_eq!(format_mm_ss(-3), "00:00");
        assert_eq!(format_hms(3_725), "01:02:05");
    }
}
