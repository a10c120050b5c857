use chrono::Utc;

use crate::activity::{
    ActionKind, ActivityAction, ActivityMeta, ActivityProcess, ActivityRegistry,
    ActionRunnerRegistry, ProcessKind,
};
use crate::learning::{self, LearningTask};
use crate::store::{keys, KvStore};

pub const LEARNING_PROCESS_ID: &str = "learning-active-task";

/// One reconcile pass for the task-tracker half.
///
/// The tracker contributes a single activity process, the currently running
/// task. No active-id marker, an unparsable task list, a dangling id, or a
/// task that stopped running all mean there is nothing active: the process
/// is removed. A marker pointing at data that fails to parse is the only
/// case treated as transient, it neither updates nor removes.
pub fn reconcile_learning(
    now_ms: i64,
    store: &KvStore,
    registry: &ActivityRegistry,
    runners: &ActionRunnerRegistry,
) {
    let Some(active_id) = learning::active_task_id(store) else {
        registry.remove(LEARNING_PROCESS_ID);
        return;
    };

    if store.get(keys::LEARNING_TASKS).is_some()
        && store
            .get_json::<Vec<LearningTask>>(keys::LEARNING_TASKS)
            .is_none()
    {
        // Corrupt task list: leave the last known process in place and let
        // a later write repair it.
        return;
    }

    let tasks = learning::load_tasks(store).unwrap_or_default();
    let Some(task) = tasks.iter().find(|t| t.id == active_id && t.running) else {
        registry.remove(LEARNING_PROCESS_ID);
        return;
    };

    let mut meta = ActivityMeta::new();
    meta.insert("number".into(), task.number.into());
    meta.insert("elapsedMs".into(), (task.elapsed_ms(now_ms) as f64).into());
    if let Some(category) = &task.category {
        meta.insert("category".into(), category.as_str().into());
    }
    if let Some(urgency) = &task.urgency {
        meta.insert("urgency".into(), urgency.as_str().into());
    }

    registry.upsert(ActivityProcess {
        id: LEARNING_PROCESS_ID.into(),
        kind: ProcessKind::Generic,
        label: task.display_label(),
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
        updated_at: now_ms,
    });

    // Runners close over the store, not this tick's task list: the list and
    // the active id are re-read when the button fires.
    let toggle_store = store.clone();
    let toggle_id = active_id.clone();
    runners.register(LEARNING_PROCESS_ID, "toggle", move || {
        let Some(mut tasks) = learning::load_tasks(&toggle_store) else {
            return;
        };
        let still_running =
            learning::toggle_task(&mut tasks, &toggle_id, Utc::now().timestamp_millis());
        learning::save_tasks(&toggle_store, &tasks);
        if !still_running {
            toggle_store.remove(keys::LEARNING_ACTIVE_ID);
        }
    });

    let reset_store = store.clone();
    let reset_id = active_id;
    runners.register(LEARNING_PROCESS_ID, "reset", move || {
        let Some(mut tasks) = learning::load_tasks(&reset_store) else {
            return;
        };
        learning::reset_task(&mut tasks, &reset_id);
        learning::save_tasks(&reset_store, &tasks);
        reset_store.remove(keys::LEARNING_ACTIVE_ID);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MetaValue;

    fn setup() -> (KvStore, ActivityRegistry, ActionRunnerRegistry) {
        (
            KvStore::open_in_memory().unwrap(),
            ActivityRegistry::new(),
            ActionRunnerRegistry::new(),
        )
    }

    fn running_task(id: &str, number: u32, total_ms: i64, started_at: i64) -> LearningTask {
        LearningTask {
            id: id.into(),
            number,
            name: "Read paper".into(),
            category: Some("cs".into()),
            urgency: Some("high".into()),
            links: None,
            total_ms,
            running: true,
            started_at: Some(started_at),
        }
    }

    #[test]
    fn running_task_yields_a_process_with_live_elapsed_time() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        learning::save_tasks(&store, &[running_task("t1", 1, 60_000, now - 30_000)]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");

        reconcile_learning(now, &store, &registry, &runners);

        let list = registry.list();
        assert_eq!(list.len(), 1);
        let process = &list[0];
        assert_eq!(process.id, LEARNING_PROCESS_ID);
        assert_eq!(process.kind, ProcessKind::Generic);
        assert_eq!(process.label, "Read paper");
        assert_eq!(process.status.as_deref(), Some("running"));

        let meta = process.meta.as_ref().unwrap();
        assert_eq!(meta.get("elapsedMs").and_then(MetaValue::as_number), Some(90_000.0));
        assert_eq!(meta.get("number").and_then(MetaValue::as_number), Some(1.0));
        assert_eq!(
            meta.get("category").and_then(MetaValue::as_text),
            Some("cs")
        );
    }

    #[test]
    fn missing_active_id_removes_the_process() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        learning::save_tasks(&store, &[running_task("t1", 1, 0, now)]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");
        reconcile_learning(now, &store, &registry, &runners);
        assert_eq!(registry.len(), 1);

        store.remove(keys::LEARNING_ACTIVE_ID);
        reconcile_learning(now + 1_000, &store, &registry, &runners);
        assert!(registry.is_empty());
    }

    #[test]
    fn dangling_or_stopped_task_removes_the_process() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        // Marker points at a task that does not exist.
        learning::save_tasks(&store, &[running_task("t1", 1, 0, now)]);
        store.set(keys::LEARNING_ACTIVE_ID, "ghost");
        reconcile_learning(now, &store, &registry, &runners);
        assert!(registry.is_empty());

        // Marker points at a task that is no longer running.
        let mut tasks = vec![running_task("t1", 1, 0, now)];
        learning::pause_task(&mut tasks, "t1", now);
        learning::save_tasks(&store, &tasks);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");
        reconcile_learning(now, &store, &registry, &runners);
        assert!(registry.is_empty());
    }

    #[test]
    fn corrupt_task_list_leaves_the_last_known_process_alone() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        learning::save_tasks(&store, &[running_task("t1", 1, 0, now - 10_000)]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");
        reconcile_learning(now, &store, &registry, &runners);
        assert_eq!(registry.len(), 1);

        store.set(keys::LEARNING_TASKS, "{ not json");
        reconcile_learning(now + 1_000, &store, &registry, &runners);
        assert_eq!(registry.len(), 1, "transient corruption must not evict");
    }

    #[test]
    fn toggle_runner_pauses_the_task_and_clears_the_marker() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        learning::save_tasks(&store, &[running_task("t1", 1, 60_000, now - 30_000)]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");
        reconcile_learning(now, &store, &registry, &runners);

        runners.invoke(LEARNING_PROCESS_ID, "toggle");

        let tasks = learning::load_tasks(&store).unwrap();
        assert!(!tasks[0].running);
        assert!(tasks[0].total_ms >= 90_000);
        assert_eq!(learning::active_task_id(&store), None);

        // The next pass notices and drops the process.
        reconcile_learning(now + 1_000, &store, &registry, &runners);
        assert!(registry.is_empty());
    }

    #[test]
    fn reset_runner_zeroes_the_task_and_clears_the_marker() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        learning::save_tasks(&store, &[running_task("t1", 1, 60_000, now - 30_000)]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");
        reconcile_learning(now, &store, &registry, &runners);

        runners.invoke(LEARNING_PROCESS_ID, "reset");

        let tasks = learning::load_tasks(&store).unwrap();
        assert!(!tasks[0].running);
        assert_eq!(tasks[0].total_ms, 0);
        assert_eq!(learning::active_task_id(&store), None);
    }

    #[test]
    fn unnamed_task_gets_a_numbered_label() {
        let (store, registry, runners) = setup();
        let now = 1_700_000_000_000;

        let mut task = running_task("t1", 7, 0, now);
        task.name = String::new();
        learning::save_tasks(&store, &[task]);
        store.set(keys::LEARNING_ACTIVE_ID, "t1");

        reconcile_learning(now, &store, &registry, &runners);
        assert_eq!(registry.list()[0].label, "Task #7");
    }
}
