use chrono::Utc;

use crate::activity::{
    ActionKind, ActivityAction, ActivityMeta, ActivityProcess, ActivityRegistry,
    ActionRunnerRegistry, ProcessKind,
};
use crate::pomodoro::PomodoroSnapshot;
use crate::store::KvStore;

pub const POMODORO_PROCESS_ID: &str = "pomodoro-main";

/// One reconcile pass for the timer half.
///
/// Reads the persisted snapshot and derives the timer's activity process.
/// A missing or malformed snapshot, or one without configured durations,
/// means the timer was never initialized: the pass skips without touching
/// the registry (no removal either, per the lifecycle contract).
pub fn reconcile_pomodoro(
    now_ms: i64,
    store: &KvStore,
    registry: &ActivityRegistry,
    runners: &ActionRunnerRegistry,
) {
    let Some(mut snapshot) = PomodoroSnapshot::load(store) else {
        return;
    };
    if !snapshot.has_required_durations() {
        return;
    }

    // Replay any work/break transitions missed while nothing was ticking,
    // and persist them so every reader agrees on the new target.
    if snapshot.advance_cycles(now_ms) {
        snapshot.save(store);
    }

    let seconds_left = snapshot.seconds_left(now_ms);
    let status = if snapshot.is_running { "running" } else { "paused" };
    let toggle_label = if snapshot.is_running { "Pause" } else { "Resume" };

    let mut meta = ActivityMeta::new();
    meta.insert("secondsLeft".into(), seconds_left.into());
    meta.insert("mode".into(), snapshot.mode.as_str().into());

    registry.upsert(ActivityProcess {
        id: POMODORO_PROCESS_ID.into(),
        kind: ProcessKind::Timer,
        label: "Pomodoro Timer".into(),
        status: Some(status.into()),
        meta: Some(meta),
        actions: Some(vec![
            ActivityAction {
                id: "toggle".into(),
                label: toggle_label.into(),
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

    // Refresh the runners every tick. Each one re-reads the snapshot at
    // invocation time rather than closing over this tick's copy, so a
    // button press always acts on the latest persisted state.
    let toggle_store = store.clone();
    runners.register(POMODORO_PROCESS_ID, "toggle", move || {
        let Some(mut snapshot) = PomodoroSnapshot::load(&toggle_store) else {
            return;
        };
        snapshot.toggle(Utc::now().timestamp_millis());
        snapshot.save(&toggle_store);
    });

    let reset_store = store.clone();
    runners.register(POMODORO_PROCESS_ID, "reset", move || {
        let Some(mut snapshot) = PomodoroSnapshot::load(&reset_store) else {
            return;
        };
        snapshot.reset();
        snapshot.save(&reset_store);
    });
}
