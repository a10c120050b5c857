use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

type Runner = Arc<dyn Fn() + Send + Sync>;

/// Maps (process id, action id) to a callback that mutates the persisted
/// state, independent of whether the process that advertised the action is
/// still in the activity registry.
///
/// Registration happens on every poll tick and on every local state change,
/// far more often than invocation, so it is a bare map write. The latest
/// registration for a pair silently replaces the previous one; entries are
/// never expired.
pub struct ActionRunnerRegistry {
    runners: Mutex<HashMap<(String, String), Runner>>,
}

impl Default for ActionRunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn register<F>(&self, process_id: &str, action_id: &str, runner: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut guard = self
            .runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(
            (process_id.to_string(), action_id.to_string()),
            Arc::new(runner),
        );
    }

    /// Fire-and-forget dispatch: unknown pairs are silently ignored. The
    /// runner is cloned out of the map before the call so it may re-register
    /// itself without deadlocking.
    pub fn invoke(&self, process_id: &str, action_id: &str) {
        let runner = {
            let guard = self
                .runners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard
                .get(&(process_id.to_string(), action_id.to_string()))
                .cloned()
        };
        if let Some(runner) = runner {
            runner();
        }
    }

    pub fn len(&self) -> usize {
        self.runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
