use std::sync::RwLock;

use tokio::sync::watch;

use super::process::ActivityProcess;

/// Process-wide registry of current activity processes, ordered by first
/// insertion. Created once at startup and never torn down; page-scoped
/// tools come and go, the registry stays.
///
/// Subscribers get a revision bump through a watch channel whenever the
/// list changes, so the panel can re-render without polling the registry
/// itself.
pub struct ActivityRegistry {
    processes: RwLock<Vec<ActivityProcess>>,
    revision: watch::Sender<u64>,
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            processes: RwLock::new(Vec::new()),
            revision,
        }
    }

    /// Insert a new process or merge onto the existing entry with the same
    /// id. Always succeeds; order is preserved on merge.
    pub fn upsert(&self, process: ActivityProcess) {
        {
            let mut guard = self
                .processes
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match guard.iter_mut().find(|p| p.id == process.id) {
                Some(existing) => existing.merge_from(process),
                None => guard.push(process),
            }
        }
        self.bump();
    }

    /// Remove by id. Absent ids are a no-op, not an error.
    pub fn remove(&self, id: &str) {
        let removed = {
            let mut guard = self
                .processes
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let before = guard.len();
            guard.retain(|p| p.id != id);
            guard.len() != before
        };
        if removed {
            self.bump();
        }
    }

    /// Full reset. Not part of the normal tool lifecycle.
    pub fn clear(&self) {
        {
            let mut guard = self
                .processes
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clear();
        }
        self.bump();
    }

    /// Snapshot copy of the current list, safe to iterate while writers
    /// keep mutating the registry.
    pub fn list(&self) -> Vec<ActivityProcess> {
        self.processes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.processes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}
