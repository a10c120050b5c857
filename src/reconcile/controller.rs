use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::info;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::activity::{ActionRunnerRegistry, ActivityRegistry};
use crate::store::KvStore;

use super::{reconcile_learning, reconcile_pomodoro};

const POLL_INTERVAL_MS: u64 = 1000;
const ENABLE_TICK_LOGS: bool = false;

/// Owns the reconcile loop: every second it re-reads the persisted state and
/// rebuilds the activity registry from it. Cloning shares the loop; a second
/// `spawn` replaces the previous one.
#[derive(Clone)]
pub struct Reconciler {
    store: KvStore,
    registry: Arc<ActivityRegistry>,
    runners: Arc<ActionRunnerRegistry>,
    ticker: Arc<Mutex<Option<(CancellationToken, JoinHandle<()>)>>>,
}

impl Reconciler {
    pub fn new(
        store: KvStore,
        registry: Arc<ActivityRegistry>,
        runners: Arc<ActionRunnerRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            runners,
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }

    pub fn runners(&self) -> &Arc<ActionRunnerRegistry> {
        &self.runners
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// One synchronous reconcile pass at the given timestamp. The ticker
    /// calls this every second; commands that just mutated the store call it
    /// directly so the registry reflects the change without waiting a tick.
    pub fn tick(&self, now_ms: i64) {
        reconcile_pomodoro(now_ms, &self.store, &self.registry, &self.runners);
        reconcile_learning(now_ms, &self.store, &self.registry, &self.runners);
        crate::tick_log!(
            "reconciled {} process(es) at {}",
            self.registry.len(),
            now_ms
        );
    }

    /// Start the 1s polling loop. Replaces any previous loop.
    pub async fn spawn(&self) {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let worker = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        worker.tick(Utc::now().timestamp_millis());
                    }
                }
            }
        });

        let mut guard = self.ticker.lock().await;
        if let Some((old_token, old_handle)) = guard.take() {
            old_token.cancel();
            old_handle.abort();
        }
        *guard = Some((cancel_token, handle));
        info!("reconcile loop started ({POLL_INTERVAL_MS}ms interval)");
    }

    pub async fn shutdown(&self) {
        let mut guard = self.ticker.lock().await;
        if let Some((token, handle)) = guard.take() {
            token.cancel();
            let _ = handle.await;
            info!("reconcile loop stopped");
        }
    }
}
