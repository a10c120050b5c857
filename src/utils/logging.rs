//! Per-tick trace logging for the polling loops.
//!
//! The reconcile loop fires every second, so unconditional logging would
//! drown everything else. Modules that tick define a local flag and route
//! their chatter through this macro:
//!
//! ```text
//! const ENABLE_TICK_LOGS: bool = false;
//!
//! tick_log!("reconciled {} processes", count);
//! ```

/// Debug-level logging gated on a module-level `ENABLE_TICK_LOGS` const.
#[macro_export]
macro_rules! tick_log {
    ($($arg:tt)*) => {
        if ENABLE_TICK_LOGS {
            log::debug!($($arg)*);
        }
    };
}
