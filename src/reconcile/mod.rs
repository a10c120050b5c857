pub mod controller;
mod learning;
mod pomodoro;

pub use controller::Reconciler;
pub use learning::{reconcile_learning, LEARNING_PROCESS_ID};
pub use pomodoro::{reconcile_pomodoro, POMODORO_PROCESS_ID};
