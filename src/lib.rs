pub mod activity;
pub mod learning;
pub mod panel;
pub mod pomodoro;
pub mod reconcile;
pub mod store;
mod utils;
