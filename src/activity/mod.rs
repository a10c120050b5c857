pub mod process;
pub mod registry;
pub mod runners;

pub use process::{ActionKind, ActivityAction, ActivityMeta, ActivityProcess, MetaValue, ProcessKind};
pub use registry::ActivityRegistry;
pub use runners::ActionRunnerRegistry;
