//! Application use cases / business logic

pub mod compose;
pub mod registry;
pub mod run_loop;

#[cfg(test)]
pub(crate) mod fakes;

pub use compose::{ComposeConfig, ComposeConfigError, PostComposer, ordinal};
pub use registry::{ChangeRegistry, local_midnight};
pub use run_loop::{RunLoop, RunLoopConfig, RunLoopError};
