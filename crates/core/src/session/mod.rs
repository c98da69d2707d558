//! Session state machine and the actor that drives it.

pub mod machine;
pub(crate) mod orchestrator;

pub use machine::{Event, next_status};
