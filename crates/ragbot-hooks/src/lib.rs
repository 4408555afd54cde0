//! ragbot-hooks: Pipeline events and the registry components report them through.
//!
//! Core components never log through a global; they are handed an
//! `Arc<HookRegistry>` and emit typed [`RagEvent`]s. The binary decides what
//! happens with them (usually [`HookRegistry::with_tracing`]).

pub mod events;
pub mod registry;

pub use events::RagEvent;
pub use registry::{HookHandler, HookRegistry};
