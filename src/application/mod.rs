//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers write through the ports with compare-and-swap; query
//! handlers only read.

pub mod effects;
pub mod handlers;

pub use effects::{DispatchStatus, EffectOutcome, SideEffectDispatcher};
pub use handlers::*;
