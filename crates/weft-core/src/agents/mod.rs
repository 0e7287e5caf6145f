//! Agent registry.
//!
//! Agents are configured personas around a text-generation model. The
//! registry validates them against the generator and hands out immutable
//! snapshots to executions.

pub mod registry;

pub use registry::{AgentRegistry, AgentSnapshot};
