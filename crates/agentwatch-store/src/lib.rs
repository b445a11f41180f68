//! Agentwatch Event Store
//!
//! SQLite persistence for hook events, metric rows, and sessions. One
//! durable table per entity plus the session aggregate fields, updated in
//! the same transaction as the metric write that triggers them.

mod events;
mod metrics;
mod sessions;
mod store;

pub use store::EventStore;
