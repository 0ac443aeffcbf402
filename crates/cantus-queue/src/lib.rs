//! Broker adapter for cantus.
//!
//! Exposes [`MemoryBroker`], the in-process implementation of the
//! `TaskQueue` port. Delivery semantics (at-least-once, visibility
//! timeout, bounded in-flight) are documented on the port in
//! `cantus-core`.

pub mod broker;

pub use broker::MemoryBroker;
