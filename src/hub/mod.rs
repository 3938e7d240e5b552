//! The connection hub.
//!
//! A single [`Broker`] task owns the registry of live connections. Every
//! other task holds a [`HubHandle`] and submits Add, Remove and Error events
//! over channels; nothing else reads or writes the map.
//!
//! - Add is bounded (`hub.addcapacity`, default 5) and applies backpressure
//!   to the accepting path when full.
//! - Remove and Error are single-slot and complete once the loop takes them.
//! - A broadcast shutdown signal closes registered connections and drains
//!   their removals before the loop exits.

mod broker;
mod registry;

pub use broker::{Broker, DrainReport, HubConfig, HubHandle};
pub use registry::{HubEvent, HubSnapshot, Registry, TRACE_TARGET};
