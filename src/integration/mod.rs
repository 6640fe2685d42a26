// Copyright 2025 Cowboy AI, LLC.

//! Integration module connecting the event store to in-process reactors
//!
//! Key features:
//! - A process-wide broadcast bus of decoded events
//! - A bridge forwarding every appended event onto the bus

pub mod event_bridge;
pub mod event_bus;

pub use event_bridge::EventBridge;
pub use event_bus::{EventBus, DEFAULT_BUS_CAPACITY};
