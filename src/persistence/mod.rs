// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Event-sourced persistence for aggregates. A repository replays an
//! aggregate's stream to rebuild it and appends its pending events on save.
//!
//! ## Components
//!
//! - **Aggregate Repository**: load, find and save aggregates of one type

pub mod aggregate_repository;

pub use aggregate_repository::{AggregateRepository, IdOrAggregate};
