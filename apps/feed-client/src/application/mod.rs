//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the subscription runtime, the public feed facade
//! and the port interface that defines how they talk to the transport.

/// Port interfaces for the transport collaborator.
pub mod ports;

/// Application services for subscriptions, bounded queries and replay.
pub mod services;
