//! Core contract for splitstore
//!
//! This crate defines what every storage backend for the experimentation
//! engine must provide:
//! - [`StorageDriver`]: the backend-agnostic operation set
//! - Data model: [`Test`], [`Variation`], [`Assignment`], [`EventCounts`]
//! - [`Error`]: configuration, connection, not-found and storage failures
//! - [`DriverConfig`]: connection target, credentials and retry settings
//! - [`ClientCell`]: lazy, retrying, shared client acquisition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod types;

pub use client::{connector_fn, ClientCell, ConnectionState, Connector, FnConnector, RetryPolicy};
pub use config::{Credentials, DriverConfig, DriverKind, RetryConfig};
pub use driver::StorageDriver;
pub use error::{EntityRef, Error, Result};
pub use types::{
    Assignment, EventCounts, Metadata, NewTest, NewVariation, Test, TestGroup, TestId, Timestamp,
    Variation, VariationId, MAX_ID_LEN,
};
