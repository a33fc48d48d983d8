//! Storage drivers for splitstore
//!
//! This crate implements the [`StorageDriver`] contract for concrete backends:
//! - [`MemoryDriver`]: sharded in-process key-value store with atomic counters
//! - [`SqliteDriver`]: relational store with unique-constraint inserts
//!   (`sqlite` feature, on by default)
//! - [`open_driver`]: selects and builds a driver from a [`DriverConfig`]
//!
//! [`StorageDriver`]: splitstore_core::StorageDriver
//! [`DriverConfig`]: splitstore_core::DriverConfig

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use factory::open_driver;
pub use memory::{drop_namespace, MemoryBackend, MemoryDriver, NamespaceConnector};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnector, SqliteDriver};
