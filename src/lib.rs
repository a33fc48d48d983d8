//! # Splitstore
//!
//! Pluggable storage for A/B testing experiments.
//!
//! The experimentation engine talks to one [`StorageDriver`] contract; which
//! backend sits behind it is decided by configuration at startup.
//!
//! ## Quick Start
//!
//! ```ignore
//! use splitstore::prelude::*;
//!
//! // Build a store (no connection yet)
//! let store = Splitstore::open(&DriverConfig::sqlite("./experiments.db"))?;
//!
//! // Fail fast if the backend is unreachable
//! store.connect(3)?;
//!
//! // Register an experiment; safe to repeat on every startup
//! store.ensure_experiment(
//!     &NewTest::new("checkout-button"),
//!     &[NewVariation::new("green"), NewVariation::new("blue")],
//! )?;
//!
//! // Analytics never fail the request path
//! store.record_pageview(&Assignment::new("checkout-button", "green"));
//! store.record_win("checkout-button", "green");
//! ```
//!
//! ## Drivers
//!
//! - [`MemoryDriver`] - in-process key-value namespaces
//! - [`SqliteDriver`] - relational storage in a SQLite file
//!
//! ## Error Policy
//!
//! | Operation | On failure |
//! |-----------|------------|
//! | `open`, `connect` | Returned; engines should refuse to start |
//! | `tests`, `variations`, `ensure_*` | Returned to the caller |
//! | `record_pageview`, `record_win` | Logged with `tracing`, event dropped |

#![warn(missing_docs)]

mod store;
mod types;

pub mod prelude;

// Re-export main entry points
pub use store::{Splitstore, SplitstoreBuilder};
pub use splitstore_core::{connector_fn, ClientCell, Connector, Error, Result, StorageDriver};

// Re-export drivers
pub use splitstore_storage::{open_driver, MemoryBackend, MemoryDriver, NamespaceConnector};
#[cfg(feature = "sqlite")]
pub use splitstore_storage::{SqliteConnector, SqliteDriver};

// Re-export types
pub use types::*;
