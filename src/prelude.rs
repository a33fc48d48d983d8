//! Convenient imports for splitstore.
//!
//! ```ignore
//! use splitstore::prelude::*;
//!
//! let store = Splitstore::builder().memory("experiments").open()?;
//! store.ensure_test(&NewTest::new("t1"))?;
//! ```

// Main entry point
pub use crate::store::{Splitstore, SplitstoreBuilder};

// Error handling
pub use splitstore_core::{Error, Result};

// Contract
pub use splitstore_core::StorageDriver;

// Configuration
pub use crate::types::{DriverConfig, DriverKind, RetryConfig};

// Data model
pub use crate::types::{
    Assignment, EventCounts, NewTest, NewVariation, Test, TestGroup, TestId, Variation,
    VariationId, VariationStats,
};
