//! Public types for the splitstore facade.
//!
//! This module re-exports the data model from the core crate and adds the
//! aggregate views the facade returns.

pub use splitstore_core::{
    Assignment, ConnectionState, Credentials, DriverConfig, DriverKind, EntityRef, EventCounts,
    Metadata, NewTest, NewVariation, RetryConfig, RetryPolicy, Test, TestGroup, TestId,
    Timestamp, Variation, VariationId,
};

use serde::Serialize;

/// A variation together with its counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationStats {
    /// The variation
    pub variation: Variation,
    /// Its pageviews and wins
    pub counts: EventCounts,
}
