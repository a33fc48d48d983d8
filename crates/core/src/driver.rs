//! The storage driver contract.
//!
//! Every backend implements [`StorageDriver`]. The experimentation engine
//! only ever talks to this trait, so swapping a key-value backend for a
//! relational one never touches bucketing logic.
//!
//! ## Guarantees every implementation upholds
//!
//! | Operation | Guarantee |
//! |-----------|-----------|
//! | `connect` | At most `retries` attempts with backoff; one shared client; `Connection` error wraps the last failure |
//! | `get_tests` | Empty store yields an empty vec; read-your-writes within one driver |
//! | `get_variations` | Unknown test yields `NotFound` |
//! | `create_test_if_dne` | Exactly one record per id under concurrency; existing records are returned untouched |
//! | `create_variation_if_dne` | Same, scoped to the test; unknown test yields `NotFound` and stores nothing |
//! | `add_pageview` / `add_win` | Atomic increments, no lost updates; unknown pair yields `NotFound` |
//!
//! Data operations connect on first use, so calling `connect` is only
//! needed to warm up and handle connection failures separately.
//!
//! The raw client never leaves the driver. `connect` reports success or
//! failure; it does not hand out the backend handle.

use crate::client::ConnectionState;
use crate::error::Result;
use crate::types::{
    Assignment, EventCounts, NewTest, NewVariation, Test, TestGroup, TestId, Variation,
    VariationId,
};

/// Backend-agnostic persistence for tests, variations and their counters.
///
/// Implementations must be safe to share across threads; every method takes
/// `&self` and is atomic from the caller's point of view.
pub trait StorageDriver: Send + Sync {
    /// Short backend name, e.g. `"memory"` or `"sqlite"`
    fn backend(&self) -> &'static str;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Check if the driver holds a live client
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Establish the backend client if it does not exist yet.
    ///
    /// Makes up to `retries` attempts (at least one). Returns immediately
    /// when already connected.
    fn connect(&self, retries: u32) -> Result<()>;

    /// All tests with their variations, sorted by id.
    fn get_tests(&self) -> Result<Vec<TestGroup>>;

    /// Variations of one test, sorted by id.
    fn get_variations(&self, test_id: &TestId) -> Result<Vec<Variation>>;

    /// Create a test unless one with the same id exists.
    ///
    /// Returns the stored record, which is the pre-existing one when the id
    /// was already taken.
    fn create_test_if_dne(&self, test: &NewTest) -> Result<Test>;

    /// Create a variation under `test_id` unless it already exists.
    fn create_variation_if_dne(
        &self,
        variation: &NewVariation,
        test_id: &TestId,
    ) -> Result<Variation>;

    /// Record one exposure; returns the new pageview count.
    fn add_pageview(&self, assignment: &Assignment) -> Result<u64>;

    /// Record one conversion; returns the new win count.
    fn add_win(&self, test_id: &TestId, variation_id: &VariationId) -> Result<u64>;

    /// Current counters for one (test, variation) pair.
    fn get_counts(&self, test_id: &TestId, variation_id: &VariationId) -> Result<EventCounts>;
}
