//! Main entry point for splitstore.
//!
//! [`Splitstore`] wraps one storage driver and applies the engine-facing
//! error policy: control-path operations (creating and reading tests)
//! return their errors, analytics recording logs and drops them so a lost
//! event never fails a visitor's request.

use crate::types::VariationStats;
use splitstore_core::{
    Assignment, DriverConfig, DriverKind, Error, EventCounts, NewTest, NewVariation, Result,
    RetryConfig, StorageDriver, Test, TestGroup, TestId, Variation, VariationId,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Handle to an experiment store.
///
/// Cheap to clone; clones share the driver and its connection.
///
/// # Example
///
/// ```
/// use splitstore::prelude::*;
///
/// let store = Splitstore::builder().memory("quick-start").open()?;
///
/// store.ensure_test(&NewTest::new("t1"))?;
/// store.ensure_variation(&NewVariation::new("v1"), "t1")?;
/// store.record_pageview(&Assignment::new("t1", "v1"));
///
/// assert_eq!(store.counts("t1", "v1")?.pageviews, 1);
/// # Ok::<(), splitstore::Error>(())
/// ```
#[derive(Clone)]
pub struct Splitstore {
    driver: Arc<dyn StorageDriver>,
}

impl std::fmt::Debug for Splitstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitstore")
            .field("backend", &self.driver.backend())
            .field("state", &self.driver.state())
            .finish()
    }
}

impl Splitstore {
    /// Build the configured driver. Does not connect.
    pub fn open(config: &DriverConfig) -> Result<Self> {
        let driver = splitstore_storage::open_driver(config)?;
        Ok(Self {
            driver: Arc::from(driver),
        })
    }

    /// Load a TOML configuration file and build its driver.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(&DriverConfig::from_file(path)?)
    }

    /// Create a builder for store configuration.
    pub fn builder() -> SplitstoreBuilder {
        SplitstoreBuilder::new()
    }

    /// Wrap an already constructed driver.
    pub fn with_driver(driver: impl StorageDriver + 'static) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// Wrap a shared driver.
    pub fn from_shared(driver: Arc<dyn StorageDriver>) -> Self {
        Self { driver }
    }

    /// The underlying driver
    pub fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }

    /// Backend name of the underlying driver
    pub fn backend(&self) -> &'static str {
        self.driver.backend()
    }

    /// Check if the driver holds a live client
    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Warm up the backend connection.
    ///
    /// Engines call this at startup so a broken backend fails fast instead
    /// of on the first visitor request.
    pub fn connect(&self, retries: u32) -> Result<()> {
        self.driver.connect(retries).map_err(|e| {
            error!(backend = self.driver.backend(), error = %e, "storage backend unavailable");
            e
        })
    }

    // =========================================================================
    // Control path
    // =========================================================================

    /// All tests with their variations
    pub fn tests(&self) -> Result<Vec<TestGroup>> {
        self.driver.get_tests()
    }

    /// Variations of one test; unknown tests are `NotFound`
    pub fn variations(&self, test_id: impl Into<TestId>) -> Result<Vec<Variation>> {
        self.driver.get_variations(&test_id.into())
    }

    /// Create a test unless it exists; returns the stored record
    pub fn ensure_test(&self, test: &NewTest) -> Result<Test> {
        self.driver.create_test_if_dne(test)
    }

    /// Create a variation unless it exists; returns the stored record
    pub fn ensure_variation(
        &self,
        variation: &NewVariation,
        test_id: impl Into<TestId>,
    ) -> Result<Variation> {
        self.driver.create_variation_if_dne(variation, &test_id.into())
    }

    /// Register a test together with its variations.
    ///
    /// Each piece is created only if absent, so engines can call this on
    /// every startup with their experiment definitions.
    pub fn ensure_experiment(
        &self,
        test: &NewTest,
        variations: &[NewVariation],
    ) -> Result<TestGroup> {
        let test = self.driver.create_test_if_dne(test)?;
        for variation in variations {
            self.driver.create_variation_if_dne(variation, &test.id)?;
        }
        let variations = self.driver.get_variations(&test.id)?;
        Ok(TestGroup { test, variations })
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Record an exposure, logging instead of failing.
    ///
    /// Returns the new pageview count, or `None` if the event was dropped.
    pub fn record_pageview(&self, assignment: &Assignment) -> Option<u64> {
        match self.driver.add_pageview(assignment) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(
                    test_id = %assignment.test_id,
                    variation_id = %assignment.variation_id,
                    error = %e,
                    "dropping pageview"
                );
                None
            }
        }
    }

    /// Record an exposure and return any error.
    pub fn try_record_pageview(&self, assignment: &Assignment) -> Result<u64> {
        self.driver.add_pageview(assignment)
    }

    /// Record a conversion, logging instead of failing.
    ///
    /// Returns the new win count, or `None` if the event was dropped.
    pub fn record_win(
        &self,
        test_id: impl Into<TestId>,
        variation_id: impl Into<VariationId>,
    ) -> Option<u64> {
        let (test_id, variation_id) = (test_id.into(), variation_id.into());
        match self.driver.add_win(&test_id, &variation_id) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(
                    test_id = %test_id,
                    variation_id = %variation_id,
                    error = %e,
                    "dropping win"
                );
                None
            }
        }
    }

    /// Record a conversion and return any error.
    pub fn try_record_win(
        &self,
        test_id: impl Into<TestId>,
        variation_id: impl Into<VariationId>,
    ) -> Result<u64> {
        self.driver.add_win(&test_id.into(), &variation_id.into())
    }

    /// Counters for one (test, variation) pair
    pub fn counts(
        &self,
        test_id: impl Into<TestId>,
        variation_id: impl Into<VariationId>,
    ) -> Result<EventCounts> {
        self.driver
            .get_counts(&test_id.into(), &variation_id.into())
    }

    /// Counters for every variation of a test, sorted by variation id
    pub fn stats(&self, test_id: impl Into<TestId>) -> Result<Vec<VariationStats>> {
        let test_id = test_id.into();
        self.driver
            .get_variations(&test_id)?
            .into_iter()
            .map(|variation| {
                let counts = self.driver.get_counts(&test_id, &variation.id)?;
                Ok(VariationStats { variation, counts })
            })
            .collect()
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for store configuration.
///
/// # Example
///
/// ```ignore
/// // Production: relational backend, retry the warm-up
/// let store = Splitstore::builder()
///     .sqlite("/var/lib/experiments.db")
///     .retries(3)
///     .backoff(Duration::from_millis(100), Duration::from_secs(2))
///     .open()?;
/// store.connect(3)?;
///
/// // Tests: private in-process namespace
/// let store = Splitstore::builder().memory("unit").open()?;
/// ```
#[derive(Debug, Default)]
pub struct SplitstoreBuilder {
    driver: Option<DriverKind>,
    target: String,
    username: Option<String>,
    password: Option<String>,
    retry: RetryConfig,
}

impl SplitstoreBuilder {
    /// Create a builder with default retry settings and no driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.driver = Some(config.driver);
        self.target = config.target;
        self.username = config.username;
        self.password = config.password;
        self.retry = config.retry;
        self
    }

    /// Use the in-memory driver with the given namespace
    pub fn memory(mut self, namespace: impl Into<String>) -> Self {
        self.driver = Some(DriverKind::Memory);
        self.target = namespace.into();
        self
    }

    /// Use the SQLite driver with the given database file
    pub fn sqlite(mut self, path: impl AsRef<Path>) -> Self {
        self.driver = Some(DriverKind::Sqlite);
        self.target = path.as_ref().to_string_lossy().into_owned();
        self
    }

    /// Present credentials when connecting
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Attempts used when an operation connects implicitly
    pub fn retries(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts;
        self
    }

    /// Exponential backoff bounds between connection attempts
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry.backoff_base_ms = saturating_millis(base);
        self.retry.backoff_max_ms = saturating_millis(max);
        self
    }

    /// Give up connecting after this long
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.retry.deadline_ms = Some(saturating_millis(deadline));
        self
    }

    /// The configuration this builder describes
    pub fn build_config(self) -> Result<DriverConfig> {
        let driver = self
            .driver
            .ok_or_else(|| Error::Configuration("no storage driver selected".into()))?;
        let config = DriverConfig {
            driver,
            target: self.target,
            username: self.username,
            password: self.password,
            retry: self.retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the store. Does not connect.
    pub fn open(self) -> Result<Splitstore> {
        Splitstore::open(&self.build_config()?)
    }
}
