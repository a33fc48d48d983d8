//! Key-value driver held in process memory.
//!
//! Data lives in named namespaces shared by every driver connected to the
//! same target, so two drivers built from the same configuration see each
//! other's writes the way two clients of one key-value server would.
//!
//! # Design
//!
//! - DashMap keyed by TestId: each test is its own shard
//! - FxHashMap of variations inside the shard
//! - AtomicU64 counters per variation: increments only take a read guard
//!
//! # Thread Safety
//!
//! - create: check-then-insert under the shard's write lock
//! - add_pageview / add_win: `fetch_add` under the shard's read lock
//! - Different tests never contend

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use splitstore_core::{
    Assignment, ClientCell, ConnectionState, Connector, Credentials, DriverConfig, DriverKind,
    EntityRef, Error, EventCounts, NewTest, NewVariation, Result, RetryPolicy, StorageDriver,
    Test, TestGroup, TestId, Timestamp, Variation, VariationId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Process-wide namespaces, keyed by connection target
static NAMESPACES: Lazy<DashMap<String, Arc<MemoryBackend>>> = Lazy::new(DashMap::new);

/// Remove a namespace and all of its data.
///
/// Drivers already connected keep their handle; new connections start from
/// an empty namespace. Returns true if the namespace existed.
pub fn drop_namespace(namespace: &str) -> bool {
    NAMESPACES.remove(namespace).is_some()
}

struct VariationSlot {
    variation: Variation,
    pageviews: AtomicU64,
    wins: AtomicU64,
}

impl VariationSlot {
    fn new(variation: Variation) -> Self {
        Self {
            variation,
            pageviews: AtomicU64::new(0),
            wins: AtomicU64::new(0),
        }
    }

    fn counts(&self) -> EventCounts {
        EventCounts {
            pageviews: self.pageviews.load(Ordering::Acquire),
            wins: self.wins.load(Ordering::Acquire),
        }
    }
}

/// One test and everything recorded under it
struct TestShard {
    test: Test,
    variations: FxHashMap<VariationId, VariationSlot>,
}

impl TestShard {
    fn new(test: Test) -> Self {
        Self {
            test,
            variations: FxHashMap::default(),
        }
    }

    fn sorted_variations(&self) -> Vec<Variation> {
        let mut variations: Vec<_> = self
            .variations
            .values()
            .map(|slot| slot.variation.clone())
            .collect();
        variations.sort_by(|a, b| a.id.cmp(&b.id));
        variations
    }
}

/// In-memory store behind one namespace.
pub struct MemoryBackend {
    tests: DashMap<TestId, TestShard>,
    credentials: Option<Credentials>,
}

impl MemoryBackend {
    /// Create an empty, unauthenticated backend
    pub fn new() -> Self {
        Self::with_credentials(None)
    }

    /// Create an empty backend that only accepts the given credentials
    pub fn with_credentials(credentials: Option<Credentials>) -> Self {
        Self {
            tests: DashMap::new(),
            credentials,
        }
    }

    /// Number of stored tests
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    fn authenticate(&self, presented: Option<&Credentials>) -> Result<()> {
        match (&self.credentials, presented) {
            (None, _) => Ok(()),
            (Some(expected), Some(presented)) if expected == presented => Ok(()),
            (Some(expected), _) => Err(Error::Storage(format!(
                "authentication failed for user '{}'",
                expected.username
            ))),
        }
    }

    fn create_test(&self, request: &NewTest) -> Test {
        let mut created = false;
        let shard = self.tests.entry(request.id.clone()).or_insert_with(|| {
            created = true;
            TestShard::new(request.to_record(Timestamp::now()))
        });
        debug!(test_id = %request.id, created, "create_test_if_dne");
        shard.test.clone()
    }

    fn create_variation(&self, request: &NewVariation, test_id: &TestId) -> Result<Variation> {
        let mut shard = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| Error::NotFound(EntityRef::test(test_id)))?;

        let mut created = false;
        let slot = shard.variations.entry(request.id.clone()).or_insert_with(|| {
            created = true;
            VariationSlot::new(request.to_record(test_id, Timestamp::now()))
        });
        debug!(test_id = %test_id, variation_id = %request.id, created, "create_variation_if_dne");
        Ok(slot.variation.clone())
    }

    fn groups(&self) -> Vec<TestGroup> {
        let mut groups: Vec<_> = self
            .tests
            .iter()
            .map(|shard| TestGroup {
                test: shard.test.clone(),
                variations: shard.sorted_variations(),
            })
            .collect();
        groups.sort_by(|a, b| a.test.id.cmp(&b.test.id));
        groups
    }

    fn variations(&self, test_id: &TestId) -> Result<Vec<Variation>> {
        self.tests
            .get(test_id)
            .map(|shard| shard.sorted_variations())
            .ok_or_else(|| Error::NotFound(EntityRef::test(test_id)))
    }

    fn with_slot<R>(
        &self,
        test_id: &TestId,
        variation_id: &VariationId,
        f: impl FnOnce(&VariationSlot) -> R,
    ) -> Result<R> {
        let shard = self
            .tests
            .get(test_id)
            .ok_or_else(|| Error::NotFound(EntityRef::test(test_id)))?;
        let slot = shard
            .variations
            .get(variation_id)
            .ok_or_else(|| Error::NotFound(EntityRef::variation(test_id, variation_id)))?;
        Ok(f(slot))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Connects to a named namespace, creating it on first use.
///
/// The first connection fixes the namespace's credentials.
#[derive(Debug, Clone)]
pub struct NamespaceConnector {
    namespace: String,
    credentials: Option<Credentials>,
}

impl NamespaceConnector {
    /// Connector for the given namespace
    pub fn new(namespace: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            namespace: namespace.into(),
            credentials,
        }
    }
}

impl Connector for NamespaceConnector {
    type Client = Arc<MemoryBackend>;

    fn connect(&self) -> Result<Arc<MemoryBackend>> {
        let backend = NAMESPACES
            .entry(self.namespace.clone())
            .or_insert_with(|| Arc::new(MemoryBackend::with_credentials(self.credentials.clone())))
            .clone();
        backend.authenticate(self.credentials.as_ref())?;
        Ok(backend)
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.namespace)
    }
}

/// Key-value storage driver.
///
/// Generic over its connector so tests and embedders can inject one; the
/// default connects to a process-wide namespace.
pub struct MemoryDriver<C = NamespaceConnector>
where
    C: Connector<Client = Arc<MemoryBackend>>,
{
    client: ClientCell<C>,
}

impl MemoryDriver {
    /// Build a driver from configuration without connecting.
    ///
    /// `target` names the namespace.
    pub fn new(config: &DriverConfig) -> Result<Self> {
        config.validate_for(DriverKind::Memory)?;
        let connector = NamespaceConnector::new(config.target.clone(), config.credentials());
        Ok(Self::with_connector(connector, config.retry.to_policy()))
    }
}

impl<C> MemoryDriver<C>
where
    C: Connector<Client = Arc<MemoryBackend>>,
{
    /// Build a driver around a custom connector
    pub fn with_connector(connector: C, policy: RetryPolicy) -> Self {
        Self {
            client: ClientCell::new(connector, policy),
        }
    }

    fn backend_handle(&self) -> Result<Arc<Arc<MemoryBackend>>> {
        self.client.get()
    }
}

impl<C> StorageDriver for MemoryDriver<C>
where
    C: Connector<Client = Arc<MemoryBackend>>,
{
    fn backend(&self) -> &'static str {
        DriverKind::Memory.as_str()
    }

    fn state(&self) -> ConnectionState {
        self.client.state()
    }

    fn connect(&self, retries: u32) -> Result<()> {
        self.client.get_with_retries(retries).map(|_| ())
    }

    fn get_tests(&self) -> Result<Vec<TestGroup>> {
        Ok(self.backend_handle()?.groups())
    }

    fn get_variations(&self, test_id: &TestId) -> Result<Vec<Variation>> {
        self.backend_handle()?.variations(test_id)
    }

    fn create_test_if_dne(&self, test: &NewTest) -> Result<Test> {
        test.validate()?;
        Ok(self.backend_handle()?.create_test(test))
    }

    fn create_variation_if_dne(
        &self,
        variation: &NewVariation,
        test_id: &TestId,
    ) -> Result<Variation> {
        variation.validate()?;
        self.backend_handle()?.create_variation(variation, test_id)
    }

    fn add_pageview(&self, assignment: &Assignment) -> Result<u64> {
        self.backend_handle()?
            .with_slot(&assignment.test_id, &assignment.variation_id, |slot| {
                slot.pageviews.fetch_add(1, Ordering::AcqRel) + 1
            })
    }

    fn add_win(&self, test_id: &TestId, variation_id: &VariationId) -> Result<u64> {
        self.backend_handle()?
            .with_slot(test_id, variation_id, |slot| {
                slot.wins.fetch_add(1, Ordering::AcqRel) + 1
            })
    }

    fn get_counts(&self, test_id: &TestId, variation_id: &VariationId) -> Result<EventCounts> {
        self.backend_handle()?
            .with_slot(test_id, variation_id, VariationSlot::counts)
    }
}
