//! Connection Tests
//!
//! Lazy warm-up, bounded retries and client sharing.

use crate::common::*;
use splitstore::Connector;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Connector that refuses the first `failures` attempts.
struct FlakyConnector {
    failures: u32,
    calls: Arc<AtomicU32>,
    backend: Arc<MemoryBackend>,
}

impl Connector for FlakyConnector {
    type Client = Arc<MemoryBackend>;

    fn connect(&self) -> splitstore::Result<Arc<MemoryBackend>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(Error::Storage(format!("connection refused (attempt {})", n)))
        } else {
            Ok(Arc::clone(&self.backend))
        }
    }
}

fn flaky_driver(
    failures: u32,
    policy: RetryPolicy,
) -> (MemoryDriver<FlakyConnector>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let connector = FlakyConnector {
        failures,
        calls: Arc::clone(&calls),
        backend: Arc::new(MemoryBackend::new()),
    };
    (MemoryDriver::with_connector(connector, policy), calls)
}

#[test]
fn construction_leaves_driver_unconnected() {
    for h in harnesses() {
        assert!(!h.driver.is_connected(), "{}", h.name);
    }
}

#[test]
fn data_operation_connects_implicitly() {
    for h in harnesses() {
        h.driver.get_tests().unwrap();
        assert!(h.driver.is_connected(), "{}", h.name);
    }
}

#[test]
fn explicit_connect_is_idempotent() {
    for h in harnesses() {
        h.driver.connect(1).unwrap();
        h.driver.connect(1).unwrap();
        assert!(h.driver.is_connected(), "{}", h.name);
    }
}

#[test]
fn retries_three_survives_two_failures() {
    let (driver, calls) = flaky_driver(2, RetryPolicy::immediate(1));

    driver.connect(3).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(driver.is_connected());
    assert!(driver.get_tests().unwrap().is_empty());
}

#[test]
fn retries_two_against_dead_backend_fails_after_two_attempts() {
    let (driver, calls) = flaky_driver(u32::MAX, RetryPolicy::immediate(1));

    let err = driver.connect(2).unwrap_err();
    assert!(matches!(err, Error::Connection { attempts: 2, .. }), "{:?}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(err.is_fatal());
    assert!(!driver.is_connected());
}

#[test]
fn connection_error_wraps_last_failure() {
    let (driver, _calls) = flaky_driver(u32::MAX, RetryPolicy::immediate(1));

    match driver.connect(3).unwrap_err() {
        Error::Connection { source, .. } => {
            assert!(source.to_string().contains("attempt 3"), "{}", source)
        }
        other => panic!("expected connection error, got {:?}", other),
    }
}

#[test]
fn implicit_connect_uses_configured_attempts() {
    let (driver, calls) = flaky_driver(2, RetryPolicy::immediate(3));

    driver.create_test_if_dne(&NewTest::new("t1")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn client_is_reused_across_operations() {
    let (driver, calls) = flaky_driver(0, RetryPolicy::immediate(1));

    seed(&driver, "t1", &["v1"]);
    driver.add_pageview(&Assignment::new("t1", "v1")).unwrap();
    driver.add_win(&tid("t1"), &vid("v1")).unwrap();
    driver.get_tests().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_warm_up_shares_one_connection() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let backend = Arc::new(MemoryBackend::new());
    let connector = connector_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(Arc::clone(&backend))
    });
    let driver = Arc::new(MemoryDriver::with_connector(connector, RetryPolicy::immediate(1)));

    const NUM_CALLERS: usize = 16;
    let barrier = Arc::new(Barrier::new(NUM_CALLERS));
    let handles: Vec<_> = (0..NUM_CALLERS)
        .map(|_| {
            let driver = Arc::clone(&driver);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                driver.connect(1).unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn deadline_stops_retrying_with_timeout() {
    let policy = RetryPolicy {
        attempts: 5,
        backoff_base: Duration::from_millis(500),
        backoff_max: Duration::from_secs(2),
        deadline: Some(Duration::from_millis(100)),
    };
    let (driver, calls) = flaky_driver(u32::MAX, policy);

    let err = driver.get_tests().unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_unreachable_file_fails_after_exact_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no").join("such").join("dir.db");
    let driver = splitstore::open_driver(&DriverConfig::sqlite(path)).unwrap();

    let err = driver.connect(2).unwrap_err();
    assert_eq!(err.attempts(), Some(2));
}
