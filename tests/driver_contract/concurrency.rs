//! Concurrency Tests
//!
//! Racing creators must converge on one record; racing counters must not
//! lose updates.

use crate::common::*;

const NUM_THREADS: usize = 8;
const OPS_PER_THREAD: usize = 50;

/// Run `f` on NUM_THREADS threads released together, collecting results
fn race<T, F>(driver: &Arc<dyn StorageDriver>, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&dyn StorageDriver, usize) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|i| {
            let driver = Arc::clone(driver);
            let barrier = Arc::clone(&barrier);
            let f = Arc::clone(&f);
            thread::spawn(move || {
                barrier.wait();
                f(driver.as_ref(), i)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn concurrent_create_test_yields_one_record() {
    for h in harnesses() {
        let records = race(&h.driver, |driver, i| {
            driver
                .create_test_if_dne(&NewTest::new("contended").name(format!("writer {}", i)))
                .unwrap()
        });

        let tests = h.driver.get_tests().unwrap();
        assert_eq!(tests.len(), 1, "{}", h.name);
        assert!(
            records.iter().all(|r| *r == tests[0].test),
            "{}: callers observed different records",
            h.name
        );
    }
}

#[test]
fn concurrent_create_variation_yields_one_record() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &[]);
        let records = race(&h.driver, |driver, _| {
            driver
                .create_variation_if_dne(&NewVariation::new("contended"), &tid("t1"))
                .unwrap()
        });

        let variations = h.driver.get_variations(&tid("t1")).unwrap();
        assert_eq!(variations.len(), 1, "{}", h.name);
        assert!(records.iter().all(|r| *r == variations[0]), "{}", h.name);
    }
}

#[test]
fn concurrent_pageviews_lose_no_updates() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        let before = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();

        race(&h.driver, |driver, _| {
            let assignment = Assignment::new("t1", "v1");
            for _ in 0..OPS_PER_THREAD {
                driver.add_pageview(&assignment).unwrap();
            }
        });

        let after = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(
            after.pageviews - before.pageviews,
            (NUM_THREADS * OPS_PER_THREAD) as u64,
            "{}",
            h.name
        );
        assert_eq!(after.wins, before.wins, "{}", h.name);
    }
}

#[test]
fn concurrent_wins_lose_no_updates() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);

        race(&h.driver, |driver, _| {
            for _ in 0..OPS_PER_THREAD {
                driver.add_win(&tid("t1"), &vid("v1")).unwrap();
            }
        });

        let counts = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(counts.wins, (NUM_THREADS * OPS_PER_THREAD) as u64, "{}", h.name);
        assert_eq!(counts.pageviews, 0, "{}", h.name);
    }
}

#[test]
fn returned_counts_are_unique_per_increment() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);

        let mut seen: Vec<u64> = race(&h.driver, |driver, _| {
            (0..OPS_PER_THREAD)
                .map(|_| driver.add_pageview(&Assignment::new("t1", "v1")).unwrap())
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();

        seen.sort_unstable();
        let expected: Vec<u64> = (1..=(NUM_THREADS * OPS_PER_THREAD) as u64).collect();
        assert_eq!(seen, expected, "{}", h.name);
    }
}

#[test]
fn independent_drivers_share_counters_without_loss() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        let second = h.reopen();

        let handles: Vec<_> = [Arc::clone(&h.driver), second]
            .into_iter()
            .map(|driver| {
                thread::spawn(move || {
                    for _ in 0..OPS_PER_THREAD {
                        driver.add_pageview(&Assignment::new("t1", "v1")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let counts = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(counts.pageviews, 2 * OPS_PER_THREAD as u64, "{}", h.name);
    }
}
