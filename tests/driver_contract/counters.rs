//! Counter Tests
//!
//! Pageview and win accounting per (test, variation) pair.

use crate::common::*;

#[test]
fn new_variation_starts_at_zero() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        let counts = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(counts, EventCounts::default(), "{}", h.name);
    }
}

#[test]
fn increments_return_monotonic_counts() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        let assignment = Assignment::new("t1", "v1");

        let returned: Vec<u64> = (0..5)
            .map(|_| h.driver.add_pageview(&assignment).unwrap())
            .collect();
        assert_eq!(returned, [1, 2, 3, 4, 5], "{}", h.name);

        assert_eq!(h.driver.add_win(&tid("t1"), &vid("v1")).unwrap(), 1);
        assert_eq!(h.driver.add_win(&tid("t1"), &vid("v1")).unwrap(), 2);
    }
}

#[test]
fn pageviews_and_wins_are_independent_counters() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        h.driver.add_pageview(&Assignment::new("t1", "v1")).unwrap();
        h.driver.add_pageview(&Assignment::new("t1", "v1")).unwrap();
        h.driver.add_win(&tid("t1"), &vid("v1")).unwrap();

        let counts = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(counts.pageviews, 2, "{}", h.name);
        assert_eq!(counts.wins, 1, "{}", h.name);
    }
}

#[test]
fn counters_are_scoped_to_their_pair() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["control"]);
        seed(h.driver.as_ref(), "t2", &["control"]);

        h.driver.add_pageview(&Assignment::new("t1", "control")).unwrap();

        let t2 = h.driver.get_counts(&tid("t2"), &vid("control")).unwrap();
        assert_eq!(t2.pageviews, 0, "{}", h.name);
    }
}

#[test]
fn pageview_for_unknown_test_is_not_found() {
    for h in harnesses() {
        let err = h
            .driver
            .add_pageview(&Assignment::new("ghost", "v1"))
            .unwrap_err();
        assert!(err.is_not_found(), "{}: {:?}", h.name, err);
        assert!(!err.is_fatal());
    }
}

#[test]
fn win_for_unknown_variation_is_not_found() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        let err = h.driver.add_win(&tid("t1"), &vid("ghost")).unwrap_err();
        assert!(
            matches!(err, Error::NotFound(splitstore::EntityRef::Variation { .. })),
            "{}: {:?}",
            h.name,
            err
        );
    }
}

#[test]
fn failed_increment_leaves_other_counters_untouched() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);
        h.driver.add_pageview(&Assignment::new("t1", "v1")).unwrap();
        let _ = h.driver.add_pageview(&Assignment::new("t1", "ghost"));

        let counts = h.driver.get_counts(&tid("t1"), &vid("v1")).unwrap();
        assert_eq!(counts.pageviews, 1, "{}", h.name);
    }
}
