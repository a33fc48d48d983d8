//! Idempotency Tests
//!
//! Create-if-absent semantics and the not-found policy.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[test]
fn get_tests_on_empty_store_is_empty() {
    for h in harnesses() {
        let tests = h.driver.get_tests().unwrap();
        assert!(tests.is_empty(), "{}", h.name);
    }
}

#[test]
fn create_test_twice_stores_one_equal_record() {
    for h in harnesses() {
        let request = NewTest::new("t1").name("Headline copy").meta("owner", "growth");
        let first = h.driver.create_test_if_dne(&request).unwrap();
        let second = h.driver.create_test_if_dne(&request).unwrap();

        assert_eq!(first, second, "{}", h.name);
        assert_eq!(h.driver.get_tests().unwrap().len(), 1, "{}", h.name);
    }
}

#[test]
fn create_test_keeps_existing_metadata() {
    for h in harnesses() {
        h.driver
            .create_test_if_dne(&NewTest::new("t1").name("Original"))
            .unwrap();
        let again = h
            .driver
            .create_test_if_dne(&NewTest::new("t1").name("Overwrite attempt"))
            .unwrap();

        assert_eq!(again.name, "Original", "{}", h.name);
    }
}

#[test]
fn create_variation_twice_stores_one_record() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &[]);
        let request = NewVariation::new("v1").weight(0.5);
        let first = h.driver.create_variation_if_dne(&request, &tid("t1")).unwrap();
        let second = h.driver.create_variation_if_dne(&request, &tid("t1")).unwrap();

        assert_eq!(first, second, "{}", h.name);
        assert_eq!(first.test_id, tid("t1"));
        let variations = h.driver.get_variations(&tid("t1")).unwrap();
        assert_eq!(variations.len(), 1, "{}", h.name);
    }
}

#[test]
fn variation_on_unknown_test_is_not_found_and_stores_nothing() {
    for h in harnesses() {
        let err = h
            .driver
            .create_variation_if_dne(&NewVariation::new("v1"), &tid("ghost"))
            .unwrap_err();

        assert!(err.is_not_found(), "{}: {:?}", h.name, err);
        assert!(h.driver.get_tests().unwrap().is_empty(), "{}", h.name);
        assert!(h.driver.get_variations(&tid("ghost")).is_err(), "{}", h.name);
    }
}

#[test]
fn get_variations_on_unknown_test_is_not_found() {
    for h in harnesses() {
        let err = h.driver.get_variations(&tid("ghost")).unwrap_err();
        assert!(
            matches!(err, Error::NotFound(splitstore::EntityRef::Test(ref id)) if id.as_str() == "ghost"),
            "{}: {:?}",
            h.name,
            err
        );
    }
}

#[test]
fn get_variations_on_test_without_variations_is_empty() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &[]);
        assert!(h.driver.get_variations(&tid("t1")).unwrap().is_empty(), "{}", h.name);
    }
}

#[test]
fn variation_ids_are_scoped_to_their_test() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["control"]);
        seed(h.driver.as_ref(), "t2", &["control"]);

        let tests = h.driver.get_tests().unwrap();
        assert_eq!(tests.len(), 2, "{}", h.name);
        for group in &tests {
            assert_eq!(group.variations.len(), 1);
            assert_eq!(group.variations[0].test_id, group.test.id);
        }
    }
}

#[test]
fn get_tests_is_sorted_and_groups_variations() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "b-test", &["z", "a"]);
        seed(h.driver.as_ref(), "a-test", &["m"]);

        let tests = h.driver.get_tests().unwrap();
        let ids: Vec<_> = tests.iter().map(|g| g.test.id.as_str()).collect();
        assert_eq!(ids, ["a-test", "b-test"], "{}", h.name);

        let variations: Vec<_> = tests[1].variations.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(variations, ["a", "z"], "{}", h.name);
    }
}

#[test]
fn invalid_identifiers_are_rejected() {
    for h in harnesses() {
        let err = h.driver.create_test_if_dne(&NewTest::new("")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{}", h.name);

        seed(h.driver.as_ref(), "t1", &[]);
        let err = h
            .driver
            .create_variation_if_dne(&NewVariation::new("v").weight(-2.0), &tid("t1"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{}", h.name);
        assert!(h.driver.get_variations(&tid("t1")).unwrap().is_empty());
    }
}

#[test]
fn writes_are_visible_to_a_second_driver() {
    for h in harnesses() {
        seed(h.driver.as_ref(), "t1", &["v1"]);

        let other = h.reopen();
        let variations = other.get_variations(&tid("t1")).unwrap();
        assert_eq!(variations.len(), 1, "{}", h.name);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repeated_creates_store_each_id_once(
        ids in prop::collection::vec("[a-z]{1,4}", 1..12)
    ) {
        let h = memory_harness();
        for id in ids.iter().chain(ids.iter()) {
            h.driver.create_test_if_dne(&NewTest::new(id.as_str())).unwrap();
        }

        let unique: BTreeSet<_> = ids.iter().map(String::as_str).collect();
        let stored: Vec<_> = h.driver.get_tests().unwrap();
        prop_assert_eq!(stored.len(), unique.len());
        for (group, id) in stored.iter().zip(unique.iter()) {
            prop_assert_eq!(group.test.id.as_str(), *id);
        }
    }
}
