//! Experiment data model
//!
//! This module defines the records every driver stores and returns:
//! - [`Test`]: an experiment, unique by [`TestId`]
//! - [`Variation`]: one treatment arm, unique by [`VariationId`] within its test
//! - [`Assignment`]: the (test, variation) pair an event is recorded against
//! - [`EventCounts`]: accumulated pageviews and wins for one pair

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form metadata attached to tests and variations.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Maximum identifier length in bytes.
pub const MAX_ID_LEN: usize = 255;

fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput(format!("{} id must not be empty", kind)));
    }
    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "{} id exceeds {} bytes",
            kind, MAX_ID_LEN
        )));
    }
    if id.chars().any(|c| c.is_ascii_control()) {
        return Err(Error::InvalidInput(format!(
            "{} id contains control characters",
            kind
        )));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier string
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Borrow the identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check the identifier is non-empty, bounded and printable
            pub fn validate(&self) -> Result<()> {
                validate_id($kind, &self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Globally unique test identifier
    TestId,
    "test"
);

string_id!(
    /// Variation identifier, unique within its test
    VariationId,
    "variation"
);

/// Creation time in milliseconds since the Unix epoch.
///
/// Millisecond precision so a record read back from any backend compares
/// equal to the one returned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    /// From milliseconds since the epoch
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Milliseconds since the epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// As a chrono UTC datetime
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

/// A stored experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    /// Unique identifier
    pub id: TestId,
    /// Human-readable name
    pub name: String,
    /// Free-form metadata
    pub metadata: Metadata,
    /// When the test was first created
    pub created_at: Timestamp,
}

/// A stored treatment arm of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    /// Identifier within the owning test
    pub id: VariationId,
    /// Owning test
    pub test_id: TestId,
    /// Display name
    pub name: String,
    /// Relative traffic weight
    pub weight: f64,
    /// Free-form metadata
    pub metadata: Metadata,
    /// When the variation was first created
    pub created_at: Timestamp,
}

/// A test together with all of its variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGroup {
    /// The test
    pub test: Test,
    /// Its variations, sorted by id
    pub variations: Vec<Variation>,
}

/// Request to create a test if it does not exist.
///
/// ```
/// use splitstore_core::NewTest;
///
/// let test = NewTest::new("checkout-button").name("Checkout button colour");
/// assert_eq!(test.name, "Checkout button colour");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NewTestFields")]
pub struct NewTest {
    /// Identifier of the test
    pub id: TestId,
    /// Display name, defaults to the identifier
    pub name: String,
    /// Metadata stored on first creation
    pub metadata: Metadata,
}

impl NewTest {
    /// Start a request carrying only an identifier
    pub fn new(id: impl Into<TestId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            metadata: Metadata::new(),
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add one metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        self.id.validate()
    }

    /// Build the record that a driver stores on first creation
    pub fn to_record(&self, created_at: Timestamp) -> Test {
        Test {
            id: self.id.clone(),
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            created_at,
        }
    }
}

/// Request to create a variation if it does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NewVariationFields")]
pub struct NewVariation {
    /// Identifier within the owning test
    pub id: VariationId,
    /// Display name, defaults to the identifier
    pub name: String,
    /// Relative traffic weight, defaults to 1.0
    pub weight: f64,
    /// Metadata stored on first creation
    pub metadata: Metadata,
}

impl NewVariation {
    /// Start a request carrying only an identifier
    pub fn new(id: impl Into<VariationId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            weight: 1.0,
            metadata: Metadata::new(),
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the traffic weight
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Add one metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        self.id.validate()?;
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(Error::InvalidInput(format!(
                "variation '{}' has invalid weight {}",
                self.id, self.weight
            )));
        }
        Ok(())
    }

    /// Build the record that a driver stores on first creation
    pub fn to_record(&self, test_id: &TestId, created_at: Timestamp) -> Variation {
        Variation {
            id: self.id.clone(),
            test_id: test_id.clone(),
            name: self.name.clone(),
            weight: self.weight,
            metadata: self.metadata.clone(),
            created_at,
        }
    }
}

/// Wire form of [`NewTest`]; omitted fields take the builder defaults.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NewTestFields {
    id: TestId,
    name: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

impl From<NewTestFields> for NewTest {
    fn from(fields: NewTestFields) -> Self {
        let mut test = NewTest::new(fields.id);
        if let Some(name) = fields.name {
            test.name = name;
        }
        test.metadata = fields.metadata;
        test
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NewVariationFields {
    id: VariationId,
    name: Option<String>,
    weight: Option<f64>,
    #[serde(default)]
    metadata: Metadata,
}

impl From<NewVariationFields> for NewVariation {
    fn from(fields: NewVariationFields) -> Self {
        let mut variation = NewVariation::new(fields.id);
        if let Some(name) = fields.name {
            variation.name = name;
        }
        if let Some(weight) = fields.weight {
            variation.weight = weight;
        }
        variation.metadata = fields.metadata;
        variation
    }
}

/// The (test, variation) pair a visitor was exposed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// Test the visitor is enrolled in
    pub test_id: TestId,
    /// Variation the visitor was shown
    pub variation_id: VariationId,
}

impl Assignment {
    /// Pair a test with a variation
    pub fn new(test_id: impl Into<TestId>, variation_id: impl Into<VariationId>) -> Self {
        Self {
            test_id: test_id.into(),
            variation_id: variation_id.into(),
        }
    }
}

/// Accumulated analytics counters for one (test, variation) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// Recorded exposures
    pub pageviews: u64,
    /// Recorded conversions
    pub wins: u64,
}

impl EventCounts {
    /// Wins per pageview, or `None` before the first pageview
    pub fn conversion_rate(&self) -> Option<f64> {
        if self.pageviews == 0 {
            None
        } else {
            Some(self.wins as f64 / self.pageviews as f64)
        }
    }
}
