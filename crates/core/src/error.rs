//! Error types shared by every storage driver.
//!
//! Each variant maps to one failure class a caller has to tell apart:
//! configuration and connection failures are fatal to engine startup,
//! `NotFound` and `Storage` are reported per operation.

use crate::types::{TestId, VariationId};
use std::fmt;
use thiserror::Error;

/// Reference to the entity an operation could not find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// A test, by id
    Test(TestId),
    /// A variation scoped to its test
    Variation {
        /// Owning test
        test_id: TestId,
        /// Variation within that test
        variation_id: VariationId,
    },
}

impl EntityRef {
    /// Reference a test
    pub fn test(test_id: &TestId) -> Self {
        EntityRef::Test(test_id.clone())
    }

    /// Reference a variation within a test
    pub fn variation(test_id: &TestId, variation_id: &VariationId) -> Self {
        EntityRef::Variation {
            test_id: test_id.clone(),
            variation_id: variation_id.clone(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Test(id) => write!(f, "test '{}'", id),
            EntityRef::Variation {
                test_id,
                variation_id,
            } => write!(f, "variation '{}' of test '{}'", variation_id, test_id),
        }
    }
}

/// All storage driver errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed driver configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Client acquisition failed after all attempts
    #[error("connection failed after {attempts} attempt(s): {source}")]
    Connection {
        /// Number of attempts made
        attempts: u32,
        /// The last underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Reference to an unknown test or variation
    #[error("not found: {0}")]
    NotFound(EntityRef),

    /// Generic backend failure during a read or write
    #[error("storage error: {0}")]
    Storage(String),

    /// Deadline passed before the operation could complete
    #[error("timeout: {0}")]
    Timeout(String),

    /// Invalid identifier, weight or other request field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Metadata could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage driver operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error must stop engine startup.
    ///
    /// An engine must not keep running with a driver that cannot be
    /// configured or connected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::Connection { .. } | Error::Timeout(_) | Error::Io(_)
        )
    }

    /// Check if this error may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Timeout(_))
    }

    /// Attempts made before a connection error was raised.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::Connection { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// `std::io::Error` is not `Clone`; the copy keeps its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Configuration(msg) => Error::Configuration(msg.clone()),
            Error::Connection { attempts, source } => Error::Connection {
                attempts: *attempts,
                source: source.clone(),
            },
            Error::NotFound(entity) => Error::NotFound(entity.clone()),
            Error::Storage(msg) => Error::Storage(msg.clone()),
            Error::Timeout(msg) => Error::Timeout(msg.clone()),
            Error::InvalidInput(msg) => Error::InvalidInput(msg.clone()),
            Error::Serialization(msg) => Error::Serialization(msg.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}
