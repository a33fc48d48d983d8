//! Driver selection from configuration.

use crate::memory::MemoryDriver;
use splitstore_core::{DriverConfig, DriverKind, Result, StorageDriver};
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteDriver;
#[cfg(not(feature = "sqlite"))]
use splitstore_core::Error;

/// Build the driver named by `config.driver`.
///
/// Validates the configuration but does not connect; the returned driver
/// is still unconnected.
///
/// # Example
///
/// ```
/// use splitstore_core::{DriverConfig, StorageDriver};
/// use splitstore_storage::open_driver;
///
/// let driver = open_driver(&DriverConfig::memory("docs")).unwrap();
/// assert_eq!(driver.backend(), "memory");
/// assert!(!driver.is_connected());
/// ```
pub fn open_driver(config: &DriverConfig) -> Result<Box<dyn StorageDriver>> {
    match config.driver {
        DriverKind::Memory => Ok(Box::new(MemoryDriver::new(config)?)),
        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Box::new(SqliteDriver::new(config)?)),
        #[cfg(not(feature = "sqlite"))]
        DriverKind::Sqlite => Err(Error::Configuration(
            "sqlite driver is not compiled in; enable the `sqlite` feature".into(),
        )),
    }
}
