//! Relational driver backed by SQLite.
//!
//! ## Schema
//!
//! ```text
//! ab_tests      (id PK, name, metadata JSON, created_at ms)
//! ab_variations (test_id FK, id, name, weight, metadata JSON, created_at ms,
//!                pageviews, wins, PK (test_id, id))
//! ```
//!
//! Create-if-absent is `INSERT OR IGNORE` on the primary key followed by a
//! read-back, so the returned record is always the stored one. Counters are
//! single-statement `UPDATE ... SET n = n + 1 ... RETURNING n`.
//!
//! The connection is guarded by a mutex; each operation holds it for one
//! round-trip only.

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use splitstore_core::{
    Assignment, ClientCell, ConnectionState, Connector, DriverConfig, DriverKind, EntityRef,
    Error, EventCounts, Metadata, NewTest, NewVariation, Result, StorageDriver, Test, TestGroup,
    TestId, Timestamp, Variation, VariationId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const IN_MEMORY: &str = ":memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS ab_tests (
    id          TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS ab_variations (
    test_id     TEXT NOT NULL REFERENCES ab_tests(id),
    id          TEXT NOT NULL,
    name        TEXT NOT NULL,
    weight      REAL NOT NULL,
    metadata    TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    pageviews   INTEGER NOT NULL DEFAULT 0,
    wins        INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (test_id, id)
);
";

const TEST_COLUMNS: &str = "id, name, metadata, created_at";
const VARIATION_COLUMNS: &str = "id, test_id, name, weight, metadata, created_at";

fn sql_error(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::FromSqlConversionFailure(_, _, inner) => {
            Error::Serialization(inner.to_string())
        }
        other => Error::Storage(other.to_string()),
    }
}

fn parse_metadata(idx: usize, text: &str) -> rusqlite::Result<Metadata> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_test(row: &Row<'_>) -> rusqlite::Result<Test> {
    let metadata: String = row.get(2)?;
    Ok(Test {
        id: TestId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        metadata: parse_metadata(2, &metadata)?,
        created_at: Timestamp::from_millis(row.get(3)?),
    })
}

fn row_to_variation(row: &Row<'_>) -> rusqlite::Result<Variation> {
    let metadata: String = row.get(4)?;
    Ok(Variation {
        id: VariationId::new(row.get::<_, String>(0)?),
        test_id: TestId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        weight: row.get(3)?,
        metadata: parse_metadata(4, &metadata)?,
        created_at: Timestamp::from_millis(row.get(5)?),
    })
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn test_exists(conn: &Connection, test_id: &TestId) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM ab_tests WHERE id = ?1",
        params![test_id.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(sql_error)
}

/// Resolve which half of a (test, variation) reference is missing
fn missing_pair(conn: &Connection, test_id: &TestId, variation_id: &VariationId) -> Error {
    match test_exists(conn, test_id) {
        Ok(true) => Error::NotFound(EntityRef::variation(test_id, variation_id)),
        Ok(false) => Error::NotFound(EntityRef::test(test_id)),
        Err(e) => e,
    }
}

/// Opens a SQLite database file and applies the schema.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: String,
}

impl SqliteConnector {
    /// Connector for a file path, or `:memory:` for a private database
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Connector for SqliteConnector {
    type Client = Mutex<Connection>;

    fn connect(&self) -> Result<Mutex<Connection>> {
        let conn = if self.target == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.target)
        }
        .map_err(sql_error)?;

        conn.busy_timeout(BUSY_TIMEOUT).map_err(sql_error)?;
        if self.target != IN_MEMORY {
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
                .map_err(sql_error)?;
        }
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Mutex::new(conn))
    }

    fn describe(&self) -> String {
        format!("sqlite://{}", self.target)
    }
}

/// Relational storage driver.
pub struct SqliteDriver {
    client: ClientCell<SqliteConnector>,
}

#[derive(Clone, Copy)]
enum Counter {
    Pageviews,
    Wins,
}

impl SqliteDriver {
    /// Build a driver from configuration without opening the database.
    ///
    /// `target` is the database path. SQLite has no accounts, so
    /// credentials are a configuration error.
    pub fn new(config: &DriverConfig) -> Result<Self> {
        config.validate_for(DriverKind::Sqlite)?;
        if config.username.is_some() {
            return Err(Error::Configuration(
                "sqlite driver does not accept credentials".into(),
            ));
        }
        Ok(Self {
            client: ClientCell::new(
                SqliteConnector::new(config.target.clone()),
                config.retry.to_policy(),
            ),
        })
    }

    fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        self.client.get()
    }

    fn increment(
        &self,
        counter: Counter,
        test_id: &TestId,
        variation_id: &VariationId,
    ) -> Result<u64> {
        let sql = match counter {
            Counter::Pageviews => {
                "UPDATE ab_variations SET pageviews = pageviews + 1 \
                 WHERE test_id = ?1 AND id = ?2 RETURNING pageviews"
            }
            Counter::Wins => {
                "UPDATE ab_variations SET wins = wins + 1 \
                 WHERE test_id = ?1 AND id = ?2 RETURNING wins"
            }
        };

        let client = self.connection()?;
        let conn = client.lock();
        let count: Option<i64> = conn
            .query_row(sql, params![test_id.as_str(), variation_id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(sql_error)?;

        match count {
            Some(n) => Ok(to_count(n)),
            None => Err(missing_pair(&conn, test_id, variation_id)),
        }
    }
}

impl StorageDriver for SqliteDriver {
    fn backend(&self) -> &'static str {
        DriverKind::Sqlite.as_str()
    }

    fn state(&self) -> ConnectionState {
        self.client.state()
    }

    fn connect(&self, retries: u32) -> Result<()> {
        self.client.get_with_retries(retries).map(|_| ())
    }

    fn get_tests(&self) -> Result<Vec<TestGroup>> {
        let client = self.connection()?;
        let conn = client.lock();
        let tx = conn.unchecked_transaction().map_err(sql_error)?;

        let tests = {
            let mut stmt = tx
                .prepare(&format!("SELECT {} FROM ab_tests ORDER BY id", TEST_COLUMNS))
                .map_err(sql_error)?;
            let rows = stmt.query_map([], row_to_test).map_err(sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql_error)?
        };

        let mut by_test: HashMap<TestId, Vec<Variation>> = HashMap::new();
        {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM ab_variations ORDER BY test_id, id",
                    VARIATION_COLUMNS
                ))
                .map_err(sql_error)?;
            let rows = stmt.query_map([], row_to_variation).map_err(sql_error)?;
            for row in rows {
                let variation = row.map_err(sql_error)?;
                by_test
                    .entry(variation.test_id.clone())
                    .or_default()
                    .push(variation);
            }
        }
        tx.commit().map_err(sql_error)?;

        Ok(tests
            .into_iter()
            .map(|test| TestGroup {
                variations: by_test.remove(&test.id).unwrap_or_default(),
                test,
            })
            .collect())
    }

    fn get_variations(&self, test_id: &TestId) -> Result<Vec<Variation>> {
        let client = self.connection()?;
        let conn = client.lock();
        if !test_exists(&conn, test_id)? {
            return Err(Error::NotFound(EntityRef::test(test_id)));
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM ab_variations WHERE test_id = ?1 ORDER BY id",
                VARIATION_COLUMNS
            ))
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(params![test_id.as_str()], row_to_variation)
            .map_err(sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sql_error)
    }

    fn create_test_if_dne(&self, test: &NewTest) -> Result<Test> {
        test.validate()?;
        let metadata = serde_json::to_string(&test.metadata)?;

        let client = self.connection()?;
        let conn = client.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO ab_tests (id, name, metadata, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    test.id.as_str(),
                    test.name,
                    metadata,
                    Timestamp::now().as_millis()
                ],
            )
            .map_err(sql_error)?;
        debug!(test_id = %test.id, created = inserted == 1, "create_test_if_dne");

        conn.query_row(
            &format!("SELECT {} FROM ab_tests WHERE id = ?1", TEST_COLUMNS),
            params![test.id.as_str()],
            row_to_test,
        )
        .map_err(sql_error)
    }

    fn create_variation_if_dne(
        &self,
        variation: &NewVariation,
        test_id: &TestId,
    ) -> Result<Variation> {
        variation.validate()?;
        let metadata = serde_json::to_string(&variation.metadata)?;

        let client = self.connection()?;
        let conn = client.lock();
        if !test_exists(&conn, test_id)? {
            return Err(Error::NotFound(EntityRef::test(test_id)));
        }

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO ab_variations \
                 (test_id, id, name, weight, metadata, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    test_id.as_str(),
                    variation.id.as_str(),
                    variation.name,
                    variation.weight,
                    metadata,
                    Timestamp::now().as_millis()
                ],
            )
            .map_err(sql_error)?;
        debug!(
            test_id = %test_id,
            variation_id = %variation.id,
            created = inserted == 1,
            "create_variation_if_dne"
        );

        conn.query_row(
            &format!(
                "SELECT {} FROM ab_variations WHERE test_id = ?1 AND id = ?2",
                VARIATION_COLUMNS
            ),
            params![test_id.as_str(), variation.id.as_str()],
            row_to_variation,
        )
        .map_err(sql_error)
    }

    fn add_pageview(&self, assignment: &Assignment) -> Result<u64> {
        self.increment(
            Counter::Pageviews,
            &assignment.test_id,
            &assignment.variation_id,
        )
    }

    fn add_win(&self, test_id: &TestId, variation_id: &VariationId) -> Result<u64> {
        self.increment(Counter::Wins, test_id, variation_id)
    }

    fn get_counts(&self, test_id: &TestId, variation_id: &VariationId) -> Result<EventCounts> {
        let client = self.connection()?;
        let conn = client.lock();
        let counts = conn
            .query_row(
                "SELECT pageviews, wins FROM ab_variations WHERE test_id = ?1 AND id = ?2",
                params![test_id.as_str(), variation_id.as_str()],
                |row| {
                    Ok(EventCounts {
                        pageviews: to_count(row.get(0)?),
                        wins: to_count(row.get(1)?),
                    })
                },
            )
            .optional()
            .map_err(sql_error)?;

        counts.ok_or_else(|| missing_pair(&conn, test_id, variation_id))
    }
}
