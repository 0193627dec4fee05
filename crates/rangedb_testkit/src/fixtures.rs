//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases,
//! populating tables and reading them back.

use rangedb_core::{
    BeginConfig, BoundConfig, CommitConfig, CoreError, CoreResult, Cursor, CursorConfig, Database,
    DatabaseConfig, Key, Session, Timestamp, Value,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// URI of the table most fixtures create.
pub const TABLE: &str = "table:test";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(DatabaseConfig::default())
    }

    /// Creates a new in-memory test database with custom configuration.
    pub fn memory_with_config(config: DatabaseConfig) -> Self {
        Self {
            db: Database::open_in_memory_with_config(config)
                .expect("Failed to open in-memory database"),
            _temp_dir: None,
        }
    }

    /// Creates a new database in a temporary home directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open file database");
        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the home directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl std::ops::DerefMut for TestDatabase {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use rangedb_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         let session = db.open_session();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a database in a temporary home directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &std::path::Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Runs a mutable test with a temporary database.
pub fn with_temp_db_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Database) -> R,
{
    let mut test_db = TestDatabase::memory();
    f(&mut test_db.db)
}

/// Creates `uri` with the given `key_format=..,value_format=..` string.
pub fn create_table(db: &Database, uri: &str, config: &str) {
    db.open_session()
        .create(uri, config.parse().expect("Invalid table config"))
        .expect("Failed to create table");
}

/// Inserts `(key, value)` pairs, optionally in one transaction committed at `commit_ts`.
pub fn populate<K, V>(
    session: &Session,
    uri: &str,
    records: impl IntoIterator<Item = (K, V)>,
    commit_ts: Option<Timestamp>,
) -> CoreResult<()>
where
    K: Into<Key>,
    V: Into<Value>,
{
    if commit_ts.is_some() {
        session.begin_transaction(&BeginConfig::new())?;
    }
    {
        let mut cursor = session.open_cursor(uri, CursorConfig::new())?;
        for (key, value) in records {
            cursor.set_key(key);
            cursor.set_value(value);
            cursor.insert()?;
        }
    }
    if let Some(ts) = commit_ts {
        session.commit_transaction(&CommitConfig::new().commit_timestamp(ts))?;
    }
    Ok(())
}

/// Creates `table:test` (`key_format=q,value_format=S`) holding `keys`, each
/// with `value`.
pub fn int_table(db: &Database, keys: impl IntoIterator<Item = i64>, value: &str) {
    create_table(db, TABLE, "key_format=q,value_format=S");
    let session = db.open_session();
    populate(&session, TABLE, keys.into_iter().map(|k| (k, value)), None)
        .expect("Failed to populate table");
}

/// Installs a bound at `key`.
pub fn set_bound(cursor: &mut Cursor<'_>, key: impl Into<Key>, config: BoundConfig) -> CoreResult<()> {
    cursor.set_key(key);
    cursor.bound(config)
}

/// Steps a cursor until not-found and returns every record seen.
pub fn drain(cursor: &mut Cursor<'_>, forward: bool) -> CoreResult<Vec<(Key, Value)>> {
    let mut records = Vec::new();
    loop {
        let step = if forward { cursor.next() } else { cursor.prev() };
        match step {
            Ok(()) => records.push((cursor.key()?, cursor.value()?)),
            Err(CoreError::NotFound) => return Ok(records),
            Err(e) => return Err(e),
        }
    }
}

/// Integer keys returned by [`drain`].
pub fn int_keys(records: &[(Key, Value)]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|(k, _)| match k {
            Key::Int(i) => Some(*i),
            _ => None,
        })
        .collect()
}

/// Reads one record through a fresh cursor.
pub fn read(session: &Session, uri: &str, key: impl Into<Key>) -> CoreResult<Value> {
    let mut cursor = session.open_cursor(uri, CursorConfig::new())?;
    cursor.set_key(key);
    cursor.search()?;
    cursor.value()
}

/// Preset databases.
pub mod presets {
    use super::*;

    /// Creates a database whose `table:test` holds keys `1..=count` with value `v1`.
    pub fn populated_database(count: i64) -> TestDatabase {
        let test_db = TestDatabase::memory();
        int_table(&test_db.db, 1..=count, "v1");
        test_db
    }

    /// Like [`populated_database`] with small leaf pages, so range
    /// truncates take the fast-delete path.
    pub fn paged_database(count: i64, leaf_page_max_entries: usize) -> TestDatabase {
        let config = DatabaseConfig::new().leaf_page_max_entries(leaf_page_max_entries);
        let test_db = TestDatabase::memory_with_config(config);
        int_table(&test_db.db, 1..=count, "v1");
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert!(test_db.tables().is_empty());
    }

    #[test]
    fn test_file_database() {
        with_file_db(|db, path| {
            assert_eq!(db.path(), Some(path));
        });
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = presets::populated_database(10);
        let session = test_db.open_session();
        let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
        let records = drain(&mut cursor, true).unwrap();
        assert_eq!(int_keys(&records), (1..=10).collect::<Vec<_>>());
        assert_eq!(read(&session, TABLE, 3i64).unwrap(), Value::str("v1"));
    }

    #[test]
    fn test_timestamped_populate() {
        with_temp_db(|db| {
            create_table(db, TABLE, "key_format=q,value_format=S");
            let session = db.open_session();
            populate(&session, TABLE, [(1i64, "a")], Some(Timestamp::new(10))).unwrap();
            assert!(!session.in_transaction());
        });
    }
}
