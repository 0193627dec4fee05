//! Benchmark utilities.

use rand::Rng;
use rangedb_core::{CursorConfig, Database, DatabaseConfig};

/// URI of the benchmark table.
pub const TABLE: &str = "table:bench";

/// Generate a random string value of the specified size.
pub fn random_value(size: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect()
}

/// Generate `count` random keys in `0..max`.
pub fn random_keys(count: usize, max: i64) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(0..max)).collect()
}

/// Opens an in-memory database whose `table:bench` holds keys `0..count`,
/// each with a random value of `value_size` bytes.
pub fn populated(count: i64, value_size: usize, leaf_page_max_entries: usize) -> Database {
    let config = DatabaseConfig::new().leaf_page_max_entries(leaf_page_max_entries);
    let db = Database::open_in_memory_with_config(config).expect("open database");
    let session = db.open_session();
    session
        .create(TABLE, "key_format=q,value_format=S".parse().expect("table config"))
        .expect("create table");
    let mut cursor = session
        .open_cursor(TABLE, CursorConfig::new())
        .expect("open cursor");
    for k in 0..count {
        cursor.set_key(k);
        cursor.set_value(random_value(value_size));
        cursor.insert().expect("insert");
    }
    drop(cursor);
    db
}
