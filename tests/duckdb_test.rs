//! Integration tests for the DuckDB adapter.

use dbshrink::condition::CompareOp;
use dbshrink::{
    Condition, Database, DuckDbDatabase, FilterOptions, Record, SanitizerOptions, ShrinkError,
    Shrinker, SubTableOptions, TableOptions, Value, ViolationKind,
};
use std::rc::Rc;
use tempfile::TempDir;

fn seeded(batch_size: usize) -> DuckDbDatabase {
    let db = DuckDbDatabase::open_in_memory(batch_size).unwrap();
    db.connection()
        .execute_batch(
            r#"
CREATE TABLE test_table (id INTEGER PRIMARY KEY, name VARCHAR, test INTEGER);
INSERT INTO test_table SELECT i, 'row ' || CAST(i AS VARCHAR), i FROM range(1, 21) t(i);
"#,
        )
        .unwrap();
    db
}

fn count(db: &DuckDbDatabase, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

fn low_rows(db: &DuckDbDatabase) -> Vec<Record> {
    db.get_records("test_table", &Condition::compare("test", CompareOp::Le, 5))
        .unwrap()
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_batches_of_five() {
    let db = seeded(5);
    let database: &dyn Database = &db;

    let batches: Vec<_> = database
        .batches("test_table", Some("id"))
        .collect::<anyhow::Result<_>>()
        .unwrap();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 5, 5]);

    let ids: Vec<i64> = batches
        .iter()
        .flatten()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[test]
fn test_batches_survive_deletes_in_flight() {
    let db = seeded(5);
    let database: &dyn Database = &db;

    let mut seen = 0;
    for batch in database.batches("test_table", Some("id")) {
        let batch = batch.unwrap();
        seen += batch.len();
        let first = batch[0].get("id").cloned().unwrap();
        db.delete_records("test_table", &Condition::eq("id", first))
            .unwrap();
    }
    assert_eq!(seen, 20);
    assert_eq!(count(&db, "test_table"), 16);
}

#[test]
fn test_keyless_batches() {
    let db = DuckDbDatabase::open_in_memory(4).unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE logs (line INTEGER, msg VARCHAR);
             INSERT INTO logs SELECT i, 'm' FROM range(0, 10) t(i);",
        )
        .unwrap();
    let database: &dyn Database = &db;
    let sizes: Vec<usize> = database
        .batches("logs", None)
        .map(|b| b.unwrap().len())
        .collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

// ============================================================================
// Record operations
// ============================================================================

#[test]
fn test_get_records_converts_types() {
    let db = seeded(5);
    let records = db.get_records("test_table", &Condition::eq("id", 3)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&Value::from("row 3")));
    assert_eq!(records[0].get("test"), Some(&Value::Integer(3)));
}

#[test]
fn test_matches_condition() {
    let db = seeded(5);
    let yaml = "matches: { column: name, pattern: '^row 1[0-9]$' }";
    let condition: Condition = serde_yaml_ng::from_str(yaml).unwrap();
    assert_eq!(db.get_records("test_table", &condition).unwrap().len(), 10);
}

#[test]
fn test_update_records() {
    let db = seeded(5);
    let old = low_rows(&db);
    let new: Vec<Record> = old
        .iter()
        .map(|r| {
            let mut r = r.clone();
            let test = r.get("test").and_then(Value::as_i64).unwrap();
            r.set("test", test * 100);
            r
        })
        .collect();

    db.update_records("test_table", "id", &old, &new).unwrap();

    assert!(low_rows(&db).is_empty());
    assert_eq!(count(&db, "test_table"), 20);
    let updated = db
        .get_records("test_table", &Condition::eq("id", 2))
        .unwrap();
    assert_eq!(updated[0].get("test"), Some(&Value::Integer(200)));
}

#[test]
fn test_update_rejects_primary_key_change() {
    let db = seeded(5);
    let old = low_rows(&db);
    let mut new = old.clone();
    new[0].set("id", 1000);

    let err = db.update_records("test_table", "id", &old, &new).unwrap_err();
    let kind = err
        .downcast_ref::<ShrinkError>()
        .and_then(ShrinkError::violation_kind)
        .cloned();
    assert!(matches!(kind, Some(ViolationKind::PrimaryKeyChanged { .. })));
    assert_eq!(low_rows(&db).len(), 5);
}

#[test]
fn test_update_rejects_deletion() {
    let db = seeded(5);
    let old = low_rows(&db);
    let new: Vec<Record> = old.iter().skip(1).cloned().collect();

    let err = db.update_records("test_table", "id", &old, &new).unwrap_err();
    assert!(err.downcast_ref::<ShrinkError>().is_some());
    assert_eq!(count(&db, "test_table"), 20);
}

#[test]
fn test_delete_records() {
    let db = seeded(5);
    let deleted = db
        .delete_records("test_table", &Condition::between("test", 1, 5))
        .unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(count(&db, "test_table"), 15);
    assert!(low_rows(&db).is_empty());
}

#[test]
fn test_null_comparisons() {
    let db = seeded(5);
    db.connection()
        .execute("UPDATE test_table SET test = NULL WHERE id = 1", [])
        .unwrap();

    assert_eq!(low_rows(&db).len(), 4, "NULL does not compare");

    // A negated comparison matches the NULL row, as it does in memory
    let condition = Condition::compare("test", CompareOp::Gt, 5).negate();
    let deleted = db.delete_records("test_table", &condition).unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(count(&db, "test_table"), 15);
}

#[test]
fn test_timestamp_precisions_filter_correctly() {
    let db = Rc::new(DuckDbDatabase::open_in_memory(2).unwrap());
    db.connection()
        .execute_batch(
            r#"
CREATE TABLE events (id INTEGER PRIMARY KEY, at_ns TIMESTAMP_NS, at_s TIMESTAMP_S);
INSERT INTO events VALUES
    (1, TIMESTAMP_NS '2023-06-01 08:00:00', TIMESTAMP_S '2023-06-01 08:00:00'),
    (2, TIMESTAMP_NS '2024-03-15 09:30:00.123456789', TIMESTAMP_S '2024-03-15 09:30:00'),
    (3, TIMESTAMP_NS '2025-01-01 00:00:00', TIMESTAMP_S '2025-01-01 00:00:00');
"#,
        )
        .unwrap();

    let rows = db.get_records("events", &Condition::eq("id", 2)).unwrap();
    assert_eq!(
        rows[0].get("at_ns"),
        Some(&Value::from("2024-03-15 09:30:00.123456789"))
    );
    assert_eq!(rows[0].get("at_s"), Some(&Value::from("2024-03-15 09:30:00")));

    let database: Rc<dyn Database> = db.clone();
    let mut shrinker = Shrinker::new(Some(database));
    shrinker
        .table("events")
        .register_filter(
            FilterOptions::default(),
            |r: &Record| {
                let recent = |column: &str| {
                    r.get(column)
                        .and_then(Value::as_str)
                        .is_some_and(|at| at >= "2024-01-01")
                };
                recent("at_ns") && recent("at_s")
            },
        )
        .unwrap();

    let stats = shrinker.filter().unwrap();
    assert_eq!(stats.rows_removed, 1);
    let ids: Vec<i64> = db
        .get_records("events", &Condition::All)
        .unwrap()
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_enum_and_list_columns_read_as_text() {
    let db = Rc::new(DuckDbDatabase::open_in_memory(5).unwrap());
    db.connection()
        .execute_batch(
            r#"
CREATE TYPE mood AS ENUM ('happy', 'sad');
CREATE TABLE people (id INTEGER PRIMARY KEY, mood mood, tags VARCHAR[]);
INSERT INTO people VALUES (1, 'happy', ['a', 'b']), (2, 'sad', ['c']), (3, 'happy', []);
"#,
        )
        .unwrap();

    let rows = db.get_records("people", &Condition::eq("id", 1)).unwrap();
    assert_eq!(rows[0].get("mood"), Some(&Value::from("happy")));
    let tags = rows[0].get("tags").and_then(Value::as_str).unwrap();
    assert!(tags.starts_with('[') && tags.contains('a') && tags.contains('b'));

    let database: Rc<dyn Database> = db.clone();
    let mut shrinker = Shrinker::new(Some(database));
    let people = shrinker.table("people");
    people
        .register_filter(FilterOptions::default(), Condition::eq("mood", "happy"))
        .unwrap();
    people
        .register_sanitizer(SanitizerOptions::default(), |mut r: Record| {
            r.set("mood", "sad");
            r
        })
        .unwrap();

    let stats = shrinker.shrink().unwrap();
    assert_eq!(stats.rows_removed, 1);
    assert_eq!(stats.rows_sanitized, 2);
    let happy: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM people WHERE mood = 'happy'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(happy, 0);
    assert_eq!(count(&db, "people"), 2);
}

// ============================================================================
// Through the shrinker
// ============================================================================

#[test]
fn test_remove_table() {
    let db = Rc::new(seeded(5));
    let database: Rc<dyn Database> = db.clone();
    let mut shrinker = Shrinker::new(Some(database));
    shrinker
        .remove_table("test_table", TableOptions::default())
        .unwrap();

    let stats = shrinker.shrink().unwrap();
    assert_eq!(stats.tables_removed, 1);
    assert_eq!(stats.rows_removed, 20);
    assert_eq!(count(&db, "test_table"), 0);
}

#[test]
fn test_remove_keyless_table() {
    let db = Rc::new(DuckDbDatabase::open_in_memory(5).unwrap());
    db.connection()
        .execute_batch(
            "CREATE TABLE sessions (token VARCHAR, user_id INTEGER);
             INSERT INTO sessions SELECT 't' || CAST(i AS VARCHAR), i FROM range(0, 12) t(i);",
        )
        .unwrap();

    let database: Rc<dyn Database> = db.clone();
    let mut shrinker = Shrinker::new(Some(database));
    shrinker
        .remove_table("sessions", TableOptions::keyless())
        .unwrap();

    let stats = shrinker.filter().unwrap();
    assert_eq!(stats.rows_removed, 12);
    assert_eq!(count(&db, "sessions"), 0);
}

#[test]
fn test_file_database_cascade_and_sanitize() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.duckdb");

    {
        let db = DuckDbDatabase::open(&path, 3).unwrap();
        db.connection()
            .execute_batch(
                r#"
CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR, active BOOLEAN);
CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total DOUBLE);
CREATE TABLE line_items (id INTEGER PRIMARY KEY, order_id INTEGER, sku VARCHAR);
INSERT INTO users SELECT i, 'user' || CAST(i AS VARCHAR) || '@example.com', i % 2 = 0 FROM range(1, 11) t(i);
INSERT INTO orders SELECT i, ((i - 1) % 10) + 1, i * 1.5 FROM range(1, 31) t(i);
INSERT INTO line_items SELECT i, ((i - 1) % 30) + 1, 'sku' || CAST(i AS VARCHAR) FROM range(1, 61) t(i);
"#,
            )
            .unwrap();
    }

    let db = Rc::new(DuckDbDatabase::open(&path, 3).unwrap());
    let database: Rc<dyn Database> = db.clone();
    let mut shrinker = Shrinker::new(Some(database));

    let users = shrinker.table("users");
    users
        .register_filter(FilterOptions::named("active"), Condition::eq("active", true))
        .unwrap();
    users
        .register_subtable("orders", SubTableOptions::new("user_id"))
        .unwrap();
    users
        .register_sanitizer(SanitizerOptions::named("email"), |mut r: Record| {
            let id = r.get("id").and_then(Value::as_i64).unwrap_or_default();
            r.set("email", format!("user{}@test.invalid", id));
            r
        })
        .unwrap();
    shrinker
        .table("orders")
        .register_subtable("line_items", SubTableOptions::new("order_id"))
        .unwrap();

    let stats = shrinker.shrink().unwrap();

    assert_eq!(stats.rows_removed, 5);
    assert_eq!(stats.rows_cascaded, 15 + 30);
    assert_eq!(stats.rows_sanitized, 5);
    assert_eq!(count(&db, "users"), 5);
    assert_eq!(count(&db, "orders"), 15);
    assert_eq!(count(&db, "line_items"), 30);

    let orphans: i64 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM orders o LEFT JOIN users u ON o.user_id = u.id WHERE u.id IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphans, 0);

    let leaked: i64 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM users WHERE email LIKE '%@example.com'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(leaked, 0);
}
