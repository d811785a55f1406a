use pebblesql::{params, Config, Connection, Error, Value};
use tempfile::tempdir;

fn count(conn: &mut Connection, table: &str) -> i64 {
    conn.execute(&format!("SELECT count(*) FROM {}", table), ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap()
        .get_as::<i64, _>(0usize)
        .unwrap()
}

#[test]
fn test_reopen_file_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.pebble");

    {
        let mut conn = Connection::open(&path).unwrap();
        conn.executescript(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, score REAL DEFAULT 0.5);
             INSERT INTO notes (id, body) VALUES (1, 'first'), (2, 'sécond');
             INSERT INTO notes VALUES (3, 'third', -1.25);",
        )
        .unwrap();
        conn.close().unwrap();
    }

    let mut conn = Connection::open(&path).unwrap();
    assert_eq!(conn.table_names(), vec!["notes"]);
    assert_eq!(count(&mut conn, "notes"), 3);

    let row = conn
        .execute("SELECT body, score FROM notes WHERE id = 2", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row["body"], Value::from("sécond"));
    assert_eq!(row["score"], Value::Real(0.5));

    // constraints survive the round trip
    let err = conn
        .execute("INSERT INTO notes VALUES (1, 'again', 0)", ())
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[test]
fn test_flush_writes_committed_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.pebble");

    let mut conn = Connection::open(&path).unwrap();
    conn.executescript("CREATE TABLE t (x); INSERT INTO t VALUES (1);")
        .unwrap();
    conn.execute("BEGIN", ()).unwrap();
    conn.execute("INSERT INTO t VALUES (2)", ()).unwrap();
    conn.flush().unwrap();

    let mut other = Connection::open_with_config(Config::new().path(&path).flush_on_close(false))
        .unwrap();
    assert_eq!(count(&mut other, "t"), 1);

    // closing rolls back the open scope before writing
    conn.close().unwrap();
    let mut reopened = Connection::open(&path).unwrap();
    assert_eq!(count(&mut reopened, "t"), 1);
}

#[test]
fn test_close_with_pending_results() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript("CREATE TABLE t (x); INSERT INTO t VALUES (1), (2);")
        .unwrap();

    let mut pending = conn.execute("SELECT x FROM t", ()).unwrap();
    pending.fetch_one().unwrap();
    let err = conn.close().unwrap_err();
    assert!(matches!(err, Error::ResultSetBusy(_)));
    assert!(!conn.is_closed());

    drop(pending);
    conn.close().unwrap();
    assert!(conn.is_closed());
    assert!(matches!(
        conn.execute("SELECT 1", ()).unwrap_err(),
        Error::Misuse(_)
    ));
}

#[test]
fn test_load_dump_round_trip() {
    let mut source = Connection::open_in_memory().unwrap();
    source
        .executescript(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT COLLATE NOCASE UNIQUE, photo BLOB);
             CREATE TABLE \"odd \"\"name\"\"\" (v REAL NOT NULL DEFAULT 1.0);
             INSERT INTO people VALUES (1, 'O''Brien', X'CAFE'), (2, NULL, NULL);
             INSERT INTO \"odd \"\"name\"\"\" VALUES (2.5), (-0.125), (1e300);",
        )
        .unwrap();
    source
        .execute("CREATE TABLE extremes (n INTEGER DEFAULT -9223372036854775807)", ())
        .unwrap();
    source
        .executemany(
            "INSERT INTO extremes VALUES (?)",
            vec![params![i64::MIN], params![i64::MAX], params![0]],
        )
        .unwrap();

    let dump = source.dump();
    assert_eq!(dump.first().map(String::as_str), Some("BEGIN TRANSACTION;"));
    assert_eq!(dump.last().map(String::as_str), Some("COMMIT;"));

    let mut copy = Connection::open_in_memory().unwrap();
    copy.load(&dump).unwrap();
    assert!(!copy.in_transaction());
    assert_eq!(copy.table_names(), source.table_names());
    assert_eq!(copy.dump(), dump);

    let rows = copy
        .execute("SELECT n, typeof(n) FROM extremes ORDER BY n", ())
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(rows[0][0], Value::Integer(i64::MIN));
    assert_eq!(rows[0][1], Value::from("integer"));
    assert_eq!(rows[2][0], Value::Integer(i64::MAX));
}

#[test]
fn test_load_busy_and_atomic() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript("CREATE TABLE t (x); INSERT INTO t VALUES (1);")
        .unwrap();

    let pending = conn.execute("SELECT x FROM t", ()).unwrap();
    let err = conn.load(["CREATE TABLE u (y);"]).unwrap_err();
    assert!(matches!(err, Error::ResultSetBusy(_)));
    drop(pending);

    // the second statement fails, so the first is undone
    let err = conn
        .load(["CREATE TABLE u (y);", "CREATE TABLE t (x);"])
        .unwrap_err();
    assert!(matches!(err, Error::TableAlreadyExists(_)));
    assert_eq!(conn.table_names(), vec!["t"]);
}

#[test]
fn test_backup_to_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("backup.pebble");

    let mut source =
        Connection::open_with_config(Config::new().backup_page_rows(1)).unwrap();
    source
        .executescript("CREATE TABLE t (x); INSERT INTO t VALUES (1), (2), (3);")
        .unwrap();

    let mut dest = Connection::open(&path).unwrap();
    let mut steps = 0;
    source
        .backup(&mut dest, 2, |progress| {
            steps += 1;
            assert_eq!(progress.total, 3);
        })
        .unwrap();
    assert_eq!(steps, 2);
    dest.close().unwrap();

    let mut reopened = Connection::open(&path).unwrap();
    assert_eq!(count(&mut reopened, "t"), 3);
}
