use pebblesql::{named_params, params, Connection, Error, Value};

fn setup() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
        (),
    )
    .unwrap();
    conn
}

#[test]
fn test_insert_then_select() {
    let mut conn = setup();
    let inserted = conn
        .execute("INSERT INTO people VALUES (?, ?, ?)", params![1, "Ada", 36])
        .unwrap();
    assert_eq!(inserted.rows_affected(), 1);
    assert_eq!(conn.last_insert_rowid(), 1);

    let rows = conn
        .execute("SELECT * FROM people", ())
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keys(), ["id", "name", "age"]);
    assert_eq!(rows[0]["name"], Value::from("Ada"));
    assert_eq!(rows[0].get_as::<i64, _>("AGE").unwrap(), 36);
}

#[test]
fn test_duplicate_primary_key() {
    let mut conn = setup();
    conn.execute("INSERT INTO people VALUES (1, 'Ada', 36)", ())
        .unwrap();

    let err = conn
        .execute("INSERT INTO people VALUES (1, 'Grace', 45)", ())
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));

    let count = conn
        .execute("SELECT count(*) AS n FROM people", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(count["n"], Value::Integer(1));
}

#[test]
fn test_executemany() {
    let mut conn = setup();
    let rows = vec![
        params![1, "Ada", 36],
        params![2, "Grace", 45],
        params![3, "Edsger", None::<i64>],
    ];
    assert_eq!(
        conn.executemany("INSERT INTO people VALUES (?, ?, ?)", rows)
            .unwrap(),
        3
    );
    assert_eq!(conn.changes(), 3);

    // aborts at the failing tuple; earlier tuples stay
    let err = conn
        .executemany(
            "INSERT INTO people (id, name) VALUES (:id, :name)",
            vec![
                named_params! { "id" => 4, "name" => "Barbara" },
                named_params! { "id" => 1, "name" => "Dup" },
                named_params! { "id" => 5, "name" => "Never" },
            ],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));

    let names: Vec<String> = conn
        .execute("SELECT name FROM people ORDER BY id", ())
        .unwrap()
        .map(|row| row.unwrap().get_as::<String, _>(0usize).unwrap())
        .collect();
    assert_eq!(names, ["Ada", "Grace", "Edsger", "Barbara"]);

    let err = conn
        .executemany("SELECT * FROM people", vec![params![]])
        .unwrap_err();
    assert!(matches!(err, Error::Misuse(_)));
}

#[test]
fn test_sum_and_total() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript("CREATE TABLE n (x INTEGER); INSERT INTO n VALUES (1), (2);")
        .unwrap();

    let row = conn
        .execute("SELECT sum(x), total(x), avg(x) FROM n", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Integer(3));
    assert_eq!(row[1], Value::Real(3.0));
    assert_eq!(row[2], Value::Real(1.5));

    let row = conn
        .execute("SELECT sum(x), total(x), count(*) FROM n WHERE x > 10", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Null);
    assert_eq!(row[1], Value::Real(0.0));
    assert_eq!(row[2], Value::Integer(0));
}

#[test]
fn test_parameter_count_mismatch() {
    let mut conn = setup();
    let err = conn
        .execute("INSERT INTO people VALUES (?, ?, ?)", params![1, "Ada"])
        .unwrap_err();
    assert!(matches!(err, Error::ParameterCount(_)));

    let err = conn
        .execute(
            "SELECT * FROM people WHERE name = :name",
            named_params! { "other" => "x" },
        )
        .unwrap_err();
    assert!(matches!(err, Error::ParameterCount(_)));
}

#[test]
fn test_result_set_sees_snapshot() {
    let mut conn = setup();
    conn.executescript("INSERT INTO people VALUES (1, 'Ada', 36), (2, 'Grace', 45);")
        .unwrap();

    let mut pending = conn.execute("SELECT name FROM people", ()).unwrap();
    let first = pending.fetch_one().unwrap().unwrap();
    assert_eq!(first[0], Value::from("Ada"));

    conn.execute("DELETE FROM people", ()).unwrap();
    assert_eq!(conn.changes(), 2);

    let rest = pending.fetch_all().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0][0], Value::from("Grace"));
}

#[test]
fn test_group_by_and_having() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript(
        "CREATE TABLE sales (region TEXT COLLATE NOCASE, amount INTEGER);
         INSERT INTO sales VALUES ('north', 10), ('South', 5), ('NORTH', 7), ('south', 1), ('east', 2);",
    )
    .unwrap();

    let rows: Vec<(String, i64)> = conn
        .execute(
            "SELECT region, sum(amount) AS total FROM sales
             GROUP BY region HAVING sum(amount) > 3 ORDER BY total DESC",
            (),
        )
        .unwrap()
        .map(|row| {
            let row = row.unwrap();
            (
                row.get_as::<String, _>(0usize).unwrap().to_lowercase(),
                row.get_as::<i64, _>(1usize).unwrap(),
            )
        })
        .collect();
    assert_eq!(rows, vec![("north".to_string(), 17), ("south".to_string(), 6)]);
}

#[test]
fn test_execute_rejects_multiple_statements() {
    let mut conn = setup();
    let err = conn
        .execute("SELECT 1; SELECT 2", ())
        .unwrap_err();
    assert!(matches!(err, Error::Misuse(_)));

    let empty = conn.execute("  -- nothing here\n", ()).unwrap();
    assert!(empty.columns().is_empty());
}

#[test]
fn test_undefined_real_arithmetic_is_null() {
    let mut conn = Connection::open_in_memory().unwrap();
    let row = conn
        .execute(
            "SELECT 1e999 - 1e999 = 5, typeof(1e999 - 1e999), 0 * 1e999, 1e999 > 1e300",
            (),
        )
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Null);
    assert_eq!(row[1], Value::from("null"));
    assert_eq!(row[2], Value::Null);
    assert_eq!(row[3], Value::Integer(1));
}

#[test]
fn test_infinities_group_and_sort() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript(
        "CREATE TABLE r (x REAL);
         INSERT INTO r VALUES (1.5), (2.5), (1e999), (-1e999), (1e999 - 1e999), (NULL), (2.5);",
    )
    .unwrap();

    let sorted: Vec<Value> = conn
        .execute("SELECT x FROM r ORDER BY x", ())
        .unwrap()
        .map(|row| row.unwrap()[0].clone())
        .collect();
    assert_eq!(
        sorted,
        [
            Value::Null,
            Value::Null,
            Value::Real(f64::NEG_INFINITY),
            Value::Real(1.5),
            Value::Real(2.5),
            Value::Real(2.5),
            Value::Real(f64::INFINITY),
        ]
    );

    let distinct = conn
        .execute("SELECT DISTINCT x FROM r", ())
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(distinct.len(), 5);

    let groups = conn
        .execute("SELECT x, count(*) FROM r GROUP BY x", ())
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(groups.len(), 5);

    let row = conn
        .execute("SELECT count(DISTINCT x), count(x) FROM r", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Integer(4));
    assert_eq!(row[1], Value::Integer(5));
}
