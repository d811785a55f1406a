use pebblesql::{Aggregate, BoxError, Connection, Error, Param, Value};

fn words() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript(
        "CREATE TABLE words (w TEXT);
         INSERT INTO words VALUES ('pear'), ('Apple'), ('fig'), ('banana');",
    )
    .unwrap();
    conn
}

fn column(conn: &mut Connection, sql: &str) -> pebblesql::Result<Vec<String>> {
    conn.execute(sql, ())?
        .map(|row| row.and_then(|r| r.get_as::<String, _>(0usize)))
        .collect()
}

#[test]
fn test_collation_register_and_remove() {
    let mut conn = words();
    conn.create_collation("by_length", |a, b| a.len().cmp(&b.len()).then(a.cmp(b)));

    assert_eq!(
        column(&mut conn, "SELECT w FROM words ORDER BY w COLLATE by_length").unwrap(),
        ["fig", "pear", "Apple", "banana"]
    );

    assert!(conn.remove_collation("by_length"));
    let err = column(&mut conn, "SELECT w FROM words ORDER BY w COLLATE by_length").unwrap_err();
    assert!(matches!(err, Error::UnknownCollation(_)));

    // plain ordering is unaffected
    assert_eq!(
        column(&mut conn, "SELECT w FROM words ORDER BY w").unwrap(),
        ["Apple", "banana", "fig", "pear"]
    );
}

#[test]
fn test_builtin_nocase_collation() {
    let mut conn = words();
    assert_eq!(
        column(&mut conn, "SELECT w FROM words ORDER BY w COLLATE NOCASE").unwrap(),
        ["Apple", "banana", "fig", "pear"]
    );
    assert_eq!(
        column(&mut conn, "SELECT w FROM words WHERE w = 'APPLE' COLLATE NOCASE").unwrap(),
        ["Apple"]
    );
}

#[test]
fn test_scalar_function() {
    let mut conn = words();
    conn.create_function("reverse", 1, |args| {
        Ok(match &args[0] {
            Value::Text(s) => Value::Text(s.chars().rev().collect()),
            other => other.clone(),
        })
    })
    .unwrap();

    assert_eq!(
        column(&mut conn, "SELECT reverse(w) FROM words WHERE w LIKE 'f%'").unwrap(),
        ["gif"]
    );

    conn.create_function("fail", 0, |_| Err("no luck".into()))
        .unwrap();
    let err = conn
        .execute("SELECT fail()", ())
        .and_then(|rs| rs.fetch_all())
        .unwrap_err();
    assert!(matches!(err, Error::Evaluation(_)));

    assert!(conn.remove_function("reverse", 1));
    let err = conn.execute("SELECT reverse(w) FROM words", ()).unwrap_err();
    assert!(matches!(err, Error::UnknownFunction { .. }));
}

#[derive(Default)]
struct Longest {
    best: Option<String>,
}

impl Aggregate for Longest {
    fn step(&mut self, args: &[Value]) -> Result<(), BoxError> {
        if let Value::Text(s) = &args[0] {
            if self.best.as_ref().map_or(true, |b| s.len() > b.len()) {
                self.best = Some(s.clone());
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value, BoxError> {
        Ok(self.best.take().map_or(Value::Null, Value::Text))
    }
}

#[test]
fn test_custom_aggregate() {
    let mut conn = words();
    conn.create_aggregate("longest", 1, || Box::new(Longest::default()))
        .unwrap();

    assert_eq!(
        column(&mut conn, "SELECT longest(w) FROM words").unwrap(),
        ["banana"]
    );
    let row = conn
        .execute("SELECT longest(w) FROM words WHERE w = 'kiwi'", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Null);
}

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

#[test]
fn test_adapters_and_converters() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute("CREATE TABLE shapes (name TEXT, origin point)", ())
        .unwrap();

    let origin = Point { x: 3, y: -4 };
    let err = conn
        .execute(
            "INSERT INTO shapes VALUES (?, ?)",
            vec![Param::from("a"), Param::adapt(origin.clone())],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Adaptation(_)));

    conn.register_adapter(|p: &Point| Value::Text(format!("{};{}", p.x, p.y)));
    conn.register_converter("POINT", |v: &Value| -> Result<Point, BoxError> {
        let text = v.as_str().ok_or("not text")?;
        let (x, y) = text.split_once(';').ok_or("missing separator")?;
        Ok(Point {
            x: x.parse()?,
            y: y.parse()?,
        })
    });

    conn.execute(
        "INSERT INTO shapes VALUES (?, ?)",
        vec![Param::from("a"), Param::adapt(origin.clone())],
    )
    .unwrap();

    let row = conn
        .execute("SELECT origin FROM shapes", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::from("3;-4"));
    assert_eq!(row.convert::<Point, _>("origin").unwrap(), origin);
}

#[test]
fn test_text_factory() {
    let mut conn = words();
    conn.set_text_factory(|s| Value::Text(s.to_uppercase()));
    assert_eq!(
        column(&mut conn, "SELECT w FROM words WHERE w = 'fig'").unwrap(),
        ["FIG"]
    );

    conn.clear_text_factory();
    assert_eq!(
        column(&mut conn, "SELECT w FROM words WHERE w = 'fig'").unwrap(),
        ["fig"]
    );
}

#[test]
fn test_collation_on_comparison() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.create_collation("reverse", |a, b| b.cmp(a));
    conn.executescript(
        "CREATE TABLE t (v TEXT COLLATE reverse);
         INSERT INTO t VALUES ('a'), ('c'), ('b');",
    )
    .unwrap();

    assert_eq!(
        column(&mut conn, "SELECT v FROM t ORDER BY v").unwrap(),
        ["c", "b", "a"]
    );
    assert_eq!(
        column(&mut conn, "SELECT v FROM t WHERE v < 'b'").unwrap(),
        ["c"]
    );
}

#[test]
fn test_distinct_aggregate_uses_collation() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.executescript(
        "CREATE TABLE tags (v TEXT COLLATE NOCASE);
         INSERT INTO tags VALUES ('a'), ('A'), ('b'), ('B'), ('c');",
    )
    .unwrap();

    let row = conn
        .execute("SELECT count(DISTINCT v), count(DISTINCT v COLLATE binary) FROM tags", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Integer(3));
    assert_eq!(row[1], Value::Integer(5));

    let distinct = conn
        .execute("SELECT DISTINCT v FROM tags", ())
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(distinct.len(), 3);
}
