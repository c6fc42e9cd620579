//! Integration tests against a live ODBC driver.
//!
//! The connection string comes from the `TETHER_ODBC_CONNECTION` environment
//! variable, falling back to the SQLite3 ODBC driver with an in-memory
//! database. Every test skips cleanly when no driver is installed.

use tether_odbc::{
    execute, just_execute, ConnectTarget, Connection, OdbcError, ParamDirection, Statement,
    Transaction,
};

fn connect() -> Option<Connection> {
    let target = std::env::var("TETHER_ODBC_CONNECTION")
        .unwrap_or_else(|_| "Driver=SQLite3;Database=:memory:;".to_string());
    match Connection::open(ConnectTarget::ConnectionString(&target)) {
        Ok(conn) => Some(conn),
        Err(err) => {
            eprintln!("skipping live test, no ODBC driver available: {err}");
            None
        }
    }
}

fn count_rows(conn: &Connection, query: &str) -> i64 {
    let rows = execute(conn, query).unwrap().unwrap();
    assert!(rows.next().unwrap());
    rows.get::<i64>(0).unwrap()
}

#[test]
fn test_connection_state_and_metadata() {
    let Some(conn) = connect() else { return };
    assert!(conn.connected());
    assert_eq!(conn.transactions(), 0);
    assert!(!conn.dbms_name().unwrap().is_empty());

    // Reconnecting without an explicit disconnect is a contract violation.
    let err = conn
        .connect(ConnectTarget::ConnectionString("Driver=SQLite3;"))
        .unwrap_err();
    assert!(matches!(err, OdbcError::Programming(_)));

    conn.disconnect().unwrap();
    assert!(!conn.connected());
    // Disconnecting twice is a no-op.
    conn.disconnect().unwrap();
}

#[test]
fn test_null_and_ordered_rows_scenario() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE t (a INT, b TEXT)").unwrap();
    just_execute(
        &conn,
        "INSERT INTO t VALUES (NULL,'z'), (1,'one'), (2,'two'), (3,'tri')",
    )
    .unwrap();

    let rows = execute(&conn, "SELECT a, b FROM t ORDER BY a").unwrap().unwrap();
    assert_eq!(rows.columns(), 2);
    assert_eq!(rows.position().unwrap(), 0);
    assert!(!rows.end());

    // Null sorts first: is_null observes it, get raises, get_or falls back.
    assert!(rows.next().unwrap());
    assert!(rows.is_null(0).unwrap());
    assert!(matches!(
        rows.get::<i32>(0),
        Err(OdbcError::NullAccess { column: 0 })
    ));
    assert_eq!(rows.get_or::<i32>(0, -1).unwrap(), -1);
    assert_eq!(rows.get::<String>(1).unwrap(), "z");

    for (a, b) in [(1, "one"), (2, "two"), (3, "tri")] {
        assert!(rows.next().unwrap());
        assert_eq!(rows.get::<i32>(0).unwrap(), a);
        assert_eq!(rows.get::<String>(1).unwrap(), b);
    }

    // The fifth advance fails and the cursor stays dead.
    assert!(!rows.next().unwrap());
    assert!(rows.end());
    assert!(!rows.next().unwrap());
    assert!(!rows.prior().unwrap());
    assert!(!rows.move_to(1).unwrap());
}

#[test]
fn test_column_metadata() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE m (a INT, b VARCHAR(40))").unwrap();
    let rows = execute(&conn, "SELECT a, b FROM m").unwrap().unwrap();
    assert_eq!(rows.column_name(0).unwrap(), "a");
    assert_eq!(rows.column_name(1).unwrap(), "b");
    assert_eq!(rows.column_index("a").unwrap(), 0);
    assert_eq!(rows.column_index("b").unwrap(), 1);
    assert!(matches!(
        rows.column_index("missing"),
        Err(OdbcError::Programming(_))
    ));
    assert!(rows.column_size(1).unwrap() > 0);
    // Raw SQL type codes pass through unmapped (SQL_INTEGER is 4).
    assert_eq!(rows.column_datatype(0).unwrap(), 4);
    assert!(matches!(
        rows.column_name(2),
        Err(OdbcError::IndexRange { index: 2, count: 2 })
    ));
}

#[test]
fn test_integral_round_trips() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE ints (v BIGINT)").unwrap();

    fn round_trip<T>(conn: &Connection, value: T) -> T
    where
        T: tether_odbc::ParamElement + tether_odbc::FromColumn + PartialEq + std::fmt::Debug,
    {
        just_execute(conn, "DELETE FROM ints").unwrap();
        let stmt = Statement::new();
        stmt.prepare_on(conn, "INSERT INTO ints (v) VALUES (?)").unwrap();
        let values = [value];
        // SAFETY: `values` outlives the execute call below.
        unsafe {
            stmt.bind_parameter(0, &values, None, ParamDirection::In)
                .unwrap();
        }
        assert!(stmt.execute(1).unwrap().is_none());
        assert_eq!(stmt.affected_rows().unwrap(), 1);
        let rows = execute(conn, "SELECT v FROM ints").unwrap().unwrap();
        assert!(rows.next().unwrap());
        rows.get::<T>(0).unwrap()
    }

    assert_eq!(round_trip(&conn, -17i16), -17i16);
    assert_eq!(round_trip(&conn, 40_000u16), 40_000u16);
    assert_eq!(round_trip(&conn, -70_000i32), -70_000i32);
    assert_eq!(round_trip(&conn, 3_000_000_000u32), 3_000_000_000u32);
    assert_eq!(round_trip(&conn, -5_000_000_000i64), -5_000_000_000i64);
    assert_eq!(round_trip(&conn, 9_000_000_000u64), 9_000_000_000u64);
}

#[test]
fn test_float_round_trip() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE floats (v DOUBLE)").unwrap();

    let stmt = Statement::new();
    stmt.prepare_on(&conn, "INSERT INTO floats (v) VALUES (?)").unwrap();
    let values = [2.5f64];
    // SAFETY: `values` outlives the execute call below.
    unsafe {
        stmt.bind_parameter(0, &values, None, ParamDirection::In)
            .unwrap();
    }
    assert!(stmt.execute(1).unwrap().is_none());

    let rows = execute(&conn, "SELECT v FROM floats").unwrap().unwrap();
    assert!(rows.next().unwrap());
    assert!((rows.get::<f64>(0).unwrap() - 2.5).abs() < f64::EPSILON);
}

#[test]
fn test_batch_bound_insert() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE batch (v INT)").unwrap();

    let values = [10i32, 20, 30, 40];
    let stmt = Statement::new();
    stmt.prepare_on(&conn, "INSERT INTO batch (v) VALUES (?)").unwrap();
    // SAFETY: `values` outlives the execute call below.
    unsafe {
        stmt.bind_parameter(0, &values, None, ParamDirection::In)
            .unwrap();
    }
    assert!(stmt.execute(values.len()).unwrap().is_none());

    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM batch"), 4);
    let rows = execute(&conn, "SELECT v FROM batch ORDER BY v").unwrap().unwrap();
    for expected in values {
        assert!(rows.next().unwrap());
        assert_eq!(rows.get::<i32>(0).unwrap(), expected);
    }
    assert!(!rows.next().unwrap());
}

#[test]
fn test_batch_bind_with_null_indicators() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE sparse (v INT)").unwrap();

    let values = [1i32, 0, 3];
    let nulls = [false, true, false];
    let stmt = Statement::new();
    stmt.prepare_on(&conn, "INSERT INTO sparse (v) VALUES (?)").unwrap();
    // SAFETY: `values` outlives the execute call below.
    unsafe {
        stmt.bind_parameter(0, &values, Some(&nulls), ParamDirection::In)
            .unwrap();
    }
    assert!(stmt.execute(values.len()).unwrap().is_none());

    // Indicators survive the execute: null rows read back as None.
    assert!(stmt.parameter_indicator(0, 0).unwrap().is_some());
    assert!(stmt.parameter_indicator(0, 1).unwrap().is_none());
    assert!(stmt.parameter_indicator(0, 2).unwrap().is_some());

    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM sparse"), 3);
    assert_eq!(
        count_rows(&conn, "SELECT COUNT(*) FROM sparse WHERE v IS NULL"),
        1
    );
}

#[test]
fn test_committed_transaction_persists() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE tx (v INT)").unwrap();

    let mut tx = Transaction::new(&conn).unwrap();
    assert_eq!(conn.transactions(), 1);
    just_execute(&conn, "INSERT INTO tx VALUES (1)").unwrap();
    tx.commit().unwrap();
    assert_eq!(conn.transactions(), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM tx"), 1);

    // A resolved guard refuses a second resolution.
    assert!(matches!(tx.rollback(), Err(OdbcError::Programming(_))));
}

#[test]
fn test_rolled_back_transaction_is_absent() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE txr (v INT)").unwrap();

    let mut tx = Transaction::new(&conn).unwrap();
    just_execute(&conn, "INSERT INTO txr VALUES (1)").unwrap();
    tx.rollback().unwrap();
    assert_eq!(conn.transactions(), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM txr"), 0);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE txd (v INT)").unwrap();

    {
        let _tx = Transaction::new(&conn).unwrap();
        just_execute(&conn, "INSERT INTO txd VALUES (1)").unwrap();
        assert_eq!(conn.transactions(), 1);
    }
    assert_eq!(conn.transactions(), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM txd"), 0);
}

#[test]
fn test_nested_scopes_share_one_depth_counter() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE txn (v INT)").unwrap();

    let outer = Transaction::new(&conn).unwrap();
    {
        let mut inner = Transaction::new(&conn).unwrap();
        assert_eq!(conn.transactions(), 2);
        just_execute(&conn, "INSERT INTO txn VALUES (1)").unwrap();
        // Flat semantics: the inner commit takes effect immediately.
        inner.commit().unwrap();
        assert_eq!(conn.transactions(), 1);
    }
    drop(outer);
    assert_eq!(conn.transactions(), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM txn"), 1);
}

#[test]
fn test_prepared_statement_reexecution() {
    let Some(conn) = connect() else { return };
    just_execute(&conn, "CREATE TABLE re (v INT)").unwrap();
    just_execute(&conn, "INSERT INTO re VALUES (7)").unwrap();

    let stmt = Statement::new();
    stmt.prepare_on(&conn, "SELECT v FROM re").unwrap();
    for _ in 0..2 {
        let rows = stmt.execute(1).unwrap().unwrap();
        assert!(rows.next().unwrap());
        assert_eq!(rows.get::<i32>(0).unwrap(), 7);
        assert!(!rows.next().unwrap());
    }
}

#[test]
fn test_get_out_of_range_column() {
    let Some(conn) = connect() else { return };
    let rows = execute(&conn, "SELECT 1").unwrap().unwrap();
    assert!(rows.next().unwrap());
    assert!(matches!(
        rows.get::<i32>(5),
        Err(OdbcError::IndexRange { index: 5, count: 1 })
    ));
}

#[test]
fn test_get_before_first_fetch_is_a_misuse() {
    let Some(conn) = connect() else { return };
    let rows = execute(&conn, "SELECT 1").unwrap().unwrap();
    assert!(matches!(rows.get::<i32>(0), Err(OdbcError::Programming(_))));
}

#[test]
fn test_text_decode_of_numeric_column() {
    let Some(conn) = connect() else { return };
    let rows = execute(&conn, "SELECT 42").unwrap().unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get::<String>(0).unwrap(), "42");
}
