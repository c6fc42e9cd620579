//! Safety and ergonomics layer over the ODBC C API.
//!
//! Manages the lifecycle of environment/connection/statement/result-set
//! handles, binds typed parameters (including bulk batches), buffers rowsets
//! for bulk fetch, and translates native failure codes into structured
//! errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_odbc::{ConnectTarget, Connection, Statement};
//!
//! let conn = Connection::open(ConnectTarget::ConnectionString(
//!     "Driver=SQLite3;Database=example.db;",
//! ))?;
//!
//! let stmt = Statement::new();
//! stmt.prepare_on(&conn, "SELECT a, b FROM t ORDER BY a")?;
//! if let Some(rows) = stmt.execute(1)? {
//!     while rows.next()? {
//!         let a: i32 = rows.get(0)?;
//!         let b: String = rows.get(1)?;
//!         println!("{a} {b}");
//!     }
//! }
//! ```
//!
//! Wrapper copies are aliases of one shared native resource, never deep
//! clones, and none of the types are `Send`: the native API performs no
//! internal locking, so cross-thread use requires external synchronization.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss, clippy::cast_ptr_alignment)]

mod connection;
mod ctype;
mod diag;
mod error;
mod handle;
mod result;
mod statement;
mod transaction;
mod wide;

pub use connection::{ConnectTarget, Connection, DEFAULT_LOGIN_TIMEOUT};
pub use ctype::{Date, ParamDirection, ParamElement, Time, Timestamp};
pub use diag::DiagRecord;
pub use error::OdbcError;
pub use result::{FromColumn, ResultSet};
pub use statement::{Async, Statement};
pub use transaction::Transaction;

/// Convenience: open a statement on `conn`, run `query` once, and return
/// its result set if it produced one.
///
/// # Errors
///
/// See [`Statement::execute_direct`].
pub fn execute(conn: &Connection, query: &str) -> Result<Option<ResultSet>, OdbcError> {
    let stmt = Statement::new();
    stmt.execute_direct(conn, query, 1)
}

/// Convenience: run `query` once and discard any result set.
///
/// # Errors
///
/// See [`Statement::execute_direct`].
pub fn just_execute(conn: &Connection, query: &str) -> Result<(), OdbcError> {
    let stmt = Statement::new();
    stmt.execute_direct(conn, query, 1)?;
    Ok(())
}
