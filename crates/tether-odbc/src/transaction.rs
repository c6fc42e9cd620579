//! Transaction scope guard.
//!
//! Nested scopes on one connection are flat: a single depth counter and a
//! single autocommit toggle. Only the outermost scope touches autocommit;
//! every commit/rollback is issued against the driver immediately.

use odbc_sys::{CompletionType, Handle, HandleType, SQLEndTran};

use crate::connection::Connection;
use crate::error::OdbcError;
use crate::handle::{self, ensure};

/// A scope guard over a [`Connection`].
///
/// Construction disables autocommit (outermost scope only) and increments
/// the connection's depth counter. Dropping an unresolved guard rolls back
/// implicitly with all errors swallowed; call [`Transaction::commit`] or
/// [`Transaction::rollback`] explicitly to observe the outcome.
pub struct Transaction {
    conn: Connection,
    resolved: bool,
}

impl Transaction {
    /// Open a transaction scope on `conn`.
    ///
    /// # Errors
    ///
    /// `Programming` when `conn` is not connected; `Database` when the
    /// driver refuses to disable autocommit.
    pub fn new(conn: &Connection) -> Result<Self, OdbcError> {
        conn.ensure_connected()?;
        if conn.transactions() == 0 {
            conn.set_autocommit(false)?;
        }
        conn.push_transaction();
        tracing::debug!(depth = conn.transactions(), "transaction scope opened");
        Ok(Self {
            conn: conn.clone(),
            resolved: false,
        })
    }

    /// Commit immediately against the shared connection.
    ///
    /// # Errors
    ///
    /// `Programming` when this guard is already resolved; `Database` on
    /// driver failure (the guard stays unresolved so a rollback can still
    /// be attempted).
    pub fn commit(&mut self) -> Result<(), OdbcError> {
        self.end(CompletionType::Commit)
    }

    /// Roll back immediately against the shared connection.
    ///
    /// # Errors
    ///
    /// `Programming` when this guard is already resolved; `Database` on
    /// driver failure.
    pub fn rollback(&mut self) -> Result<(), OdbcError> {
        self.end(CompletionType::Rollback)
    }

    /// The connection this scope guards.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn end(&mut self, completion: CompletionType) -> Result<(), OdbcError> {
        if self.resolved {
            return Err(OdbcError::programming(
                "transaction scope is already resolved",
            ));
        }
        let dbc = self.conn.dbc_handle();
        // SAFETY: the connection handle is live while `conn` exists.
        unsafe {
            let rc = SQLEndTran(HandleType::Dbc, dbc, completion);
            ensure("SQLEndTran", rc, dbc, HandleType::Dbc)?;
        }
        self.resolved = true;
        self.conn.pop_transaction();
        if self.conn.transactions() == 0 {
            self.conn.set_autocommit(true)?;
        }
        tracing::debug!(
            depth = self.conn.transactions(),
            committed = matches!(completion, CompletionType::Commit),
            "transaction scope resolved"
        );
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if self.conn.connected() {
            let dbc: Handle = self.conn.dbc_handle();
            // SAFETY: the connection handle is live. Failures have nowhere
            // to go from a destructor and are logged instead.
            unsafe {
                let rc = SQLEndTran(HandleType::Dbc, dbc, CompletionType::Rollback);
                if !handle::succeeded(rc) {
                    tracing::warn!("implicit rollback failed during drop");
                }
            }
        }
        self.conn.pop_transaction();
        if self.conn.transactions() == 0 && self.conn.connected() {
            if let Err(err) = self.conn.set_autocommit(true) {
                tracing::warn!(%err, "restoring autocommit failed during drop");
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("resolved", &self.resolved)
            .field("depth", &self.conn.transactions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_requires_connected_connection() {
        let conn = Connection::new().unwrap();
        assert_eq!(conn.transactions(), 0);
        let err = Transaction::new(&conn).unwrap_err();
        assert!(matches!(err, OdbcError::Programming(_)));
        assert_eq!(conn.transactions(), 0);
    }
}
