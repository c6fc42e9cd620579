//! Connection lifecycle: environment and connection handle ownership,
//! connect/disconnect, and the transaction-depth bookkeeping shared with
//! [`crate::transaction::Transaction`].

use std::cell::Cell;
use std::ptr::null_mut;
use std::rc::Rc;

use odbc_sys::{
    AttrOdbcVersion, ConnectionAttribute, DriverConnectOption, EnvironmentAttribute, HDbc, HEnv,
    Handle, HandleType, InfoType, Pointer, SQLConnectW, SQLDisconnect, SQLDriverConnectW,
    SQLGetInfoW, SQLSetConnectAttrW, SQLSetEnvAttr,
};

use crate::error::OdbcError;
use crate::handle::{self, ensure};
use crate::wide::{from_wide_len, to_wide};

/// Login timeout in seconds applied when the caller does not choose one.
pub const DEFAULT_LOGIN_TIMEOUT: u32 = 5;

/// Where and how to connect.
#[derive(Debug, Clone, Copy)]
pub enum ConnectTarget<'a> {
    /// A configured data source name plus credentials.
    DataSource {
        /// Data source name as registered with the driver manager.
        dsn: &'a str,
        /// User name, may be empty.
        user: &'a str,
        /// Password, may be empty.
        password: &'a str,
    },
    /// A pre-formatted connection string, passed to the driver verbatim.
    ConnectionString(&'a str),
}

struct ConnectionInner {
    env: HEnv,
    dbc: Cell<HDbc>,
    connected: Cell<bool>,
    transactions: Cell<usize>,
}

/// A database connection.
///
/// Owns the ODBC environment and connection handles. Cloning yields an alias
/// of the same underlying connection, not an independent one: disconnecting
/// through any alias is observed by all of them. The native API is not safe
/// for unsynchronized cross-thread use, so `Connection` is `!Send`.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl Connection {
    /// Allocate the environment and connection handles without connecting.
    ///
    /// # Errors
    ///
    /// `Database` if the driver manager refuses either allocation or the
    /// ODBC 3.x version attribute.
    pub fn new() -> Result<Self, OdbcError> {
        // SAFETY: a null parent is the documented way to allocate an
        // environment; the env handle is live for the attribute call.
        let env = unsafe {
            let env = handle::alloc(HandleType::Env, null_mut())? as HEnv;
            let rc = SQLSetEnvAttr(
                env,
                EnvironmentAttribute::OdbcVersion,
                AttrOdbcVersion::Odbc3 as i32 as usize as Pointer,
                0,
            );
            if let Err(e) = ensure("SQLSetEnvAttr", rc, env as Handle, HandleType::Env) {
                handle::release(env as Handle, HandleType::Env);
                return Err(e);
            }
            env
        };
        // SAFETY: env is live; on failure it is released before returning.
        let dbc = unsafe {
            match handle::alloc(HandleType::Dbc, env as Handle) {
                Ok(h) => h as HDbc,
                Err(e) => {
                    handle::release(env as Handle, HandleType::Env);
                    return Err(e);
                }
            }
        };
        tracing::debug!("allocated environment and connection handles");
        Ok(Self {
            inner: Rc::new(ConnectionInner {
                env,
                dbc: Cell::new(dbc),
                connected: Cell::new(false),
                transactions: Cell::new(0),
            }),
        })
    }

    /// Allocate and connect in one call with the default login timeout.
    ///
    /// # Errors
    ///
    /// See [`Connection::new`] and [`Connection::connect`].
    pub fn open(target: ConnectTarget<'_>) -> Result<Self, OdbcError> {
        let conn = Self::new()?;
        conn.connect(target)?;
        Ok(conn)
    }

    /// Connect with the default login timeout of
    /// [`DEFAULT_LOGIN_TIMEOUT`] seconds.
    ///
    /// # Errors
    ///
    /// See [`Connection::connect_with_timeout`].
    pub fn connect(&self, target: ConnectTarget<'_>) -> Result<(), OdbcError> {
        self.connect_with_timeout(target, DEFAULT_LOGIN_TIMEOUT)
    }

    /// Establish the native connection.
    ///
    /// Calling this while already connected never reconnects silently: it is
    /// a `Programming` error, and the caller must [`Connection::disconnect`]
    /// first.
    ///
    /// # Errors
    ///
    /// `Programming` when already connected; `Database` with the driver's
    /// full diagnostic text when the native connect fails.
    pub fn connect_with_timeout(
        &self,
        target: ConnectTarget<'_>,
        timeout_secs: u32,
    ) -> Result<(), OdbcError> {
        if self.inner.connected.get() {
            return Err(OdbcError::programming(
                "connection is already established; call disconnect() before reconnecting",
            ));
        }
        // A fresh dbc per connect attempt keeps stale connection attributes
        // from a previous session out of this one.
        // SAFETY: the old dbc has no live children (nothing is connected),
        // env outlives it, and the new dbc is installed before use.
        unsafe {
            handle::release(self.inner.dbc.get() as Handle, HandleType::Dbc);
            self.inner.dbc.set(null_mut());
            let dbc = handle::alloc(HandleType::Dbc, self.inner.env as Handle)? as HDbc;
            self.inner.dbc.set(dbc);

            let rc = SQLSetConnectAttrW(
                dbc,
                ConnectionAttribute::LoginTimeout,
                timeout_secs as usize as Pointer,
                0,
            );
            ensure("SQLSetConnectAttrW", rc, dbc as Handle, HandleType::Dbc)?;

            let rc = match target {
                ConnectTarget::DataSource {
                    dsn,
                    user,
                    password,
                } => {
                    let dsn = to_wide(dsn);
                    let user = to_wide(user);
                    let password = to_wide(password);
                    SQLConnectW(
                        dbc,
                        dsn.as_ptr(),
                        dsn.len() as i16,
                        user.as_ptr(),
                        user.len() as i16,
                        password.as_ptr(),
                        password.len() as i16,
                    )
                }
                ConnectTarget::ConnectionString(s) => {
                    let s = to_wide(s);
                    SQLDriverConnectW(
                        dbc,
                        null_mut(),
                        s.as_ptr(),
                        s.len() as i16,
                        null_mut(),
                        0,
                        null_mut(),
                        DriverConnectOption::NoPrompt,
                    )
                }
            };
            let function = match target {
                ConnectTarget::DataSource { .. } => "SQLConnectW",
                ConnectTarget::ConnectionString(_) => "SQLDriverConnectW",
            };
            ensure(function, rc, dbc as Handle, HandleType::Dbc)?;
        }
        self.inner.connected.set(true);
        tracing::info!("connection established");
        Ok(())
    }

    /// Release the native connection while keeping the environment handle
    /// usable for a later [`Connection::connect`].
    ///
    /// A no-op on an unconnected connection.
    ///
    /// # Errors
    ///
    /// `Database` when the driver refuses the disconnect, for example with a
    /// transaction still open on some backends.
    pub fn disconnect(&self) -> Result<(), OdbcError> {
        if !self.inner.connected.get() {
            return Ok(());
        }
        let dbc = self.inner.dbc.get();
        // SAFETY: dbc is live and connected.
        unsafe {
            let rc = SQLDisconnect(dbc);
            ensure("SQLDisconnect", rc, dbc as Handle, HandleType::Dbc)?;
        }
        self.inner.connected.set(false);
        tracing::info!("connection closed");
        Ok(())
    }

    /// True while the native connection is established.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Number of live transaction scopes on this connection.
    #[must_use]
    pub fn transactions(&self) -> usize {
        self.inner.transactions.get()
    }

    /// Name of the backend DBMS.
    ///
    /// # Errors
    ///
    /// `Programming` when not connected; `Database` on driver failure.
    pub fn dbms_name(&self) -> Result<String, OdbcError> {
        self.info_string(InfoType::DbmsName, "SQLGetInfoW")
    }

    /// Version string of the backend DBMS.
    ///
    /// # Errors
    ///
    /// `Programming` when not connected; `Database` on driver failure.
    pub fn dbms_version(&self) -> Result<String, OdbcError> {
        self.info_string(InfoType::DbmsVer, "SQLGetInfoW")
    }

    fn info_string(&self, info: InfoType, function: &'static str) -> Result<String, OdbcError> {
        self.ensure_connected()?;
        let dbc = self.inner.dbc.get();
        let mut buffer = [0u16; 256];
        let mut byte_len = 0i16;
        // SAFETY: dbc is live; buffer length is passed in bytes as the wide
        // info call requires.
        unsafe {
            let rc = SQLGetInfoW(
                dbc,
                info,
                buffer.as_mut_ptr().cast(),
                (buffer.len() * 2) as i16,
                &mut byte_len,
            );
            ensure(function, rc, dbc as Handle, HandleType::Dbc)?;
        }
        let chars = if byte_len < 0 { 0 } else { byte_len as usize / 2 };
        Ok(from_wide_len(&buffer, chars))
    }

    /// Raw environment handle for native calls bypassing this wrapper.
    ///
    /// Must not be retained past this `Connection`'s lifetime.
    #[must_use]
    pub fn env_handle(&self) -> Handle {
        self.inner.env as Handle
    }

    /// Raw connection handle for native calls bypassing this wrapper.
    ///
    /// Must not be retained past this `Connection`'s lifetime.
    #[must_use]
    pub fn dbc_handle(&self) -> Handle {
        self.inner.dbc.get() as Handle
    }

    pub(crate) fn dbc(&self) -> HDbc {
        self.inner.dbc.get()
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), OdbcError> {
        if self.inner.connected.get() {
            Ok(())
        } else {
            Err(OdbcError::programming("connection is not established"))
        }
    }

    // Capability surface for Transaction. Depth bookkeeping stays here so
    // the autocommit invariant (off iff depth > 0) has a single owner.

    pub(crate) fn push_transaction(&self) {
        self.inner.transactions.set(self.inner.transactions.get() + 1);
    }

    pub(crate) fn pop_transaction(&self) {
        let depth = self.inner.transactions.get();
        debug_assert!(depth > 0, "transaction depth underflow");
        self.inner.transactions.set(depth.saturating_sub(1));
    }

    pub(crate) fn set_autocommit(&self, enabled: bool) -> Result<(), OdbcError> {
        let dbc = self.inner.dbc.get();
        let value = usize::from(enabled);
        // SAFETY: dbc is live; the autocommit value is passed by immediate
        // integer as the attribute call requires.
        unsafe {
            let rc = SQLSetConnectAttrW(
                dbc,
                ConnectionAttribute::AutoCommit,
                value as Pointer,
                0,
            );
            ensure("SQLSetConnectAttrW", rc, dbc as Handle, HandleType::Dbc)?;
        }
        tracing::debug!(enabled, "autocommit toggled");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.inner.connected.get())
            .field("transactions", &self.inner.transactions.get())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // SAFETY: handles are owned by this inner and no statement holds
        // them once the last alias drops; failures are logged, never raised.
        unsafe {
            if self.connected.get() {
                let rc = SQLDisconnect(self.dbc.get());
                if !handle::succeeded(rc) {
                    tracing::warn!("SQLDisconnect failed during drop");
                }
            }
            handle::release(self.dbc.get() as Handle, HandleType::Dbc);
            handle::release(self.env as Handle, HandleType::Env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_login_timeout() {
        assert_eq!(DEFAULT_LOGIN_TIMEOUT, 5);
    }

    #[test]
    fn test_connect_target_is_copy() {
        let target = ConnectTarget::ConnectionString("Driver=SQLite3;Database=:memory:;");
        let alias = target;
        match (target, alias) {
            (ConnectTarget::ConnectionString(a), ConnectTarget::ConnectionString(b)) => {
                assert_eq!(a, b);
            }
            _ => unreachable!(),
        }
    }
}
