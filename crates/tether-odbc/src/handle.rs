//! Return-code checking and handle lifecycle helpers.
//!
//! Every native call goes through [`check`], so a failure can never be
//! silently ignored and diagnostics are always read from the handle that
//! produced them.

use odbc_sys::{Handle, HandleType, SqlReturn};

use crate::diag;
use crate::error::OdbcError;

/// True for the two success codes of the ODBC return convention.
#[must_use]
pub(crate) fn succeeded(rc: SqlReturn) -> bool {
    rc == SqlReturn::SUCCESS || rc == SqlReturn::SUCCESS_WITH_INFO
}

/// Translate a native return code into a `Result`.
///
/// `SUCCESS_WITH_INFO` logs the diagnostic chain and passes through.
/// `NO_DATA`, `STILL_EXECUTING`, and `NEED_DATA` are in-band states the
/// caller must interpret, so they pass through unchanged. Everything else
/// becomes an [`OdbcError::Database`] built from the handle's diagnostics.
///
/// # Safety
///
/// `handle` must be a live handle of kind `kind`.
pub(crate) unsafe fn check(
    function: &'static str,
    rc: SqlReturn,
    handle: Handle,
    kind: HandleType,
) -> Result<SqlReturn, OdbcError> {
    match rc {
        SqlReturn::SUCCESS => Ok(rc),
        SqlReturn::SUCCESS_WITH_INFO => {
            diag::log_info(function, handle, kind);
            Ok(rc)
        }
        SqlReturn::NO_DATA | SqlReturn::STILL_EXECUTING | SqlReturn::NEED_DATA => Ok(rc),
        _ => Err(diag::database_error(function, handle, kind)),
    }
}

/// [`check`] for call sites with no use for the in-band code.
///
/// # Safety
///
/// Same contract as [`check`].
pub(crate) unsafe fn ensure(
    function: &'static str,
    rc: SqlReturn,
    handle: Handle,
    kind: HandleType,
) -> Result<(), OdbcError> {
    check(function, rc, handle, kind).map(|_| ())
}

/// Allocate a new handle of `kind` under `parent`.
///
/// # Safety
///
/// `parent` must be a live handle of the kind ODBC requires as the parent
/// of `kind` (null for environments).
pub(crate) unsafe fn alloc(kind: HandleType, parent: Handle) -> Result<Handle, OdbcError> {
    let mut handle: Handle = std::ptr::null_mut();
    let rc = odbc_sys::SQLAllocHandle(kind, parent, &mut handle);
    // Diagnostics for a failed child allocation live on the parent.
    ensure("SQLAllocHandle", rc, parent, parent_kind(kind))?;
    Ok(handle)
}

fn parent_kind(kind: HandleType) -> HandleType {
    match kind {
        HandleType::Dbc => HandleType::Env,
        HandleType::Stmt | HandleType::Desc => HandleType::Dbc,
        HandleType::Env => HandleType::Env,
    }
}

/// Free a handle, logging failures instead of returning them.
///
/// Used on drop paths where an error has nowhere to go.
///
/// # Safety
///
/// `handle` must be a live handle of kind `kind` with no live children.
pub(crate) unsafe fn release(handle: Handle, kind: HandleType) {
    if handle.is_null() {
        return;
    }
    let rc = odbc_sys::SQLFreeHandle(kind, handle);
    if !succeeded(rc) {
        tracing::error!(?kind, "SQLFreeHandle failed, handle leaked");
    }
}
