//! Diagnostic retrieval and formatting.
//!
//! After any native call returns an error or `SUCCESS_WITH_INFO`, the full
//! diagnostic chain is drained from the failing handle with `SQLGetDiagRecW`.
//! Error paths fold the chain into an [`OdbcError::Database`]; informational
//! paths log it and continue.

use odbc_sys::{Handle, HandleType, SqlReturn};

use crate::error::OdbcError;
use crate::wide::from_wide_len;

/// One record from a handle's diagnostic chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    /// Five character SQLSTATE, such as `08001`.
    pub state: String,
    /// Driver specific native error code.
    pub native: i32,
    /// Human readable diagnostic text.
    pub message: String,
}

impl DiagRecord {
    fn format(&self) -> String {
        format!("[{}] {} (native {})", self.state, self.message, self.native)
    }
}

const STATE_LEN: usize = 6;
const MESSAGE_LEN: usize = 1024;

/// Drain every diagnostic record currently attached to `handle`.
///
/// Returns an empty vector when the handle carries no diagnostics, which
/// happens for failures reported before the driver was ever reached.
///
/// # Safety
///
/// `handle` must be a live handle of kind `kind`.
pub(crate) unsafe fn diagnostics(handle: Handle, kind: HandleType) -> Vec<DiagRecord> {
    let mut records = Vec::new();
    let mut state = [0u16; STATE_LEN];
    let mut message = [0u16; MESSAGE_LEN];
    let mut record = 1i16;
    loop {
        let mut native = 0i32;
        let mut text_len = 0i16;
        let rc = odbc_sys::SQLGetDiagRecW(
            kind,
            handle,
            record,
            state.as_mut_ptr(),
            &mut native,
            message.as_mut_ptr(),
            MESSAGE_LEN as i16,
            &mut text_len,
        );
        if rc != SqlReturn::SUCCESS && rc != SqlReturn::SUCCESS_WITH_INFO {
            break;
        }
        let reported = if text_len < 0 { 0 } else { text_len as usize };
        records.push(DiagRecord {
            state: from_wide_len(&state, 5),
            native,
            message: from_wide_len(&message, reported),
        });
        record += 1;
    }
    records
}

/// Join a diagnostic chain into a single message line.
pub(crate) fn join_records(records: &[DiagRecord]) -> String {
    if records.is_empty() {
        return "no diagnostic records available".into();
    }
    records
        .iter()
        .map(DiagRecord::format)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Build the `Database` error for a failed call on `handle`.
///
/// # Safety
///
/// `handle` must be a live handle of kind `kind`.
pub(crate) unsafe fn database_error(
    function: &'static str,
    handle: Handle,
    kind: HandleType,
) -> OdbcError {
    let records = diagnostics(handle, kind);
    OdbcError::Database {
        function,
        message: join_records(&records),
    }
}

/// Log the diagnostic chain after a `SUCCESS_WITH_INFO` return.
///
/// # Safety
///
/// `handle` must be a live handle of kind `kind`.
pub(crate) unsafe fn log_info(function: &'static str, handle: Handle, kind: HandleType) {
    for record in diagnostics(handle, kind) {
        tracing::warn!(
            function,
            state = %record.state,
            native = record.native,
            message = %record.message,
            "driver reported success with info"
        );
    }
}
