//! Error taxonomy for the ODBC safety layer.
//!
//! Every native call failure is detected immediately and translated into an
//! [`OdbcError::Database`] carrying the driver's full diagnostic chain. The
//! remaining variants cover contract misuse that can be detected without
//! consulting the driver at all.

use thiserror::Error;

/// Errors produced by connections, statements, result sets, and transactions.
#[derive(Debug, Clone, Error)]
pub enum OdbcError {
    /// A native ODBC call failed. The message holds every diagnostic record
    /// the driver reported for the failing handle.
    #[error("{function} failed: {message}")]
    Database {
        /// Name of the ODBC function that failed.
        function: &'static str,
        /// Concatenated diagnostic records ({state, native code, message}).
        message: String,
    },

    /// API misuse detectable without consulting the driver, such as preparing
    /// a statement that was never opened.
    #[error("programming error: {0}")]
    Programming(String),

    /// The column's native type cannot represent the requested decode type.
    #[error("column {column} (C type {ctype}) cannot be decoded as the requested type")]
    TypeIncompatible {
        /// 0-indexed column position.
        column: u16,
        /// The C buffer type the column is bound with.
        ctype: i16,
    },

    /// A null value was read without supplying a fallback.
    #[error("column {column} is null")]
    NullAccess {
        /// 0-indexed column position.
        column: u16,
    },

    /// A column or parameter index was outside the valid range.
    #[error("index {index} out of range ({count} available)")]
    IndexRange {
        /// The requested 0-indexed position.
        index: u16,
        /// Number of columns or parameters actually available.
        count: u16,
    },
}

impl OdbcError {
    /// Create a programming error from any printable cause.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::Programming(message.into())
    }

    /// True if this error originated in the driver rather than in API misuse.
    #[must_use]
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_display_carries_function_and_message() {
        let err = OdbcError::Database {
            function: "SQLConnectW",
            message: "[08001] unable to connect (native 1)".into(),
        };
        let text = err.to_string();
        assert!(text.contains("SQLConnectW"));
        assert!(text.contains("08001"));
        assert!(err.is_database());
    }

    #[test]
    fn test_index_range_display() {
        let err = OdbcError::IndexRange { index: 7, count: 2 };
        assert_eq!(err.to_string(), "index 7 out of range (2 available)");
        assert!(!err.is_database());
    }

    #[test]
    fn test_programming_helper() {
        let err = OdbcError::programming("statement has no associated open connection");
        assert!(err
            .to_string()
            .contains("statement has no associated open connection"));
    }
}
