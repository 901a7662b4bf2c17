// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions from SQLite errors into [`LuminaError`].

use lumina_core::LuminaError;

/// Wrap any driver error as [`LuminaError::Storage`].
pub fn storage_err(e: impl std::error::Error + Send + Sync + 'static) -> LuminaError {
    LuminaError::Storage {
        source: Box::new(e),
    }
}

/// Unwrap a tokio-rusqlite error whose closure already produced a [`LuminaError`].
pub fn map_tr_err(e: tokio_rusqlite::Error<LuminaError>) -> LuminaError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        tokio_rusqlite::Error::ConnectionClosed => LuminaError::Storage {
            source: "database connection is closed".into(),
        },
        other => LuminaError::Storage {
            source: other.to_string().into(),
        },
    }
}

/// Errors from opening or closing the connection itself.
pub fn tr_err(e: impl std::fmt::Display) -> LuminaError {
    LuminaError::Storage {
        source: e.to_string().into(),
    }
}

/// `.sql()?` on rusqlite results inside connection closures.
pub trait SqlResultExt<T> {
    fn sql(self) -> Result<T, LuminaError>;
}

impl<T> SqlResultExt<T> for Result<T, rusqlite::Error> {
    fn sql(self) -> Result<T, LuminaError> {
        self.map_err(storage_err)
    }
}

/// True when the error is a UNIQUE or PRIMARY KEY violation.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
