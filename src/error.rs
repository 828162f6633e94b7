//! Crate error type.
//!
//! Configuration errors are fail-fast and user-visible; numerical and
//! compression-failure conditions are local/recoverable and are logged
//! rather than returned as `Err` wherever the algorithm defines a fallback;
//! I/O/allocation failures are fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("numerical warning: {0}")]
    Numerical(String),

    #[error("file {path}: expected {expected} bytes, found {found}")]
    FileSizeMismatch {
        path: String,
        expected: u64,
        found: u64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
