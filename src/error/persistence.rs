//! This module contains errors arising while saving or loading the persisted
//! state of a replay context.

use std::sync::Arc;

use thiserror::Error;

/// Errors that occur while serializing a context to disk or reconstructing one
/// from its serialized form.
///
/// The non-cloneable payloads from `std` and `serde_json` are wrapped in
/// [`Arc`] so the error remains cloneable like the rest of the library's
/// error types.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Unknown hook type tag {tag:?}; was the hook registered?")]
    UnknownHookType { tag: String },

    #[error(transparent)]
    Json(#[from] Arc<serde_json::Error>),

    #[error(transparent)]
    Io(#[from] Arc<std::io::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// The result type for persistence operations.
pub type Result<T> = std::result::Result<T, Error>;
