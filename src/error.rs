use thiserror::Error;

use crate::models::ItemKind;

/// Errors raised by the local store, the status engine and the key resolver.
///
/// Every variant aborts only the operation that produced it. Remote tracker
/// failures are reported separately through [`crate::remote::ClientError`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid item key: {0:?}")]
    InvalidKey(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("parent not found for {key}: {parent}")]
    ParentNotFound { key: String, parent: String },

    #[error("item already exists: {0}")]
    DuplicateKey(String),

    #[error("{key} has {count} dependent item(s); delete with cascade to remove them")]
    HasDependents { key: String, count: usize },

    #[error("invalid {field} value: {value:?}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("{kind} items do not carry a {field}")]
    FieldNotSupported { kind: ItemKind, field: &'static str },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
