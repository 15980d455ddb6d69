// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Errors

use thiserror::Error;

use crate::event::tag;

/// Database backend error
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An error happened in the underlying database backend.
    #[error("backend: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    /// Not supported
    #[error("method not supported by current backend")]
    NotSupported,
    /// Not found
    #[error("not found")]
    NotFound,
}

impl DatabaseError {
    /// Create a new [`Backend`][Self::Backend] error.
    ///
    /// Shorthand for `DatabaseError::Backend(Box::new(error))`.
    #[inline]
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }
}

/// Event store error
///
/// Only invalid input and backend failures surface here; rejected or
/// superseded ingest is reported through the save outcome, not as an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed tag (e.g. a non-integer expiration value)
    #[error(transparent)]
    Tag(#[from] tag::Error),
    /// Backing database error
    #[error(transparent)]
    Database(#[from] DatabaseError),
}
