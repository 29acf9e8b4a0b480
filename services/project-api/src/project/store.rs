//! Document store seam.
//!
//! One JSON document per project, partitioned by `id`. Implementations add
//! their own metadata fields (`_rid`, `_etag`, ...) which the repository
//! strips on the way out.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::project::query::{FilterSpec, SqlQuery};

/// A stored JSON document
pub type Document = Map<String, Value>;

/// Characters the store does not accept in ids
const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', '?', '#'];

/// Longest id the store accepts
const MAX_ID_LEN: usize = 255;

/// Document store failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No document with this id
    #[error("document {id} not found")]
    NotFound {
        /// Requested id
        id: String,
    },

    /// A document with this id already exists
    #[error("document {id} already exists")]
    Conflict {
        /// Colliding id
        id: String,
    },

    /// The id cannot address a document
    #[error("invalid document id {id:?}")]
    InvalidId {
        /// Offending id
        id: String,
    },

    /// Request rate exceeded
    #[error("throttled, retry after {retry_after:?}")]
    Throttled {
        /// Store-suggested wait
        retry_after: Duration,
    },

    /// The call did not finish in time
    #[error("timed out after {duration:?}")]
    Timeout {
        /// Bound that was exceeded
        duration: Duration,
    },

    /// Connectivity or service failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored document does not decode as a project
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Metric label for this failure
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidId { .. } => "invalid_id",
            Self::Throttled { .. } => "throttled",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Corrupt(_) => "corrupt",
        }
    }
}

/// Checks that `id` can address a document
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty()
        || id.len() > MAX_ID_LEN
        || id.contains(FORBIDDEN_ID_CHARS)
        || id.chars().any(char::is_control)
    {
        return Err(StoreError::InvalidId { id: id.to_string() });
    }
    Ok(())
}

/// Persistence operations the repository needs.
///
/// Each call is atomic for the single document it touches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document; `Conflict` if its id exists
    async fn create(&self, document: Document) -> Result<Document, StoreError>;

    /// Reads one document by id
    async fn read(&self, id: &str) -> Result<Document, StoreError>;

    /// Replaces an existing document
    async fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError>;

    /// Deletes one document by id
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Returns every document matching the filter, in no particular order.
    ///
    /// `sql` is `filter` rendered for stores that evaluate queries server
    /// side; both describe the same predicates.
    async fn query(&self, filter: &FilterSpec, sql: &SqlQuery) -> Result<Vec<Document>, StoreError>;

    /// Cheap reachability probe
    async fn health_check(&self) -> Result<(), StoreError>;
}
