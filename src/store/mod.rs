// Document store adapter: the storage boundary the mediator talks to.

pub mod memory;
pub mod postgres;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::filter::DocumentQuery;
use crate::schema::{Fields, ValidatedPayload};

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use retry::StoragePolicy;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document {id} not found in {resource}")]
    NotFound { resource: String, id: Uuid },

    #[error("Revision conflict: expected {expected}, stored {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Storage timeout: {0}")]
    Timeout(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(resource: &str, id: Uuid) -> Self {
        StoreError::NotFound {
            resource: resource.to_string(),
            id,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool timed out".to_string()),
            sqlx::Error::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => {
                StoreError::Timeout(io.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// One stored document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub revision: u64,
    pub fields: Fields,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Insertion sequence within the store, used for ordering and cursors
    #[serde(skip)]
    pub seq: i64,
}

impl Document {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Acknowledgement of a delete: the tombstone's id and final revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub id: Uuid,
    pub revision: u64,
}

/// Lazy, finite sequence of query results. Each `query` call starts afresh.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

/// Uniform CRUD interface over a schema-less document collection.
///
/// Writes are durable when the returned future resolves. `update` and
/// `delete` apply only when the stored revision equals `expected_revision`;
/// otherwise they return `Conflict` and change nothing. Tombstoned documents
/// read as `NotFound`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    async fn insert(
        &self,
        resource: &str,
        owner: Option<&str>,
        payload: ValidatedPayload,
    ) -> Result<Document, StoreError>;

    async fn get(&self, resource: &str, id: Uuid) -> Result<Document, StoreError>;

    /// Merge `patch` into the stored fields and bump the revision
    async fn update(
        &self,
        resource: &str,
        id: Uuid,
        expected_revision: u64,
        patch: ValidatedPayload,
    ) -> Result<Document, StoreError>;

    /// Tombstone the document and bump the revision
    async fn delete(&self, resource: &str, id: Uuid, expected_revision: u64) -> Result<Ack, StoreError>;

    fn query(&self, resource: &str, query: &DocumentQuery) -> DocumentStream;

    async fn health_check(&self) -> Result<(), StoreError>;
}
