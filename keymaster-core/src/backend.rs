use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub mod memory;

/// JSON object exchanged with the backend at a path.
pub type Document = Map<String, Value>;

/// Failure reported by a backend. The core wraps these with operation
/// context; `Malformed` surfaces as a decode error, everything else as a
/// transport error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The backend answered but its response does not parse.
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn request<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Request(Box::new(err))
    }
}

/// Logical read/write/delete surface of the secret-management backend.
#[async_trait]
pub trait LogicalBackend: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Option<Document>, BackendError>;
    /// Idempotent upsert.
    async fn write(&self, path: &str, body: Document) -> Result<(), BackendError>;
    async fn delete(&self, path: &str) -> Result<(), BackendError>;
}

#[async_trait]
impl<T> LogicalBackend for Arc<T>
where
    T: LogicalBackend + ?Sized,
{
    async fn read(&self, path: &str) -> Result<Option<Document>, BackendError> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, body: Document) -> Result<(), BackendError> {
        (**self).write(path, body).await
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        (**self).delete(path).await
    }
}

#[async_trait]
impl<T> LogicalBackend for Box<T>
where
    T: LogicalBackend + ?Sized,
{
    async fn read(&self, path: &str) -> Result<Option<Document>, BackendError> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, body: Document) -> Result<(), BackendError> {
        (**self).write(path, body).await
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        (**self).delete(path).await
    }
}

pub type DynLogicalBackend = Arc<dyn LogicalBackend>;
