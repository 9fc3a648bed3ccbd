use crate::backend::{BackendError, Document, DynLogicalBackend, LogicalBackend};
use crate::errors::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point for every operation that talks to the backend.
///
/// Holds no state besides the backend handle: each call is an independent
/// round trip, so concurrent read-modify-write cycles against the same auth
/// role can lose updates. Callers that reconcile one binding from several
/// tasks must serialize per binding themselves.
#[derive(Clone)]
pub struct KeyMaster {
    backend: DynLogicalBackend,
}

impl KeyMaster {
    pub fn new<B>(backend: B) -> Self
    where
        B: LogicalBackend + 'static,
    {
        Self::from_dyn(Arc::new(backend))
    }

    /// Wrap a backend chosen at runtime.
    pub fn from_dyn(backend: DynLogicalBackend) -> Self {
        Self { backend }
    }

    pub(crate) async fn read_doc(
        &self,
        op: &'static str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Document>> {
        guarded(op, path, cancel, self.backend.read(path)).await
    }

    pub(crate) async fn write_doc(
        &self,
        op: &'static str,
        path: &str,
        body: Document,
        cancel: &CancellationToken,
    ) -> Result<()> {
        guarded(op, path, cancel, self.backend.write(path, body)).await
    }

    pub(crate) async fn delete_doc(
        &self,
        op: &'static str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        guarded(op, path, cancel, self.backend.delete(path)).await
    }
}

/// Race a backend call against cancellation and wrap its failure.
async fn guarded<T, F>(
    op: &'static str,
    path: &str,
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    let cancelled = || Error::Cancelled {
        op,
        path: path.to_string(),
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        result = call => result.map_err(|source| match source {
            BackendError::Malformed(message) => Error::Decode {
                path: path.to_string(),
                message,
            },
            source => Error::Transport {
                op,
                path: path.to_string(),
                source,
            },
        }),
    }
}
