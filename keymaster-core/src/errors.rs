use crate::backend::BackendError;
use crate::types::RealmType;
use thiserror::Error;

/// Result alias for keymaster operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing identity/environment input.
    InvalidInput,
    /// The backend could not be reached or rejected the request.
    Transport,
    /// The backend returned data that does not parse.
    Decode,
    /// The caller cancelled the operation; remote outcome is unknown.
    Cancelled,
}

impl ErrorKind {
    /// Transport failures and cancellations may be retried once the caller has
    /// re-read remote state; bad input and bad data will fail again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Cancelled)
    }
}

/// Canonical keymaster error surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("environment is unset")]
    UnsetEnvironment,
    #[error("unsupported environment: {value}")]
    UnknownEnvironment { value: String },
    #[error("{kind} realms cannot be bound to an auth role")]
    UnsupportedRealm { kind: RealmType },
    #[error("realm does not apply to cluster {cluster}")]
    RealmNotForCluster { cluster: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
    #[error("{op} {path} failed: {source}")]
    Transport {
        op: &'static str,
        path: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("{op} {path} cancelled; remote state is unknown")]
    Cancelled { op: &'static str, path: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyField { .. }
            | Self::UnsetEnvironment
            | Self::UnknownEnvironment { .. }
            | Self::UnsupportedRealm { .. }
            | Self::RealmNotForCluster { .. } => ErrorKind::InvalidInput,
            Self::Context { source, .. } => source.kind(),
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Innermost error once all `Context` layers are peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach operation context to a failing result, keeping the underlying error as source.
pub trait ResultExt<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: context.into(),
            source: Box::new(source),
        })
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: f().into(),
            source: Box::new(source),
        })
    }
}
