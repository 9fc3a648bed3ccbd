//! In-process stand-in for the subset of the Vault API keymaster touches.
//!
//! Policy writes under `sys/policy/` are decoded the way the server does it
//! (base64 or raw rules) and read back as `{name, rules}`. Auth role reads
//! under `auth/<mount>/role/` echo the server-side defaults for fields that
//! were never written. Everything else is plain key/value storage.

use super::{BackendError, Document, LogicalBackend};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

const POLICY_PREFIX: &str = "sys/policy/";

/// Backend operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    Delete,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Document>,
    failures: VecDeque<(Op, String)>,
    writes: Vec<String>,
}

/// Shared in-memory backend. Clones see the same storage, so a test can keep
/// one handle for inspection and hand another to [`crate::KeyMaster`].
///
/// Latency is per handle: `backend.clone().with_latency(..)` gives a slow view
/// of the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation, so callers can observe cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `op` with `message`. Queued failures fire in order.
    pub fn fail_next(&self, op: Op, message: impl Into<String>) {
        self.state().failures.push_back((op, message.into()));
    }

    /// Store `doc` at `path` verbatim, bypassing any endpoint emulation.
    pub fn insert_raw(&self, path: impl Into<String>, doc: Document) {
        self.state().entries.insert(path.into(), doc);
    }

    /// Stored document at `path` without endpoint emulation.
    pub fn raw(&self, path: &str) -> Option<Document> {
        self.state().entries.get(path).cloned()
    }

    /// Paths written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, op: Op) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state();
        if let Some(index) = state.failures.iter().position(|(kind, _)| *kind == op) {
            if let Some((_, message)) = state.failures.remove(index) {
                return Err(BackendError::Other(message));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LogicalBackend for MemoryBackend {
    async fn read(&self, path: &str) -> Result<Option<Document>, BackendError> {
        self.enter(Op::Read).await?;
        let stored = self.state().entries.get(path).cloned();
        Ok(stored.map(|doc| {
            if is_auth_role(path) {
                with_auth_role_defaults(doc)
            } else {
                doc
            }
        }))
    }

    async fn write(&self, path: &str, body: Document) -> Result<(), BackendError> {
        self.enter(Op::Write).await?;
        let doc = match path.strip_prefix(POLICY_PREFIX) {
            Some(name) => policy_document(name, &body)?,
            None => body,
        };
        debug!(path, "memory backend write");
        let mut state = self.state();
        state.writes.push(path.to_string());
        state.entries.insert(path.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        self.enter(Op::Delete).await?;
        self.state().entries.remove(path);
        Ok(())
    }
}

fn policy_document(name: &str, body: &Document) -> Result<Document, BackendError> {
    let raw = body
        .get("policy")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Status {
            status: 400,
            body: "'policy' parameter not supplied or empty".into(),
        })?;
    let rules = STANDARD
        .decode(raw.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string());

    let mut doc = Document::new();
    doc.insert("name".into(), Value::String(name.to_string()));
    doc.insert("rules".into(), Value::String(rules));
    Ok(doc)
}

fn is_auth_role(path: &str) -> bool {
    let mut segments = path.split('/');
    matches!(
        (segments.next(), segments.next(), segments.next(), segments.next()),
        (Some("auth"), Some(_), Some("role"), Some(name)) if !name.is_empty()
    )
}

fn with_auth_role_defaults(stored: Document) -> Document {
    let defaults = json!({
        "alias_name_source": "serviceaccount_uid",
        "audience": "",
        "bound_service_account_names": [],
        "bound_service_account_namespaces": [],
        "policies": [],
        "token_bound_cidrs": [],
        "token_explicit_max_ttl": 0,
        "token_max_ttl": 0,
        "token_no_default_policy": false,
        "token_num_uses": 0,
        "token_period": 0,
        "token_policies": [],
        "token_ttl": 0,
        "token_type": "default",
    });
    let mut doc = match defaults {
        Value::Object(map) => map,
        _ => Document::new(),
    };
    doc.extend(stored);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test]
    async fn policy_writes_are_decoded() {
        let backend = MemoryBackend::new();
        let encoded = STANDARD.encode(br#"{"path":{}}"#);
        backend
            .write("sys/policy/p1", doc(json!({"policy": encoded})))
            .await
            .unwrap();

        let stored = backend.read("sys/policy/p1").await.unwrap().unwrap();
        assert_eq!(stored["name"], "p1");
        assert_eq!(stored["rules"], r#"{"path":{}}"#);
    }

    #[tokio::test]
    async fn policy_write_without_body_is_rejected() {
        let backend = MemoryBackend::new();
        let err = backend
            .write("sys/policy/p1", Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 400, .. }));
        assert!(backend.writes().is_empty());
    }

    #[tokio::test]
    async fn auth_role_reads_include_defaults() {
        let backend = MemoryBackend::new();
        backend
            .write(
                "auth/k8s-bravo/role/app",
                doc(json!({"policies": ["a"], "token_policies": ["a"]})),
            )
            .await
            .unwrap();

        let stored = backend.read("auth/k8s-bravo/role/app").await.unwrap().unwrap();
        assert_eq!(stored["policies"], json!(["a"]));
        assert_eq!(stored["token_ttl"], json!(0));
        assert_eq!(stored["token_type"], "default");
    }

    #[tokio::test]
    async fn missing_paths_read_as_none_and_delete_quietly() {
        let backend = MemoryBackend::new();
        assert!(backend.read("secret/none").await.unwrap().is_none());
        backend.delete("secret/none").await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_fire_once_per_op() {
        let backend = MemoryBackend::new();
        backend.fail_next(Op::Write, "boom");

        backend.read("x").await.unwrap();
        assert!(backend.write("x", Document::new()).await.is_err());
        backend.write("x", Document::new()).await.unwrap();
        assert_eq!(backend.writes(), vec!["x".to_string()]);
    }

    #[test]
    fn auth_role_paths() {
        assert!(is_auth_role("auth/k8s-bravo/role/app"));
        assert!(!is_auth_role("auth/k8s-bravo/config"));
        assert!(!is_auth_role("auth/k8s-bravo/role/"));
        assert!(!is_auth_role("sys/policy/app"));
    }
}
