//! Persisting policies through Vault's `sys/policy` endpoint.
//!
//! Policies are not normal writes: the rules document is serialized to JSON
//! and sent base64 encoded under a `policy` key. Reads come back as a `rules`
//! string which may carry backslash escaping.

use crate::backend::Document;
use crate::errors::{Error, Result};
use crate::keymaster::KeyMaster;
use crate::policy::{Policy, PolicyPayload};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl KeyMaster {
    /// Upsert `policy` at its path.
    ///
    /// A cancelled write may or may not have been applied; re-read to confirm.
    pub async fn write_policy(&self, policy: &Policy, cancel: &CancellationToken) -> Result<()> {
        let body = encode_policy(policy)?;
        self.write_doc("write policy", &policy.path, body, cancel)
            .await?;
        info!(policy = %policy.name, path = %policy.path, "policy written");
        Ok(())
    }

    /// Fetch and decode the policy stored at `path`.
    ///
    /// An absent policy is not an error: the zero `Policy` is returned and
    /// callers check [`Policy::is_empty`].
    pub async fn read_policy(&self, path: &str, cancel: &CancellationToken) -> Result<Policy> {
        let Some(data) = self.read_doc("read policy", path, cancel).await? else {
            debug!(path, "no policy stored");
            return Ok(Policy::default());
        };
        decode_policy(path, &data)
    }

    /// Remove the policy at `path`. Auth roles that reference it by name are
    /// left untouched; detach them first.
    pub async fn delete_policy(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        self.delete_doc("delete policy", path, cancel).await?;
        info!(path, "policy deleted");
        Ok(())
    }
}

fn encode_policy(policy: &Policy) -> Result<Document> {
    let json = serde_json::to_vec(&policy.payload).map_err(|err| Error::Decode {
        path: policy.path.clone(),
        message: format!("failed to marshal payload for {}: {err}", policy.name),
    })?;
    let mut body = Document::new();
    body.insert("policy".into(), Value::String(STANDARD.encode(json)));
    Ok(body)
}

fn decode_policy(path: &str, data: &Document) -> Result<Policy> {
    let name = data
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let Some(raw_rules) = data.get("rules").and_then(Value::as_str) else {
        return Ok(Policy::default());
    };

    let rules = raw_rules.replace('\\', "");
    let payload: PolicyPayload = serde_json::from_str(&rules).map_err(|err| Error::Decode {
        path: path.to_string(),
        message: format!("failed to unmarshal policy rules: {err}"),
    })?;

    Ok(Policy {
        name,
        path: path.to_string(),
        payload,
    })
}
