//! Least-privilege policy derivation.
//!
//! A role's policy grants `read` on every secret it owns and on its own
//! policy path. Nothing here talks to the backend.

use crate::errors::{Result, ResultExt};
use crate::naming;
use crate::types::{Environment, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vault ACL capability vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Create,
    Read,
    Update,
    Patch,
    Delete,
    List,
    Sudo,
    Deny,
}

/// Capabilities granted on a single path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathRule {
    pub capabilities: Vec<Capability>,
}

impl PathRule {
    pub fn read_only() -> Self {
        Self {
            capabilities: vec![Capability::Read],
        }
    }
}

/// Access-control document stored as a Vault policy.
///
/// ```json
/// { "path": { "development/data/core-services/foo": { "capabilities": ["read"] } } }
/// ```
///
/// Keys are kept in alphabetical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyPayload {
    #[serde(default)]
    pub path: BTreeMap<String, PathRule>,
}

impl PolicyPayload {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    fn grant_read(&mut self, path: String) {
        self.path.insert(path, PathRule::read_only());
    }
}

/// A named policy, its backend location and its rules.
///
/// The zero value (`Policy::default()`) is what a read of an absent policy
/// returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub path: String,
    pub payload: PolicyPayload,
}

impl Policy {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.path.is_empty() && self.payload.is_empty()
    }
}

/// Derive the policy for `role` in `env`. No backend interaction.
pub fn new_policy(role: &Role, env: Environment) -> Result<Policy> {
    let payload = make_policy_payload(role, env).context("failed to create payload")?;
    let name = naming::policy_name(&role.name, role.namespace(), env)
        .context("failed to create policy name")?;
    let path = naming::policy_path(&role.name, role.namespace(), env)
        .context("failed to create policy path")?;
    Ok(Policy {
        name,
        path,
        payload,
    })
}

/// Grant `read` on each owned secret plus the role's own policy path.
///
/// Only `read` is ever emitted and every path is concrete; wildcards are not
/// supported.
pub fn make_policy_payload(role: &Role, env: Environment) -> Result<PolicyPayload> {
    let mut payload = PolicyPayload::default();

    for secret in &role.secrets {
        let path = naming::secret_path(&secret.name, &secret.team, env).with_context(|| {
            format!(
                "failed to create secret path for {} role {}",
                secret.name, role.name
            )
        })?;
        payload.grant_read(path);
    }

    let own = naming::policy_path(&role.name, role.namespace(), env)
        .context("failed to create policy path")?;
    payload.grant_read(own);

    Ok(payload)
}
