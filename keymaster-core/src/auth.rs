//! Kubernetes auth role bindings and the policy lists attached to them.

use crate::backend::Document;
use crate::errors::{Error, Result, ResultExt};
use crate::keymaster::KeyMaster;
use crate::naming;
use crate::policy::Policy;
use crate::types::{Cluster, Realm, RealmType, Role};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_TOKEN_TYPE: &str = "default";

/// Kubernetes namespace the realm's service accounts are bound in.
pub const SERVICE_ACCOUNT_NAMESPACE: &str = "default";

/// Persisted configuration of one auth role.
///
/// `policies` and `token_policies` always carry the same list. Token
/// issuance settings are written with their zero values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRoleConfig {
    #[serde(default, deserialize_with = "nullable")]
    pub bound_cidrs: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub bound_service_account_names: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub bound_service_account_namespaces: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub policies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub token_bound_cidrs: Vec<String>,
    #[serde(default, deserialize_with = "seconds")]
    pub token_explicit_max_ttl: u64,
    #[serde(default, deserialize_with = "seconds")]
    pub token_max_ttl: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub token_no_default_policy: bool,
    #[serde(default, deserialize_with = "seconds")]
    pub token_num_uses: u64,
    #[serde(default, deserialize_with = "seconds")]
    pub token_period: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub token_policies: Vec<String>,
    #[serde(default, deserialize_with = "seconds")]
    pub token_ttl: u64,
    #[serde(default = "default_token_type", deserialize_with = "token_type")]
    pub token_type: String,
}

impl Default for AuthRoleConfig {
    fn default() -> Self {
        Self {
            bound_cidrs: Vec::new(),
            bound_service_account_names: Vec::new(),
            bound_service_account_namespaces: Vec::new(),
            policies: Vec::new(),
            token_bound_cidrs: Vec::new(),
            token_explicit_max_ttl: 0,
            token_max_ttl: 0,
            token_no_default_policy: false,
            token_num_uses: 0,
            token_period: 0,
            token_policies: Vec::new(),
            token_ttl: 0,
            token_type: default_token_type(),
        }
    }
}

impl AuthRoleConfig {
    /// Full configuration for `realm` on `cluster` with `policies` attached.
    ///
    /// The realm's identifiers select clusters and are not persisted.
    pub fn new(cluster: &Cluster, realm: &Realm, policies: Vec<String>) -> Self {
        Self {
            bound_cidrs: cluster.bound_cidrs.clone(),
            bound_service_account_names: realm.principals.clone(),
            bound_service_account_namespaces: vec![SERVICE_ACCOUNT_NAMESPACE.to_string()],
            token_bound_cidrs: cluster.bound_cidrs.clone(),
            token_policies: policies.clone(),
            policies,
            ..Self::default()
        }
    }

    /// Decode a backend document, reconciling the two policy fields.
    pub fn from_document(path: &str, doc: Document) -> Result<Self> {
        let mut config: Self =
            serde_json::from_value(Value::Object(doc)).map_err(|err| Error::Decode {
                path: path.to_string(),
                message: format!("failed to decode auth role: {err}"),
            })?;
        config.mirror_policies();
        Ok(config)
    }

    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    pub fn contains_policy(&self, name: &str) -> bool {
        self.policies.iter().any(|p| p == name)
    }

    fn mirror_policies(&mut self) {
        if self.token_policies.is_empty() {
            self.token_policies = self.policies.clone();
        } else if self.policies != self.token_policies {
            self.policies = self.token_policies.clone();
        }
    }
}

/// Append `name` unless already present. Returns whether the list changed.
pub fn insert_policy(policies: &mut Vec<String>, name: &str) -> bool {
    if policies.iter().any(|p| p == name) {
        return false;
    }
    policies.push(name.to_string());
    true
}

/// Remove the first exact match of `name`. Returns whether the list changed.
pub fn remove_policy(policies: &mut Vec<String>, name: &str) -> bool {
    match policies.iter().position(|p| p == name) {
        Some(index) => {
            policies.remove(index);
            true
        }
        None => false,
    }
}

impl KeyMaster {
    /// Current auth role configuration of `role` on `cluster`. Missing
    /// configuration reads as defaults.
    pub async fn read_binding(
        &self,
        cluster: &Cluster,
        role: &Role,
        cancel: &CancellationToken,
    ) -> Result<AuthRoleConfig> {
        let path = binding_path(cluster, role)?;
        match self.read_doc("read auth role", &path, cancel).await? {
            Some(doc) => AuthRoleConfig::from_document(&path, doc),
            None => {
                debug!(%path, "no auth role configured");
                Ok(AuthRoleConfig::default())
            }
        }
    }

    /// Replace the auth role configuration with `policy_names` attached.
    ///
    /// `realm` must be a Kubernetes realm listing `cluster` among its
    /// identifiers.
    pub async fn write_binding(
        &self,
        cluster: &Cluster,
        role: &Role,
        realm: &Realm,
        policy_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_realm(cluster, realm)?;
        let path = binding_path(cluster, role)?;
        let config = AuthRoleConfig::new(cluster, realm, policy_names.to_vec());
        self.write_doc("write auth role", &path, config.to_document(), cancel)
            .await?;
        debug!(%path, policies = ?policy_names, "auth role written");
        Ok(())
    }

    /// Attach `policy` to the role's binding, keeping existing order.
    pub async fn add_policy(
        &self,
        cluster: &Cluster,
        role: &Role,
        realm: &Realm,
        policy: &Policy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require_policy_name(policy)?;
        check_realm(cluster, realm)?;
        let mut current = self
            .read_binding(cluster, role, cancel)
            .await
            .with_context(|| format!("failed to add {} to {}", policy.name, role.name))?;
        let changed = insert_policy(&mut current.policies, &policy.name);
        self.write_binding(cluster, role, realm, &current.policies, cancel)
            .await
            .with_context(|| format!("failed to add {} to {}", policy.name, role.name))?;
        info!(
            cluster = %cluster.name,
            role = %role.name,
            policy = %policy.name,
            changed,
            "policy attached"
        );
        Ok(())
    }

    /// Detach `policy` from the role's binding, keeping the remaining order.
    pub async fn remove_policy(
        &self,
        cluster: &Cluster,
        role: &Role,
        realm: &Realm,
        policy: &Policy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require_policy_name(policy)?;
        check_realm(cluster, realm)?;
        let mut current = self
            .read_binding(cluster, role, cancel)
            .await
            .with_context(|| format!("failed to remove {} from {}", policy.name, role.name))?;
        let changed = remove_policy(&mut current.policies, &policy.name);
        self.write_binding(cluster, role, realm, &current.policies, cancel)
            .await
            .with_context(|| format!("failed to remove {} from {}", policy.name, role.name))?;
        info!(
            cluster = %cluster.name,
            role = %role.name,
            policy = %policy.name,
            changed,
            "policy detached"
        );
        Ok(())
    }
}

fn binding_path(cluster: &Cluster, role: &Role) -> Result<String> {
    naming::k8s_auth_role_path(&cluster.name, &role.name, role.namespace())
        .context("failed to create auth role path")
}

fn check_realm(cluster: &Cluster, realm: &Realm) -> Result<()> {
    if realm.kind != RealmType::K8s {
        return Err(Error::UnsupportedRealm { kind: realm.kind });
    }
    if !realm.identifiers.iter().any(|id| *id == cluster.name) {
        return Err(Error::RealmNotForCluster {
            cluster: cluster.name.clone(),
        });
    }
    Ok(())
}

fn require_policy_name(policy: &Policy) -> Result<()> {
    if policy.name.is_empty() {
        return Err(Error::EmptyField {
            field: "policy name",
        });
    }
    Ok(())
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn token_type<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.is_empty())
        .unwrap_or_else(default_token_type))
}

/// Vault reports durations as integers but accepts strings like `"0"` on
/// write; tolerate either on read.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Number(value)) => Ok(value),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(0),
        Some(Raw::Text(text)) => text
            .trim()
            .trim_end_matches('s')
            .parse()
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn insert_is_idempotent_and_ordered() {
        let mut list = vec!["a".to_string()];
        assert!(insert_policy(&mut list, "b"));
        assert!(!insert_policy(&mut list, "a"));
        assert!(!insert_policy(&mut list, "b"));
        assert_eq!(list, vec!["a", "b"]);
    }

    #[test]
    fn remove_is_exact_and_keeps_order() {
        let mut list = vec!["a".to_string(), "ab".to_string(), "c".to_string()];
        assert!(!remove_policy(&mut list, "b"));
        assert!(remove_policy(&mut list, "a"));
        assert!(!remove_policy(&mut list, "a"));
        assert_eq!(list, vec!["ab", "c"]);
    }

    #[test]
    fn new_config_mirrors_policies_and_zeroes_tokens() {
        let cluster = Cluster::new("bravo", crate::types::Environment::Development)
            .with_bound_cidrs(["10.0.0.0/8", "10.0.0.0/8"]);
        let realm = Realm::k8s(["bravo"], ["app1"]);
        let config = AuthRoleConfig::new(&cluster, &realm, vec!["p1".into()]);

        assert_eq!(config.policies, config.token_policies);
        assert_eq!(config.bound_cidrs, vec!["10.0.0.0/8", "10.0.0.0/8"]);
        assert_eq!(config.token_bound_cidrs, config.bound_cidrs);
        assert_eq!(config.bound_service_account_names, vec!["app1"]);
        assert_eq!(config.bound_service_account_namespaces, vec!["default"]);
        assert!(!config.bound_service_account_names.contains(&"bravo".to_string()));
        assert!(!config.bound_service_account_namespaces.contains(&"bravo".to_string()));
        assert_eq!(config.token_ttl, 0);
        assert_eq!(config.token_type, "default");
        assert!(!config.token_no_default_policy);
    }

    #[test]
    fn document_has_fixed_field_set() {
        let doc = AuthRoleConfig::default().to_document();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "bound_cidrs",
                "bound_service_account_names",
                "bound_service_account_namespaces",
                "policies",
                "token_bound_cidrs",
                "token_explicit_max_ttl",
                "token_max_ttl",
                "token_no_default_policy",
                "token_num_uses",
                "token_period",
                "token_policies",
                "token_ttl",
                "token_type",
            ]
        );
    }

    #[test]
    fn decoding_normalizes_backend_defaults() {
        let config = AuthRoleConfig::from_document(
            "auth/k8s-bravo/role/x",
            doc(json!({
                "bound_cidrs": null,
                "token_policies": ["p1"],
                "token_ttl": "0",
                "token_type": "",
                "alias_name_source": "serviceaccount_uid",
            })),
        )
        .unwrap();

        assert!(config.bound_cidrs.is_empty());
        assert_eq!(config.policies, vec!["p1"]);
        assert_eq!(config.token_policies, vec!["p1"]);
        assert_eq!(config.token_ttl, 0);
        assert_eq!(config.token_type, "default");
    }

    #[test]
    fn decoding_rejects_wrong_shapes() {
        let err = AuthRoleConfig::from_document(
            "auth/k8s-bravo/role/x",
            doc(json!({"policies": "not-a-list"})),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Decode);
    }
}
