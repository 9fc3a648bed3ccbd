//! Deterministic names and backend paths derived from role metadata.
//!
//! Namespaces like `core-platform` produce names with embedded hyphens, so a
//! policy name cannot be split back into its inputs.

use crate::errors::{Error, Result, ResultExt};
use crate::types::Environment;

/// Mount under which Vault stores ACL policies.
pub const POLICY_PREFIX: &str = "sys/policy";

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::EmptyField { field });
    }
    Ok(())
}

/// `{namespace}-{role}-{environment}`.
pub fn policy_name(role: &str, namespace: &str, env: Environment) -> Result<String> {
    require(role, "role")?;
    require(namespace, "namespace")?;
    let env = env.token()?;
    Ok(format!("{namespace}-{role}-{env}"))
}

/// `sys/policy/{policy_name}`.
pub fn policy_path(role: &str, namespace: &str, env: Environment) -> Result<String> {
    let name = policy_name(role, namespace, env).context("failed to create policy name")?;
    Ok(format!("{POLICY_PREFIX}/{name}"))
}

/// KV v2 data path of a secret: `{environment}/data/{namespace}/{secret}`.
pub fn secret_path(secret: &str, namespace: &str, env: Environment) -> Result<String> {
    require(secret, "secret")?;
    require(namespace, "namespace")?;
    let env = env.token()?;
    Ok(format!("{env}/data/{namespace}/{secret}"))
}

/// Location of a role's Kubernetes auth configuration within a cluster's mount.
pub fn k8s_auth_role_path(cluster: &str, role: &str, namespace: &str) -> Result<String> {
    require(cluster, "cluster")?;
    require(role, "role")?;
    require(namespace, "namespace")?;
    Ok(format!("auth/k8s-{cluster}/role/{namespace}-{role}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn policy_names_per_environment() {
        let cases = [
            (Environment::Development, "core-services-app1-development"),
            (Environment::Staging, "core-services-app1-staging"),
            (Environment::Production, "core-services-app1-production"),
        ];
        for (env, expected) in cases {
            assert_eq!(policy_name("app1", "core-services", env).unwrap(), expected);
        }
    }

    #[test]
    fn names_are_deterministic() {
        let first = policy_path("app1", "core-services", Environment::Staging).unwrap();
        for _ in 0..10 {
            assert_eq!(
                policy_path("app1", "core-services", Environment::Staging).unwrap(),
                first
            );
        }
        assert_eq!(first, "sys/policy/core-services-app1-staging");
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let err = policy_name("", "core-services", Environment::Development).unwrap_err();
        assert!(matches!(err, Error::EmptyField { field: "role" }));

        let err = policy_name("app1", " ", Environment::Development).unwrap_err();
        assert!(matches!(err, Error::EmptyField { field: "namespace" }));

        let err = policy_name("app1", "core-services", Environment::Unset).unwrap_err();
        assert!(matches!(err, Error::UnsetEnvironment));
    }

    #[test]
    fn policy_path_wraps_name_failure() {
        let err = policy_path("", "core-services", Environment::Production).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().starts_with("failed to create policy name"));
    }

    #[test]
    fn secret_paths() {
        assert_eq!(
            secret_path("foo", "core-services", Environment::Development).unwrap(),
            "development/data/core-services/foo"
        );
        assert!(secret_path("", "core-services", Environment::Development).is_err());
        assert!(secret_path("foo", "core-services", Environment::Unset).is_err());
    }

    #[test]
    fn auth_role_path() {
        assert_eq!(
            k8s_auth_role_path("bravo", "app1", "core-services").unwrap(),
            "auth/k8s-bravo/role/core-services-app1"
        );
        assert!(k8s_auth_role_path("", "app1", "core-services").is_err());
    }
}
