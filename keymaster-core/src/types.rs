use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment tier used to namespace policies and secret paths.
///
/// `Unset` is the default so that a missing value in configuration is
/// detectable instead of silently mapping to a real tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(skip)]
    Unset,
    #[serde(alias = "dev")]
    Development,
    #[serde(alias = "stage")]
    Staging,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    /// Token embedded in policy names and secret paths.
    pub fn token(self) -> Result<&'static str> {
        match self {
            Self::Unset => Err(Error::UnsetEnvironment),
            Self::Development => Ok("development"),
            Self::Staging => Ok("staging"),
            Self::Production => Ok("production"),
        }
    }

    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token() {
            Ok(token) => f.write_str(token),
            Err(_) => f.write_str("unset"),
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            "" => Err(Error::UnsetEnvironment),
            other => Err(Error::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Value-generation strategy for a secret. Opaque to policy derivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Generator {
    Alpha { length: usize },
    Numeric { length: usize },
    Hex { length: usize },
    Uuid,
    Chbs { words: usize },
}

/// A named credential owned by a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub team: String,
    pub generator: Generator,
}

impl Secret {
    pub fn new(name: impl Into<String>, team: impl Into<String>, generator: Generator) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            generator,
        }
    }
}

/// Authentication scheme a realm binds through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RealmType {
    K8s,
    Aws,
    Tls,
}

impl fmt::Display for RealmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::K8s => "k8s",
            Self::Aws => "aws",
            Self::Tls => "tls",
        })
    }
}

/// Which external identities may authenticate as a role.
///
/// Identifiers name the clusters the realm applies to. For Kubernetes realms
/// the principals are service account names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Realm {
    #[serde(rename = "type")]
    pub kind: RealmType,
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub principals: Vec<String>,
}

impl Realm {
    pub fn k8s<I, P>(identifiers: I, principals: P) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            kind: RealmType::K8s,
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            principals: principals.into_iter().map(Into::into).collect(),
        }
    }
}

/// Application identity owning secrets and eligible for policy grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub realms: Vec<Realm>,
}

impl Role {
    pub fn new(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            secrets: Vec::new(),
            realms: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn with_realm(mut self, realm: Realm) -> Self {
        self.realms.push(realm);
        self
    }

    /// Namespace the role's policy is derived in.
    pub fn namespace(&self) -> &str {
        &self.team
    }
}

/// Deployment and authentication context a role binds into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub api_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub bound_cidrs: Vec<String>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            api_server: String::new(),
            ca_cert: None,
            environment,
            bound_cidrs: Vec::new(),
        }
    }

    pub fn with_bound_cidrs<I>(mut self, cidrs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.bound_cidrs = cidrs.into_iter().map(Into::into).collect();
        self
    }
}
