//! Vault policy derivation and Kubernetes auth role reconciliation.
//!
//! Roles owned by a team get a deterministic, least-privilege policy granting
//! `read` on the secrets they own. Policies are written through Vault's
//! `sys/policy` endpoint and attached to or detached from auth roles bound to
//! a cluster.

pub mod auth;
pub mod backend;
pub mod errors;
pub mod keymaster;
pub mod naming;
pub mod policy;
pub mod store;
pub mod types;

pub use auth::AuthRoleConfig;
pub use backend::memory::MemoryBackend;
pub use backend::{BackendError, Document, DynLogicalBackend, LogicalBackend};
pub use errors::{Error, ErrorKind, Result, ResultExt};
pub use keymaster::KeyMaster;
pub use naming::{k8s_auth_role_path, policy_name, policy_path, secret_path};
pub use policy::{Capability, PathRule, Policy, PolicyPayload, make_policy_payload, new_policy};
pub use types::{Cluster, Environment, Generator, Realm, RealmType, Role, Secret};

pub use tokio_util::sync::CancellationToken;
