//! Team and cluster definition files.
//!
//! A team file names the team and lists its roles with the secrets they own
//! and the realms they may authenticate through. A cluster file lists the
//! clusters roles are bound into. Both may be YAML or JSON; the extension
//! decides.

mod validate;

use anyhow::{Context, Result, anyhow, bail};
use keymaster_core::{Cluster, Generator, Realm, Role, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use validate::{validate_clusters, validate_team};

/// A team and the roles it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub roles: Vec<Role>,
}

impl Team {
    pub fn role(&self, name: &str) -> Result<&Role> {
        self.roles
            .iter()
            .find(|role| role.name == name)
            .ok_or_else(|| anyhow!("team {} has no role named {name}", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFile {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    pub name: String,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
    #[serde(default)]
    pub realms: Vec<Realm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
    pub name: String,
    /// Owning team when it differs from the file's team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub generator: Generator,
}

impl TeamFile {
    pub fn into_team(self) -> Team {
        let team = self.name;
        let roles = self
            .roles
            .into_iter()
            .map(|entry| Role {
                name: entry.name,
                team: team.clone(),
                secrets: entry
                    .secrets
                    .into_iter()
                    .map(|secret| Secret {
                        name: secret.name,
                        team: secret.team.unwrap_or_else(|| team.clone()),
                        generator: secret.generator,
                    })
                    .collect(),
                realms: entry.realms,
            })
            .collect();
        Team { name: team, roles }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterFile {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl ClusterFile {
    pub fn cluster(&self, name: &str) -> Result<&Cluster> {
        self.clusters
            .iter()
            .find(|cluster| cluster.name == name)
            .ok_or_else(|| anyhow!("unknown cluster {name}"))
    }
}

pub fn load_team(path: &Path) -> Result<Team> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read team file {}", path.display()))?;
    parse_team(&data, path)
}

pub fn parse_team(data: &str, path: &Path) -> Result<Team> {
    let file: TeamFile = parse(data, path)?;
    let team = file.into_team();
    let problems = validate_team(&team);
    if !problems.is_empty() {
        bail!("invalid team file {}: {}", path.display(), problems.join("; "));
    }
    Ok(team)
}

pub fn load_clusters(path: &Path) -> Result<ClusterFile> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read cluster file {}", path.display()))?;
    parse_clusters(&data, path)
}

pub fn parse_clusters(data: &str, path: &Path) -> Result<ClusterFile> {
    let file: ClusterFile = parse(data, path)?;
    let problems = validate_clusters(&file.clusters);
    if !problems.is_empty() {
        bail!(
            "invalid cluster file {}: {}",
            path.display(),
            problems.join("; ")
        );
    }
    Ok(file)
}

fn parse<T: DeserializeOwned>(data: &str, path: &Path) -> Result<T> {
    if path.extension().map(|ext| ext == "json").unwrap_or(false) {
        serde_json::from_str(data).with_context(|| format!("invalid json in {}", path.display()))
    } else {
        serde_yaml::from_str(data).with_context(|| format!("invalid yaml in {}", path.display()))
    }
}
