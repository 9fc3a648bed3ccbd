use crate::Team;
use keymaster_core::{Cluster, RealmType};
use std::collections::HashSet;

pub fn validate_team(team: &Team) -> Vec<String> {
    let mut problems = Vec::new();
    if team.name.trim().is_empty() {
        problems.push("empty team name".to_string());
    }

    let mut roles = HashSet::new();
    for role in &team.roles {
        if role.name.trim().is_empty() {
            problems.push("empty role name".to_string());
            continue;
        }
        if !roles.insert(role.name.as_str()) {
            problems.push(format!("duplicate role {}", role.name));
        }

        let mut secrets = HashSet::new();
        for secret in &role.secrets {
            if secret.name.trim().is_empty() {
                problems.push(format!("empty secret name in role {}", role.name));
            } else if !secrets.insert((secret.team.as_str(), secret.name.as_str())) {
                problems.push(format!(
                    "duplicate secret {} in role {}",
                    secret.name, role.name
                ));
            }
        }

        for (index, realm) in role.realms.iter().enumerate() {
            if realm.principals.is_empty() {
                problems.push(format!(
                    "realm {index} of role {} has no principals",
                    role.name
                ));
            }
            if realm.kind == RealmType::K8s && realm.identifiers.is_empty() {
                problems.push(format!(
                    "k8s realm {index} of role {} names no clusters",
                    role.name
                ));
            }
        }
    }
    problems
}

pub fn validate_clusters(clusters: &[Cluster]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut names = HashSet::new();
    for cluster in clusters {
        if cluster.name.trim().is_empty() {
            problems.push("empty cluster name".to_string());
            continue;
        }
        if !names.insert(cluster.name.as_str()) {
            problems.push(format!("duplicate cluster {}", cluster.name));
        }
        if !cluster.environment.is_set() {
            problems.push(format!("cluster {} has no environment", cluster.name));
        }
    }
    problems
}
