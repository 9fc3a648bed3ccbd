mod telemetry;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keymaster_config::{Team, load_clusters, load_team};
use keymaster_core::{
    CancellationToken, Cluster, DynLogicalBackend, Environment, KeyMaster, MemoryBackend, Policy,
    Realm, Role, new_policy,
};
use keymaster_vault::VaultBackend;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "keymaster",
    version,
    about = "Vault policy and auth binding manager"
)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    /// Cancel backend calls after this many seconds.
    #[arg(long, global = true, env = "KEYMASTER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Backend to talk to. `memory` is an in-process dry run.
    #[arg(long, global = true, value_enum, default_value_t = BackendKind::Vault)]
    backend: BackendKind,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Vault,
    Memory,
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    Policy(PolicyCmd),
    #[command(subcommand)]
    Auth(AuthCmd),
}

#[derive(Subcommand)]
enum PolicyCmd {
    /// Print the policy derived for a role without contacting the backend.
    Show(RoleArgs),
    /// Write the policy of one role, or of every role in the team.
    Apply(ApplyArgs),
    Read(PathArgs),
    Delete(PathArgs),
}

#[derive(Subcommand)]
enum AuthCmd {
    Show(BindingArgs),
    /// Replace the binding with the role's own policy.
    Write(BindingArgs),
    /// Attach a policy to the role's binding.
    Attach(BindingArgs),
    /// Detach a policy from the role's binding.
    Detach(BindingArgs),
}

#[derive(Args)]
struct RoleArgs {
    #[arg(long)]
    team: PathBuf,
    #[arg(long)]
    role: String,
    #[arg(long)]
    env: Environment,
}

#[derive(Args)]
struct ApplyArgs {
    #[arg(long)]
    team: PathBuf,
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    env: Environment,
}

#[derive(Args)]
struct PathArgs {
    #[arg(long)]
    path: String,
}

#[derive(Args)]
struct BindingArgs {
    #[arg(long)]
    clusters: PathBuf,
    #[arg(long)]
    cluster: String,
    #[arg(long)]
    team: PathBuf,
    #[arg(long)]
    role: String,
    /// Defaults to the cluster's environment.
    #[arg(long)]
    env: Option<Environment>,
    #[arg(long, default_value_t = 0)]
    realm: usize,
    /// Role whose policy is attached or detached; defaults to `--role`.
    #[arg(long)]
    policy_role: Option<String>,
}

struct Binding {
    cluster: Cluster,
    team: Team,
    role: Role,
    env: Environment,
}

impl BindingArgs {
    fn load(&self) -> Result<Binding> {
        let clusters = load_clusters(&self.clusters)?;
        let cluster = clusters.cluster(&self.cluster)?.clone();
        let team = load_team(&self.team)?;
        let role = team.role(&self.role)?.clone();
        let env = self.env.unwrap_or(cluster.environment);
        Ok(Binding {
            cluster,
            team,
            role,
            env,
        })
    }
}

impl Binding {
    fn realm(&self, index: usize) -> Result<&Realm> {
        self.role
            .realms
            .get(index)
            .ok_or_else(|| anyhow!("role {} has no realm {index}", self.role.name))
    }

    fn policy(&self, policy_role: Option<&str>) -> Result<Policy> {
        let role = match policy_role {
            Some(name) => self.team.role(name)?,
            None => &self.role,
        };
        new_policy(role, self.env)
            .with_context(|| format!("failed to derive policy for {}", role.name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json)?;

    let cancel = CancellationToken::new();
    if let Some(secs) = cli.timeout_secs {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            deadline.cancel();
        });
    }

    match cli.command {
        Command::Policy(cmd) => run_policy(cli.backend, cmd, &cancel).await,
        Command::Auth(cmd) => run_auth(&keymaster(cli.backend)?, cmd, &cancel).await,
    }
}

fn keymaster(kind: BackendKind) -> Result<KeyMaster> {
    let backend: DynLogicalBackend = match kind {
        BackendKind::Vault => {
            Arc::new(VaultBackend::from_env().context("failed to configure vault backend")?)
        }
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    Ok(KeyMaster::from_dyn(backend))
}

async fn run_policy(
    backend: BackendKind,
    cmd: PolicyCmd,
    cancel: &CancellationToken,
) -> Result<()> {
    match cmd {
        PolicyCmd::Show(args) => {
            let team = load_team(&args.team)?;
            let policy = new_policy(team.role(&args.role)?, args.env)?;
            print_policy(&policy)
        }
        PolicyCmd::Apply(args) => {
            let team = load_team(&args.team)?;
            let roles: Vec<&Role> = match &args.role {
                Some(name) => vec![team.role(name)?],
                None => team.roles.iter().collect(),
            };
            let policies = roles
                .into_iter()
                .map(|role| new_policy(role, args.env))
                .collect::<keymaster_core::Result<Vec<_>>>()?;
            let km = keymaster(backend)?;
            for policy in policies {
                km.write_policy(&policy, cancel).await?;
                println!("{}", policy.name);
            }
            Ok(())
        }
        PolicyCmd::Read(args) => {
            let policy = keymaster(backend)?.read_policy(&args.path, cancel).await?;
            if policy.is_empty() {
                info!(path = %args.path, "policy not found");
            }
            print_policy(&policy)
        }
        PolicyCmd::Delete(args) => {
            keymaster(backend)?.delete_policy(&args.path, cancel).await?;
            println!("{}", args.path);
            Ok(())
        }
    }
}

enum Change {
    Write,
    Attach,
    Detach,
}

async fn run_auth(km: &KeyMaster, cmd: AuthCmd, cancel: &CancellationToken) -> Result<()> {
    let (args, change) = match cmd {
        AuthCmd::Show(args) => (args, None),
        AuthCmd::Write(args) => (args, Some(Change::Write)),
        AuthCmd::Attach(args) => (args, Some(Change::Attach)),
        AuthCmd::Detach(args) => (args, Some(Change::Detach)),
    };
    let binding = args.load()?;
    let (cluster, role) = (&binding.cluster, &binding.role);

    match change {
        Some(Change::Write) => {
            let policy = binding.policy(None)?;
            let realm = binding.realm(args.realm)?;
            km.write_binding(cluster, role, realm, &[policy.name], cancel)
                .await?;
        }
        Some(Change::Attach) => {
            let policy = binding.policy(args.policy_role.as_deref())?;
            let realm = binding.realm(args.realm)?;
            km.add_policy(cluster, role, realm, &policy, cancel).await?;
        }
        Some(Change::Detach) => {
            let policy = binding.policy(args.policy_role.as_deref())?;
            let realm = binding.realm(args.realm)?;
            km.remove_policy(cluster, role, realm, &policy, cancel)
                .await?;
        }
        None => {}
    }

    let config = km.read_binding(cluster, role, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_policy(policy: &Policy) -> Result<()> {
    let view = json!({
        "name": policy.name,
        "path": policy.path,
        "payload": policy.payload,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
