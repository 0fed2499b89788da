//! chartgridd: the Chartgrid daemon.
//!
//! `run` keeps the index cache in step with the catalog store until
//! interrupted. The remaining subcommands are one-shot admin operations
//! against the same store.
//!
//! # Usage
//!
//! ```text
//! chartgridd --data-dir /var/lib/chartgrid run
//! chartgridd repo put bitnami --url https://charts.bitnami.com --snapshot index.json
//! chartgridd version action appv-1a2b3c release --operator alice
//! chartgridd release list --namespace default
//! ```

mod catalog;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use chartgrid_core::{ChartgridConfig, Repo, ReleaseStatus, RepoProjection, epoch_secs};
use chartgrid_index::IndexListener;
use chartgrid_lifecycle::CreateVersionRequest;
use chartgrid_release::{ListQuery, OrderBy};
use chartgrid_state::CatalogStore;

use crate::catalog::Catalog;

#[derive(Parser)]
#[command(name = "chartgridd", about = "Chartgrid catalog daemon")]
struct Cli {
    /// Path to chartgrid.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory; overrides `store.path` with `<dir>/catalog.redb`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index repos and follow catalog changes until Ctrl-C.
    Run,
    /// Manage repos.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
    /// Manage application versions.
    Version {
        #[command(subcommand)]
        command: VersionCommand,
    },
    /// Inspect and manage releases.
    Release {
        #[command(subcommand)]
        command: ReleaseCommand,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Create or replace a repo and its index snapshot.
    Put {
        id: String,
        #[arg(long)]
        url: String,
        /// JSON index snapshot file.
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, default_value = "")]
        workspace: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a repo.
    Delete { id: String },
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Apply a lifecycle action (submit, cancel, pass, reject, release, suspend, recover).
    Action {
        version_id: String,
        action: String,
        #[arg(long, default_value = "admin")]
        operator: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Upload a chart package as a new draft version.
    Upload {
        app_id: String,
        /// Gzipped chart archive.
        package: PathBuf,
        #[arg(long, default_value = "")]
        workspace: String,
        #[arg(long, default_value = "admin")]
        operator: String,
    },
    /// List the versions of an application.
    List { app_id: String },
}

#[derive(Subcommand)]
enum ReleaseCommand {
    /// List releases as JSON.
    List {
        #[arg(long, default_value = "")]
        workspace: String,
        #[arg(long, default_value = "")]
        namespace: String,
        #[arg(long, default_value = "")]
        app_id: String,
        #[arg(long, default_value = "")]
        version_id: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long, value_enum, default_value = "last-updated")]
        order_by: Order,
        #[arg(long)]
        reverse: bool,
    },
    /// Record an installer outcome.
    Status {
        namespace: String,
        id: String,
        #[arg(value_enum)]
        status: Status,
        #[arg(long, default_value = "")]
        message: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    LastUpdated,
    CreateTime,
    Name,
}

impl From<Order> for OrderBy {
    fn from(order: Order) -> Self {
        match order {
            Order::LastUpdated => OrderBy::LastUpdated,
            Order::CreateTime => OrderBy::CreateTime,
            Order::Name => OrderBy::Name,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Status {
    Pending,
    Active,
    Upgrading,
    Failed,
}

impl From<Status> for ReleaseStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Pending => ReleaseStatus::Pending,
            Status::Active => ReleaseStatus::Active,
            Status::Upgrading => ReleaseStatus::Upgrading,
            Status::Failed => ReleaseStatus::Failed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let catalog = Catalog::open(config).await?;

    match cli.command {
        Command::Run => run(catalog).await,
        Command::Repo { command } => repo_command(&catalog, command),
        Command::Version { command } => version_command(&catalog, command).await,
        Command::Release { command } => release_command(&catalog, command).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chartgrid=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<ChartgridConfig> {
    let mut config = match path {
        Some(path) => ChartgridConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ChartgridConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.store.path = dir.join("catalog.redb");
    }
    Ok(config)
}

async fn run(catalog: Catalog) -> anyhow::Result<()> {
    info!(
        builtin_repo = %catalog.config.catalog.builtin_repo_id,
        strict_transitions = catalog.config.lifecycle.strict_transitions,
        "Chartgrid daemon starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = IndexListener::new(catalog.cache.clone(), catalog.store.clone());
    let listener_handle = tokio::spawn(async move {
        listener.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = listener_handle.await;

    let stats = catalog.cache.stats().await;
    info!(
        repos = stats.repos,
        applications = stats.applications,
        versions = stats.versions,
        "Chartgrid daemon stopped"
    );
    Ok(())
}

fn repo_command(catalog: &Catalog, command: RepoCommand) -> anyhow::Result<()> {
    match command {
        RepoCommand::Put {
            id,
            url,
            snapshot,
            workspace,
            name,
        } => {
            let raw = std::fs::read_to_string(&snapshot)
                .with_context(|| format!("reading snapshot {}", snapshot.display()))?;
            let now = epoch_secs();
            let existing: Option<Repo> = catalog.store.get(&id)?;
            let repo = Repo {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                workspace,
                url,
                index_snapshot: raw,
                created_at: existing.as_ref().map_or(now, |r| r.created_at),
                updated_at: now,
                resource_version: existing.as_ref().map_or(0, |r| r.resource_version),
                ..existing.clone().unwrap_or_default()
            };
            // Refuse snapshots the index would skip.
            let projection = RepoProjection::from_repo(&repo)?;
            let saved = match existing {
                Some(_) => catalog.store.update(&repo)?,
                None => catalog.store.create(&repo)?,
            };
            info!(
                repo = %saved.id,
                applications = projection.applications.len(),
                resource_version = saved.resource_version,
                "repo stored"
            );
            Ok(())
        }
        RepoCommand::Delete { id } => {
            let removed: Option<Repo> = catalog.store.delete(&id)?;
            anyhow::ensure!(removed.is_some(), "repo not found: {id}");
            info!(repo = %id, "repo deleted");
            Ok(())
        }
    }
}

async fn version_command(catalog: &Catalog, command: VersionCommand) -> anyhow::Result<()> {
    match command {
        VersionCommand::Action {
            version_id,
            action,
            operator,
            message,
        } => {
            let version = catalog
                .lifecycle
                .apply_action(&version_id, &action, &operator, &message)
                .await?;
            println!("{} {}", version.id, version.state());
        }
        VersionCommand::Upload {
            app_id,
            package,
            workspace,
            operator,
        } => {
            let bytes = std::fs::read(&package)
                .with_context(|| format!("reading package {}", package.display()))?;
            let version = catalog.lifecycle.create_version(CreateVersionRequest {
                app_id,
                workspace,
                package: bytes,
                operator,
                message: format!("uploaded {}", package.display()),
            })?;
            println!("{} {}", version.id, version.version);
        }
        VersionCommand::List { app_id } => {
            for version in catalog.lifecycle.list_versions(&app_id).await? {
                println!("{}\t{}\t{}", version.id, version.version, version.state());
            }
        }
    }
    Ok(())
}

async fn release_command(catalog: &Catalog, command: ReleaseCommand) -> anyhow::Result<()> {
    match command {
        ReleaseCommand::List {
            workspace,
            namespace,
            app_id,
            version_id,
            limit,
            offset,
            order_by,
            reverse,
        } => {
            let query = ListQuery {
                workspace,
                namespace,
                app_id,
                version_id,
                limit,
                offset,
                order_by: order_by.into(),
                reverse,
                app_store_view: false,
            };
            let list = catalog.releases.list_releases(&query).await?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        ReleaseCommand::Status {
            namespace,
            id,
            status,
            message,
        } => {
            let release = catalog
                .releases
                .set_status(&namespace, &id, status.into(), &message)?;
            println!("{} {}", release.id, release.status);
        }
    }
    Ok(())
}
