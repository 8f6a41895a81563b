//! CLI argument parsing and command dispatch

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

use repo_sync::{
    app::AppServices,
    config::{AppConfig, ConfigLoader},
    db,
    notify::BufferedMessenger,
    reconciler::ReconcileReport,
    repositories::OwnerDirectory,
    secrets::Credential,
    server::run_server,
    telemetry,
};

/// Repository Sync - reconcile owners' declared repository URLs into records
#[derive(Parser, Debug)]
#[command(name = "repo-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Plan changes without writing, overriding the configured default
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API with the queue worker and scheduler
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Reconcile one owner, or every owner when --uid is omitted
    #[command(alias = "ur")]
    UpdateRepositories(UpdateArgs),
    /// Check repository URLs without storing anything
    Validate(ValidateArgs),
    /// Run the queue worker and scheduler without the HTTP API
    Work,
    /// Store an encrypted provider credential
    SetCredential(CredentialArgs),
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Owner to reconcile
    #[arg(long)]
    uid: Option<i64>,
    /// Enqueue jobs instead of reconciling inline
    #[arg(long)]
    queue: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Submitting owner, used for the uniqueness check
    #[arg(long)]
    uid: i64,
    /// URLs to check
    #[arg(required = true)]
    urls: Vec<String>,
}

#[derive(Args, Debug)]
struct CredentialArgs {
    /// Provider id, e.g. github or gitlab
    provider: String,
    #[arg(long)]
    token: String,
    #[arg(long)]
    username: Option<String>,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        if let Commands::UpdateRepositories(UpdateArgs { uid: Some(uid), .. })
        | Commands::Validate(ValidateArgs { uid, .. }) = &self.command
        {
            check_uid(*uid)?;
        }

        let config = ConfigLoader::new().load().context("loading configuration")?;
        telemetry::init_tracing(&config).context("initializing tracing")?;
        let dry_run = self.dry_run || config.dry_run;

        let db = db::init_pool(&config)
            .await
            .context("initializing database connection pool")?;
        db::migrate(&db).await.context("applying migrations")?;

        match self.command {
            Commands::Serve => {
                config.require_operator_tokens()?;
                run_server(config, db).await
            }
            Commands::Migrate => {
                println!("Migrations applied.");
                Ok(())
            }
            Commands::UpdateRepositories(args) => {
                let services = AppServices::build(&config, Arc::new(db))?;
                update_repositories(&services, args, dry_run).await
            }
            Commands::Validate(args) => {
                let services = AppServices::build(&config, Arc::new(db))?;
                validate(&services, args).await
            }
            Commands::Work => work(&config, db).await,
            Commands::SetCredential(args) => {
                let services = AppServices::build(&config, Arc::new(db))?;
                let mut credential = Credential::token(args.token);
                if let Some(username) = args.username {
                    credential = credential.with_username(username);
                }
                services
                    .credentials
                    .store(&args.provider, &credential)
                    .await?;
                println!("Credential stored for {}.", args.provider);
                Ok(())
            }
        }
    }
}

fn check_uid(uid: i64) -> Result<()> {
    if uid == 0 {
        bail!("You may not use the anonymous owner.");
    }
    if uid < 0 {
        bail!("Owner ids are positive integers.");
    }
    Ok(())
}

async fn update_repositories(services: &AppServices, args: UpdateArgs, dry_run: bool) -> Result<()> {
    let Some(uid) = args.uid else {
        if args.queue {
            let owners = services.owners.reconcilable_owners().await?;
            let enqueued = services.jobs.enqueue_many(&owners, dry_run).await?;
            println!("Enqueued {enqueued} reconcile job(s).");
            return Ok(());
        }

        let summary = services.driver.reconcile_all(dry_run).await?;
        println!(
            "{} owner(s): {} created, {} updated, {} deleted, {} planned.",
            summary.owners, summary.created, summary.updated, summary.deleted, summary.planned
        );
        for failure in &summary.failed_owners {
            eprintln!("Owner {} failed: {}", failure.owner_id, failure.error);
        }
        if !summary.failed_owners.is_empty() || summary.record_failures > 0 {
            bail!("Some repositories could not be updated.");
        }
        return Ok(());
    };

    if !services.owners.owner_exists(uid).await? {
        bail!("Owner does not exist.");
    }

    if args.queue {
        let (job, _) = services.jobs.enqueue(uid, dry_run).await?;
        println!("Reconcile job {} queued.", job.id);
        return Ok(());
    }

    let report = services.driver.reconcile_one(uid, dry_run).await?;
    print_report(&report);
    if report.has_failures() {
        bail!("Some repositories could not be updated.");
    }
    if !dry_run {
        println!("Repositories updated.");
    }
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    for change in &report.planned {
        println!("{} {} ({})", change.action, change.key, change.source);
    }
    for failure in &report.failures {
        eprintln!(
            "{} failed: {}",
            failure.key.as_deref().unwrap_or("phase"),
            failure.error
        );
    }
}

async fn validate(services: &AppServices, args: ValidateArgs) -> Result<()> {
    let messenger = Arc::new(BufferedMessenger::new());
    let report = services
        .validator
        .with_messenger(messenger.clone())
        .validate_urls(&args.urls, args.uid)
        .await?;

    for message in messenger.errors() {
        eprintln!("{message}");
    }
    for metadata in &report.accepted {
        println!("ok {} ({})", metadata.key, metadata.url);
    }
    if !report.is_valid() {
        bail!(report.summary());
    }
    Ok(())
}

async fn work(config: &AppConfig, db: DatabaseConnection) -> Result<()> {
    let services = AppServices::build(config, Arc::new(db))?;
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(services.queue_worker(config).run(shutdown.clone()));
    let scheduler = tokio::spawn(services.scheduler(config).run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    let _ = tokio::join!(worker, scheduler);
    Ok(())
}
