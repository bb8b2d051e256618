//! schemasync CLI
//!
//! Command-line tool for synchronizing a database with a model file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemasync::prelude::*;

/// Keeps a database schema and its managed data in line with a model.
#[derive(Parser)]
#[command(name = "schemasync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL; overrides the configuration.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the live model and write it as JSON.
    Read {
        /// Output file (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the changes between the live database and a model.
    Diff {
        /// Desired model (JSON).
        #[arg(short, long)]
        model: PathBuf,

        /// Use this model file instead of reading the live database.
        #[arg(long)]
        current: Option<PathBuf>,
    },

    /// Print the SQL script that brings the database in line with a model.
    Script {
        /// Desired model (JSON).
        #[arg(short, long)]
        model: PathBuf,

        /// Use this model file instead of reading the live database.
        #[arg(long)]
        current: Option<PathBuf>,

        /// Output file (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply a model to the live database.
    Migrate {
        /// Desired model (JSON).
        #[arg(short, long)]
        model: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },
}

async fn connect(url: Option<&str>, platform: &PlatformInfo, max_threads: usize) -> anyhow::Result<PgPool> {
    let Some(url) = url else {
        bail!("No database URL: pass --database, set DATABASE_URL or `url` in the configuration");
    };
    if platform.kind != PlatformKind::PostgreSql {
        return Err(DbError::UnsupportedConnection(format!(
            "no built-in {} driver; use --current with a model file",
            platform.name
        ))
        .into());
    }
    let pool = PgPoolOptions::new()
        .max_connections(u32::try_from(max_threads + 1).unwrap_or(u32::MAX))
        .connect(url)
        .await
        .context("Cannot connect to database")?;
    Ok(pool)
}

async fn current_model(
    sync: &Synchronizer,
    current: Option<&Path>,
    desired: &Database,
) -> anyhow::Result<Database> {
    if let Some(path) = current {
        return Ok(load_model(path)?);
    }
    let config = sync.config();
    let pool = connect(config.url.as_deref(), sync.platform(), config.max_threads).await?;
    Ok(sync.read_model(&pool, Some(desired)).await?)
}

fn write_output(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            info!("Written to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if cli.database.is_some() {
        config.url = cli.database.clone();
    }
    let platform = config.resolve_platform(&PlatformRegistry::with_defaults())?;
    info!(platform = %platform.name, "Target platform");
    let sync = Synchronizer::new(platform, config);

    match cli.command {
        Commands::Read { output } => {
            let config = sync.config();
            let pool = connect(config.url.as_deref(), sync.platform(), config.max_threads).await?;
            let model = sync.read_model(&pool, None).await?;
            let json = serde_json::to_string_pretty(&model)?;
            write_output(output.as_deref(), &json)?;
        }

        Commands::Diff { model, current } => {
            let desired = load_model(&model)?;
            let current = current_model(&sync, current.as_deref(), &desired).await?;
            let changes = sync.diff(&current, &desired);
            if changes.is_empty() {
                info!("Database is up to date");
            }
            for change in &changes {
                println!("{}", change.description());
            }
        }

        Commands::Script {
            model,
            current,
            output,
        } => {
            let desired = load_model(&model)?;
            let current = current_model(&sync, current.as_deref(), &desired).await?;
            let plan = sync.plan(&current, &desired)?;
            let script = sync.script(&plan)?;
            write_output(output.as_deref(), &script)?;
        }

        Commands::Migrate { model, dry_run } => {
            let desired = load_model(&model)?;
            let config = sync.config();
            let pool = connect(config.url.as_deref(), sync.platform(), config.max_threads).await?;

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let report = sync.migrate(&pool, &desired, dry_run).await?;

            if dry_run {
                let builder = SqlBuilder::new(sync.platform().clone());
                for sql in &report.statements {
                    println!("{}", builder.terminate(sql));
                }
            }
            for failure in report.warnings() {
                warn!("{failure}");
            }
            let errors: Vec<&ExecutionFailure> = report.errors().collect();
            for failure in &errors {
                eprintln!("{failure}");
                if let Some(sql) = &failure.statement {
                    eprintln!("    {sql}");
                }
            }
            if !errors.is_empty() {
                bail!(
                    "{} of the planned changes failed ({} applied)",
                    errors.len(),
                    report.applied_count
                );
            }
            info!(applied = report.applied_count, "Migration complete");
        }
    }

    Ok(())
}
