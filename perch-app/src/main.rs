use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use perch_common::observability::{LogConfig, init_logging};
use perch_config::{PerchConfig, PerchConfigLoader, SinkConfig};
use perch_ingest::store::PostStore;
use tracing::{error, info};
use wiring::{Overrides, SinkKind, build_pipeline, load_config};
mod wiring;

const DEFAULT_CONFIG_FILE: &str = "perch.yaml";

#[derive(Debug, Parser)]
#[command(name = "perch", version, about = "Timeline ingestion into SQLite or daily JSON snapshots")]
struct Cli {
    /// Config file; `perch.yaml` in the working directory is used if present.
    #[arg(long, short, env = "PERCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch one page, normalize it and persist it.
    Run(RunArgs),
    /// Create the relational schema and exit.
    InitDb {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,
    /// Read raw items from a JSON dump instead of the timeline API.
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    count: Option<u32>,
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

impl From<&RunArgs> for Overrides {
    fn from(args: &RunArgs) -> Self {
        Overrides {
            sink: args.sink,
            database_url: args.database_url.clone(),
            snapshot_dir: args.snapshot_dir.clone(),
            input: args.input.clone(),
            count: args.count,
        }
    }
}

fn config_loader(path: Option<&PathBuf>) -> PerchConfigLoader {
    match path {
        Some(p) => PerchConfigLoader::new().with_file(p),
        None => PerchConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::InitDb { database_url } => {
            let url = match database_url {
                Some(url) => url,
                None => match load_config(config_loader(cli.config.as_ref()), &Overrides::default())?
                    .sink
                {
                    SinkConfig::Sqlite { database_url } => database_url,
                    SinkConfig::Snapshot { .. } => {
                        bail!("init-db needs --database-url or a sqlite sink in the config")
                    }
                },
            };
            PostStore::connect(&url).await?;
            println!("schema ready: {url}");
            Ok(())
        }
        Command::Run(args) => {
            let cfg: PerchConfig =
                load_config(config_loader(cli.config.as_ref()), &Overrides::from(&args))?;

            let log_path = init_logging(LogConfig {
                log_dir: cfg.logging.dir.clone(),
                emit_stderr: cfg.logging.stderr,
                format: cfg.logging.format,
                ..LogConfig::default()
            })?;
            info!(log = %log_path.display(), "perch.start");

            let pipeline = build_pipeline(&cfg).await?;
            let report = match pipeline.run().await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "perch.run.failed");
                    return Err(e.into());
                }
            };

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "fetched {} normalized {} persisted {} skipped {} ({})",
                    report.fetched,
                    report.normalized,
                    report.persist.persisted,
                    report.persist.skipped,
                    report.persist.sink,
                );
                if let Some(total) = report.persist.total {
                    println!("snapshot now holds {total} posts");
                }
            }
            Ok(())
        }
    }
}
