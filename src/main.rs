//! # Geo Harvester CLI (`geoharvest`)
//!
//! ## Usage
//!
//! ```bash
//! geoharvest [--config ./config/geoharvest.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `geoharvest ping` | Print `pong` |
//! | `geoharvest harvest mit` | Zipped GIS packages from the restricted CDN |
//! | `geoharvest harvest ogm` | OpenGeoMetadata repositories |
//! | `geoharvest harvest alma` | Alma MARC exports |
//!
//! ## Examples
//!
//! ```bash
//! # Drain the MIT queue and write to the public CDN
//! geoharvest harvest mit \
//!     --output-source-directory s3://cdn-origin/cdn/geo/public/ \
//!     --output-normalized-directory s3://cdn-origin/cdn/geo/public/
//!
//! # Everything changed in OGM since March, as JSON lines
//! geoharvest harvest --from-date 2024-03-01 --output-file out/ogm.jsonl ogm
//!
//! # Full Alma harvest from a local export directory
//! geoharvest harvest --harvest-type full alma --input-files exports/
//! ```
//!
//! Logs go to stderr (`RUST_LOG` honoured); the report goes to stdout.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geo_harvester::aws::AwsCredentials;
use geo_harvester::config::{self, Config};
use geo_harvester::eventbridge::EventBridgePublisher;
use geo_harvester::harvest::{HarvestError, Harvester, Notifier, OutputFile, Outputs};
use geo_harvester::provider_alma::AlmaProvider;
use geo_harvester::provider_mit::MitProvider;
use geo_harvester::provider_ogm::OgmProvider;
use geo_harvester::report::HarvestReport;
use geo_harvester::sqs::SqsQueue;
use geo_harvester::storage::StoreRoot;
use geo_harvester_core::changes::{ChangeSetProvider, DateWindow, HarvestMode, PreconditionError};
use geo_harvester_core::io::Queue;
use geo_harvester_core::{Normalizer, ResolveEnv};

/// Geo Harvester: harvest and normalize geospatial metadata.
#[derive(Parser)]
#[command(
    name = "geoharvest",
    about = "Geo Harvester: harvest geospatial metadata and normalize it to one schema",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/geoharvest.toml` when that file exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging for the harvester crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the binary runs.
    Ping,

    /// Harvest one origin.
    Harvest(HarvestArgs),
}

#[derive(Args)]
struct HarvestArgs {
    /// `full` or `incremental`.
    #[arg(long, default_value = "incremental")]
    harvest_type: HarvestMode,

    /// Only changes on or after this date (YYYY-MM-DD).
    #[arg(long)]
    from_date: Option<NaiveDate>,

    /// Only changes before this date (YYYY-MM-DD).
    #[arg(long)]
    until_date: Option<NaiveDate>,

    /// Write one JSON line per normalized record here (path or s3:// URI).
    #[arg(long)]
    output_file: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    origin: OriginCommand,
}

#[derive(Subcommand)]
enum OriginCommand {
    /// Zipped GIS packages in the restricted CDN.
    Mit {
        /// Where zip packages are listed for a full harvest. Defaults to the
        /// restricted CDN root.
        #[arg(long)]
        input_files: Option<String>,

        /// Write each record's source metadata file here.
        #[arg(long)]
        output_source_directory: Option<String>,

        /// Write each record's normalized metadata file here.
        #[arg(long)]
        output_normalized_directory: Option<String>,

        /// SQS queue of S3 object events.
        #[arg(long)]
        sqs_topic_name: Option<String>,

        /// Leave queue messages in place after processing.
        #[arg(long)]
        preserve_sqs_messages: bool,

        /// Do not publish EventBridge events.
        #[arg(long)]
        skip_eventbridge_events: bool,
    },

    /// OpenGeoMetadata repositories.
    Ogm {
        /// Only these repositories (comma separated).
        #[arg(long, value_delimiter = ',')]
        include_repositories: Vec<String>,

        /// Skip these repositories (comma separated).
        #[arg(long, value_delimiter = ',')]
        exclude_repositories: Vec<String>,
    },

    /// Alma MARC XML exports.
    Alma {
        /// Directory or s3:// prefix holding the export files.
        #[arg(long)]
        input_files: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,geo_harvester=debug,geo_harvester_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Ping => {
            println!("pong");
        }
        Commands::Harvest(args) => {
            let cfg = config::load_config(cli.config.as_deref())?;
            let json = args.json;
            let report = run_harvest(&cfg, args).await?;
            if json {
                println!("{}", report.to_json_pretty()?);
            } else {
                print!("{}", report);
            }
        }
    }

    Ok(())
}

async fn run_harvest(cfg: &Config, args: HarvestArgs) -> Result<HarvestReport> {
    let mode = args.harvest_type;
    let window = DateWindow::new(args.from_date, args.until_date);
    if let (Some(from), Some(until)) = (window.from, window.until) {
        if from >= until {
            return Err(HarvestError::Precondition(PreconditionError::InvalidWindow(format!(
                "--from-date {} must be before --until-date {}",
                from, until
            )))
            .into());
        }
    }

    let mut outputs = Outputs::default();
    if let Some(uri) = &args.output_file {
        let (root, key) = StoreRoot::open_file(uri, &cfg.aws)?;
        outputs.output_file = Some(OutputFile { root, key });
    }

    let provider: Box<dyn ChangeSetProvider> = match args.origin {
        OriginCommand::Mit {
            input_files,
            output_source_directory,
            output_normalized_directory,
            sqs_topic_name,
            preserve_sqs_messages,
            skip_eventbridge_events,
        } => {
            let (restricted, public) = cfg.require_cdn_roots().map_err(HarvestError::Precondition)?;
            let archive_uri = match mode {
                HarvestMode::Full => input_files.as_deref().unwrap_or(restricted),
                HarvestMode::Incremental => restricted,
            };
            let archives = StoreRoot::open(archive_uri, &cfg.aws)?;

            let queue: Option<Arc<dyn Queue>> = match sqs_topic_name.or_else(|| cfg.mit.queue_name.clone()) {
                Some(name) => Some(Arc::new(SqsQueue::new(
                    name,
                    &cfg.aws,
                    &cfg.mit,
                    AwsCredentials::from_env()?,
                )) as Arc<dyn Queue>),
                None if mode == HarvestMode::Incremental => {
                    return Err(HarvestError::Precondition(PreconditionError::MissingSetting(
                        "GEOHARVESTER_SQS_TOPIC_NAME".into(),
                    ))
                    .into());
                }
                None => {
                    warn!("no queue configured; skipping the pending-message check");
                    None
                }
            };

            if let Some(uri) = &output_source_directory {
                outputs.source_mirror = Some(StoreRoot::open(uri, &cfg.aws)?);
            }
            if let Some(uri) = &output_normalized_directory {
                outputs.normalized_mirror = Some(StoreRoot::open(uri, &cfg.aws)?);
            }
            if skip_eventbridge_events {
                info!("EventBridge events will not be sent");
            } else {
                let publisher = EventBridgePublisher::new(&cfg.aws, AwsCredentials::from_env()?);
                outputs.notifier = Some(Notifier::new(Arc::new(publisher), public)?);
            }

            Box::new(
                MitProvider::new(archives, queue)
                    .with_max_messages(cfg.mit.max_messages)
                    .preserve_messages(preserve_sqs_messages),
            )
        }
        OriginCommand::Ogm {
            include_repositories,
            exclude_repositories,
        } => Box::new(OgmProvider::new(
            &cfg.ogm,
            &include_repositories,
            &exclude_repositories,
        )?),
        OriginCommand::Alma { input_files } => {
            cfg.require_cdn_roots().map_err(HarvestError::Precondition)?;
            let uri = input_files
                .or_else(|| cfg.alma.input_files.clone())
                .ok_or_else(|| anyhow!("alma harvest requires --input-files"))?;
            Box::new(AlmaProvider::new(StoreRoot::open(&uri, &cfg.aws)?))
        }
    };

    let normalizer = Normalizer::new(ResolveEnv::new(cfg.cdn.http_root.clone(), Utc::now()));
    let mut harvester = Harvester::new(provider, normalizer, outputs);
    Ok(harvester.run(mode, window).await?)
}
