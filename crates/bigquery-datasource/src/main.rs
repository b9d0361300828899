use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use bigquery_datasource::config;
use bigquery_datasource::observability::init_observability;
use bigquery_datasource::{
    Datasource, DatasetsArgs, InstanceSettings, ProjectsArgs, ValidateQueryArgs,
    headers_as_labels,
};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "bigquery-datasource")]
#[command(about = "Exercise the BigQuery data source connection layer", long_about = None)]
#[command(version)]
struct Args {
    /// Instance settings JSON (id, jsonData, decryptedSecureJsonData)
    #[arg(short, long, env = "BQDS_SETTINGS")]
    settings: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a connection, optionally running a query over it
    Connect {
        /// Per-query overrides, e.g. '{"location":"EU","dataset":"logs"}'
        #[arg(long)]
        args: Option<String>,

        /// SQL to run once connected
        #[arg(long)]
        sql: Option<String>,

        /// Request header attached as a job label (repeatable, NAME=VALUE)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// List datasets in a location
    Datasets {
        #[arg(long)]
        project: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    /// List tables of a dataset
    Tables {
        #[arg(long)]
        project: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        dataset: String,
    },
    /// Dry-run a query
    Validate {
        #[arg(long)]
        project: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long)]
        sql: String,
    },
    /// List projects visible to the data source identity
    Projects,
    /// Show the job labels derived from request headers
    Labels {
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}

fn header_map(headers: Vec<(String, String)>) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        map.entry(name).or_default().push(value);
    }
    map
}

fn read_settings(path: Option<&PathBuf>) -> anyhow::Result<InstanceSettings> {
    let path = path.context("--settings is required for this command")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration with precedence: env > file > defaults
    let mut builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path)?
    } else {
        config::load_config()?
    };

    if args.verbose {
        builder = builder.log_level("debug".to_string());
    }
    if args.json_logs {
        builder = builder.json_logs(true);
    }

    let config = builder.build();
    init_observability(&config.telemetry)?;

    if let Command::Labels { headers } = args.command {
        return emit(&headers_as_labels(&header_map(headers)));
    }

    let instance = read_settings(args.settings.as_ref())?;
    let datasource = Datasource::builder().with_config(config).build()?;

    tracing::info!(
        datasource_id = instance.id,
        single_flight = datasource.config().single_flight(),
        "Data source ready"
    );

    match args.command {
        Command::Connect { args, sql, headers } => {
            let db = datasource.connect(&instance, args.as_deref()).await?;
            tracing::info!(
                project = %db.settings().project,
                location = %db.settings().location,
                "Connected"
            );
            if let Some(sql) = sql {
                let resp = db.query(&sql, &header_map(headers)).await?;
                emit(&resp)?;
            }
        }
        Command::Datasets { project, location } => {
            let datasets = datasource
                .datasets(&instance, &DatasetsArgs { project, location })
                .await?;
            emit(&datasets)?;
        }
        Command::Tables {
            project,
            location,
            dataset,
        } => {
            let options = HashMap::from([
                ("project".to_string(), project),
                ("location".to_string(), location),
                ("dataset".to_string(), dataset),
            ]);
            emit(&datasource.tables(&instance, &options).await?)?;
        }
        Command::Validate {
            project,
            location,
            sql,
        } => {
            let resp = datasource
                .validate_query(
                    &instance,
                    &ValidateQueryArgs {
                        project,
                        location,
                        query: sql,
                    },
                )
                .await?;
            emit(&resp)?;
        }
        Command::Projects => {
            // The resource manager is registered on first connect.
            datasource.connect(&instance, None).await?;
            let projects = datasource
                .projects(&ProjectsArgs {
                    datasource_id: instance.identity(),
                })
                .await?;
            emit(&projects)?;
        }
        Command::Labels { .. } => {}
    }

    for (name, stats) in datasource.cache().stats() {
        tracing::debug!(
            cache = name,
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.entries,
            "Cache statistics"
        );
    }

    #[cfg(feature = "metrics")]
    tracing::debug!(
        "{}",
        bigquery_datasource::observability::render_metrics()
    );

    Ok(())
}
