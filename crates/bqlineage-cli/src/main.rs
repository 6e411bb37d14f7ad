use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bqlineage_core::{LineageConfig, LineageMap, LineageReport, QueryEvent, TableReference};
use bqlineage_engine::{LineageMapBuilder, UpstreamResolver};
use bqlineage_external::{ExternalLineageResolver, SchemaLookup, StaticSchemaLookup};

/// bqlineage - Lineage reconstruction for BigQuery audit logs
#[derive(Parser)]
#[command(name = "bqlineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: bqlineage.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the lineage map from audit events
    Map {
        /// Audit events, one JSON object per line
        #[arg(short, long)]
        events: PathBuf,
    },

    /// Show the upstream lineage of one table
    Resolve {
        /// Audit events, one JSON object per line
        #[arg(short, long)]
        events: PathBuf,

        /// Table as `project.dataset.table` or `projects/p/datasets/d/tables/t`
        #[arg(short, long)]
        table: String,
    },

    /// Show the lineage of an external table over object storage
    External {
        /// URN of the external table
        #[arg(short, long)]
        dataset_urn: String,

        /// Source URIs of the external table
        #[arg(short, long = "uri", required = true)]
        uris: Vec<String>,

        /// Schemas of the storage tables, keyed by path
        #[arg(short, long)]
        schemas: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;
    config.validate()?;

    let mut report = LineageReport::new();

    let result = match cli.command {
        Commands::Map { events } => map_command(&config, &events, &mut report),
        Commands::Resolve { events, table } => resolve_command(&config, &events, &table, &mut report),
        Commands::External {
            dataset_urn,
            uris,
            schemas,
        } => external_command(&config, &dataset_urn, &uris, schemas.as_deref(), &mut report).await,
    };

    if cli.verbose {
        print_report_summary(&report)?;
    }

    result
}

/// Install the stderr log subscriber
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

/// Config from `--config`, else `bqlineage.toml`, else defaults
fn load_config(path: Option<&Path>, verbose: bool) -> Result<LineageConfig> {
    let default_path = Path::new("bqlineage.toml");

    let config = if let Some(config_path) = path {
        LineageConfig::from_file(config_path)?
    } else if default_path.exists() {
        LineageConfig::from_file(default_path)?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        LineageConfig::default()
    };

    if verbose {
        eprintln!(
            "{} env: {}, column lineage: {}",
            "Using".cyan(),
            config.env,
            config.extract_column_lineage
        );
    }

    Ok(config)
}

/// Map command - print the lineage map
fn map_command(config: &LineageConfig, events: &Path, report: &mut LineageReport) -> Result<()> {
    let map = build_map(config, events, report)?;

    println!("{}", map.to_json()?);

    eprintln!(
        "{} {} tables, {} edges",
        "✓ Built lineage map:".green(),
        map.len(),
        map.edge_count()
    );

    Ok(())
}

/// Resolve command - print one table's upstream record
fn resolve_command(
    config: &LineageConfig,
    events: &Path,
    table: &str,
    report: &mut LineageReport,
) -> Result<()> {
    let target = TableReference::parse(table)?;
    let map = build_map(config, events, report)?;

    match UpstreamResolver::from_config(config).resolve(&target, &map) {
        Some(record) => println!("{}", record.to_json()?),
        None => eprintln!("{} {}", "No lineage found for".yellow(), target.to_dotted()),
    }

    Ok(())
}

/// External command - print an external table's upstream record
async fn external_command(
    config: &LineageConfig,
    dataset_urn: &str,
    uris: &[String],
    schemas: Option<&Path>,
    report: &mut LineageReport,
) -> Result<()> {
    let resolver = ExternalLineageResolver::from_config(config)?;

    let lookup = schemas
        .map(StaticSchemaLookup::from_json_file)
        .transpose()
        .context("Failed to load schemas")?;

    let record = resolver
        .resolve(
            dataset_urn,
            uris,
            lookup.as_ref().map(|l| l as &dyn SchemaLookup),
            report,
        )
        .await;

    match record {
        Some(record) => println!("{}", record.to_json()?),
        None => eprintln!("{} {}", "No storage lineage found for".yellow(), dataset_urn),
    }

    Ok(())
}

/// Stream events from a JSON-lines file into the map builder
fn build_map(config: &LineageConfig, events: &Path, report: &mut LineageReport) -> Result<LineageMap> {
    let file = File::open(events)
        .with_context(|| format!("Failed to open events file {}", events.display()))?;

    let builder = LineageMapBuilder::from_config(config)?;

    let events = BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(|(index, line)| read_event(index + 1, line));

    Ok(builder.build(events, report))
}

/// Parse one line, skipping blank and malformed ones
fn read_event(line_number: usize, line: std::io::Result<String>) -> Option<QueryEvent> {
    let line = match line {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(line = line_number, error = %e, "Failed to read event");
            return None;
        }
    };

    if line.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(&line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(line = line_number, error = %e, "Skipping malformed event");
            None
        }
    }
}

/// Print the run report to stderr
fn print_report_summary(report: &LineageReport) -> Result<()> {
    eprintln!("\n{}", "=".repeat(60).bright_blue());
    eprintln!("{}", "Lineage Run Report".bold().bright_blue());
    eprintln!("{}", "=".repeat(60).bright_blue());

    eprintln!("{}", report.to_json()?);

    if report.has_warnings() {
        eprintln!("{}", "⚠ Some lineage was degraded, see samples above".yellow().bold());
    } else {
        eprintln!("{}", "✓ No issues found!".green().bold());
    }

    eprintln!("{}", "=".repeat(60).bright_blue());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn external_requires_a_uri() {
        let parsed = Cli::try_parse_from(["bqlineage", "external", "--dataset-urn", "urn"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "bqlineage",
            "external",
            "--dataset-urn",
            "urn",
            "--uri",
            "gs://a/b/*.csv",
            "--uri",
            "gs://a/c/*.csv",
        ])
        .unwrap();
        assert!(matches!(parsed.command, Commands::External { uris, .. } if uris.len() == 2));
    }

    #[test]
    fn events_file_streams_into_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"timestamp":"2024-01-01T00:00:00Z","statement_type":"INSERT","query_text":"","referenced_tables":["p.d.src"],"destination_table":"p.d.dest"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();

        let mut report = LineageReport::new();
        let map = build_map(&LineageConfig::default(), file.path(), &mut report).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(report.num_total_lineage_entries, 1);
    }
}
