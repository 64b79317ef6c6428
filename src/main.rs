use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use facility_network::{
    export_clusters, load_facilities, load_financials_csv, render_report, write_json_export,
    AnalysisConfig, NetworkAnalyzer, SortKey,
};

const USAGE: &str = "\
Usage:
  facility-network analyze <facilities.csv|json> <financials.csv> [options]
  facility-network stats <facilities.csv|json> <financials.csv> [--config FILE]

Options:
  --config FILE     JSON config (thresholds, signal weights)
  --min-size N      Smallest cluster to list (default: from config)
  --sort KEY        revenue | count | risk (default: revenue)
  --top N           Clusters shown in the report (default: 25)
  --json FILE       Also write ranked clusters as JSON";

/// Parsed command line
struct Options {
    command: String,
    facilities: PathBuf,
    financials: PathBuf,
    config: Option<PathBuf>,
    min_size: Option<usize>,
    sort: SortKey,
    top: usize,
    json: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    if args.len() < 4 {
        bail!("Missing arguments\n\n{}", USAGE);
    }

    let mut options = Options {
        command: args[1].clone(),
        facilities: PathBuf::from(&args[2]),
        financials: PathBuf::from(&args[3]),
        config: None,
        min_size: None,
        sort: SortKey::Revenue,
        top: 25,
        json: None,
    };

    let mut rest = args[4..].iter();
    while let Some(flag) = rest.next() {
        let value = rest
            .next()
            .with_context(|| format!("Missing value for {}", flag))?;

        match flag.as_str() {
            "--config" => options.config = Some(PathBuf::from(value)),
            "--min-size" => {
                options.min_size = Some(value.parse().context("--min-size expects a number")?)
            }
            "--sort" => options.sort = value.parse().map_err(anyhow::Error::msg)?,
            "--top" => options.top = value.parse().context("--top expects a number")?,
            "--json" => options.json = Some(PathBuf::from(value)),
            other => bail!("Unknown option: {}\n\n{}", other, USAGE),
        }
    }

    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args)?;

    match options.command.as_str() {
        "analyze" => run_analyze(&options),
        "stats" => run_stats(&options),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn load_config(options: &Options) -> Result<AnalysisConfig> {
    match &options.config {
        Some(path) => AnalysisConfig::from_file(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn run_analyze(options: &Options) -> Result<()> {
    let config = load_config(options)?;
    let min_size = options.min_size.unwrap_or(config.min_cluster_size);

    let facilities = load_facilities(&options.facilities)?;
    let financials = load_financials_csv(&options.financials)?;

    let analysis = NetworkAnalyzer::new(config)
        .analyze(&facilities, &financials)
        .context("Facility list violates the input contract")?;

    let report = render_report(&analysis, min_size, options.sort, options.top)
        .context("Failed to render report")?;
    println!("{}", report);

    if let Some(path) = &options.json {
        let export = export_clusters(&analysis, min_size, options.sort, None);
        write_json_export(&export, path)?;
        println!("✓ Saved {} clusters to {:?}", export.clusters.len(), path);
    }

    Ok(())
}

fn run_stats(options: &Options) -> Result<()> {
    let config = load_config(options)?;

    let facilities = load_facilities(&options.facilities)?;
    let financials = load_financials_csv(&options.financials)?;

    let analysis = NetworkAnalyzer::new(config)
        .analyze(&facilities, &financials)
        .context("Facility list violates the input contract")?;

    let stats = serde_json::to_string_pretty(analysis.stats())
        .context("Failed to serialize dataset stats")?;
    println!("{}", stats);

    Ok(())
}
