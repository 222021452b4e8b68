//! script_runner - Run a script filter over a batch of readings.
//!
//! Loads a filter the way the pipeline host would (configuration category,
//! script directory, backend) and prints the filtered readings.
//!
//! # Usage
//!
//! ```bash
//! # Filter readings with the script named in the category
//! script_runner --category lab.json --input readings.json --data-dir /usr/local/data
//!
//! # Python backend, settings from a TOML file
//! script_runner --category lab.json --input readings.json \
//!   --settings script_filter.toml --backend python
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use script_filter::config::{ConfigCategory, FilterSettings};
use script_filter::scripting::ScriptBackend;
use script_filter::{logging, FilterPlugin, Reading};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "script_runner")]
#[command(about = "Run a script filter over a batch of readings")]
#[command(version)]
struct Cli {
    /// Configuration category (JSON object of items)
    #[arg(short = 'c', long)]
    category: PathBuf,

    /// Readings to filter (JSON array)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Settings file (TOML)
    #[arg(short = 's', long)]
    settings: Option<PathBuf>,

    /// Data directory; scripts are imported from <data-dir>/scripts
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,

    /// Scripting backend: rhai, python
    #[arg(short = 'b', long, value_parser = parse_backend)]
    backend: Option<ScriptBackend>,

    /// Filter instance name
    #[arg(short = 'n', long, default_value = "script_runner")]
    name: String,
}

fn parse_backend(s: &str) -> Result<ScriptBackend, String> {
    match s.to_lowercase().as_str() {
        "rhai" => Ok(ScriptBackend::Rhai),
        "python" => Ok(ScriptBackend::Python),
        other => Err(format!(
            "Invalid backend: '{}'. Use 'rhai' or 'python'",
            other
        )),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => FilterSettings::load_from(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => FilterSettings::load().context("Failed to load settings")?,
    };
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }

    logging::init(&settings.log_level);
    debug!(?settings, "Settings loaded");

    let category_json = std::fs::read_to_string(&cli.category)
        .with_context(|| format!("Failed to read category: {}", cli.category.display()))?;
    let category = ConfigCategory::new(cli.name.clone(), &category_json)
        .with_context(|| format!("Invalid category: {}", cli.category.display()))?;

    let input = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read readings: {}", cli.input.display()))?;
    let readings: Vec<Reading> = serde_json::from_str(&input)
        .with_context(|| format!("Invalid readings: {}", cli.input.display()))?;

    let plugin = FilterPlugin::init(&cli.name, category, &settings)
        .context("Failed to initialise filter")?;
    if !plugin.filter().is_enabled() {
        eprintln!(
            "Filter '{}' is {} and disabled; readings pass through unchanged",
            cli.name,
            plugin.filter().phase()
        );
    }

    let count = readings.len();
    let filtered = plugin.ingest(readings);
    debug!(readings_in = count, readings_out = filtered.len(), "Batch filtered");

    if count > 0 && filtered.is_empty() && plugin.filter().is_enabled() {
        eprintln!("Transform produced no readings");
    }

    let output = serde_json::to_string_pretty(&filtered).context("Failed to serialise readings")?;
    println!("{}", output);

    plugin.shutdown();
    Ok(())
}
