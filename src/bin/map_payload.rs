//! Map a JSON payload file through a configured model and print the result
//!
//! Usage: `map_payload <model> <payload.json> [--find <id>] [--config <path>]`
//!
//! With `--find`, the payload is preloaded into the model's identity cache
//! and the record is looked up by id instead of mapped directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use record_mapper::{Adapter, HttpAdapter, MapperConfig, MemoryAdapter, Registry};

/// Default configuration path
const DEFAULT_CONFIG_PATH: &str = "config/record_mapper.yaml";

#[derive(Parser, Debug)]
#[command(name = "map_payload")]
#[command(about = "Map a JSON payload through a configured model", long_about = None)]
struct Args {
    /// Model name from the config
    model: String,

    /// JSON payload file
    payload: PathBuf,

    /// Preload the payload and look up this id
    #[arg(long)]
    find: Option<String>,

    /// Mapper config file
    #[arg(long, env = "RECORD_MAPPER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Numeric ids are looked up as numbers, anything else as a string
fn parse_id(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(|v| v.is_number())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_mapper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    tracing::info!(path = %args.config.display(), "Loading configuration");

    let config = MapperConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing::info!(models = config.models.len(), "Configuration loaded");

    let adapter: Arc<dyn Adapter> = match &config.http {
        Some(_) => Arc::new(HttpAdapter::from_config(&config)?),
        None => Arc::new(MemoryAdapter::new()),
    };
    let registry = Registry::from_config(&config, adapter)?;
    let model = registry.model(&args.model)?;

    let raw = std::fs::read_to_string(&args.payload)
        .with_context(|| format!("reading {}", args.payload.display()))?;
    let payload: Value = serde_json::from_str(&raw)?;

    let mapped = match &args.find {
        Some(id) => {
            model.preload(payload);
            model.find(parse_id(id)).await?
        }
        None => model.apply_mapping(payload)?,
    };

    println!("{}", serde_json::to_string_pretty(&mapped.to_value())?);
    Ok(())
}
