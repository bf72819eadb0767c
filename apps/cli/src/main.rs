//! Run a FHIR transaction bundle through the engine against an in-memory
//! store and print the response pairs. Useful for inspecting how a bundle's
//! placeholder references resolve before pointing it at a real server.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use funke_keys::SingleOrigin;
use funke_transaction::{
    Bundle, ExportSettings, MemoryStore, SequentialGenerator, TransactionProcessor,
};

#[derive(Parser)]
#[command(
    name = "fhir-tx",
    about = "Run a FHIR transaction bundle through the funke engine",
    version
)]
struct Cli {
    /// Transaction Bundle JSON file, or "-" for stdin.
    bundle: PathBuf,

    /// JSON array of resources to preload into the in-memory store. Each
    /// needs resourceType and id.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Configuration file (TOML). FUNKE_* environment variables override.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Settings {
    base_url: String,
    absolute_references: bool,
}

impl Settings {
    fn load(path: Option<&Path>) -> Result<Settings> {
        let mut builder = config::Config::builder()
            .set_default("base_url", "http://localhost:8080/fhir")?
            .set_default("absolute_references", false)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("FUNKE"))
            .build()
            .context("failed to load configuration")?;
        Ok(settings.try_deserialize()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    tracing::debug!(?settings, "configuration loaded");

    let bundle_json: serde_json::Value = serde_json::from_str(&read_input(&cli.bundle)?)
        .context("bundle is not valid JSON")?;
    let bundle = Bundle::from_json(bundle_json)?;

    let store = Arc::new(MemoryStore::new());
    if let Some(seed_path) = &cli.seed {
        seed_store(&store, seed_path)?;
        tracing::info!(resources = store.len(), "store seeded");
    }

    let origin = Arc::new(SingleOrigin::new(&settings.base_url)?);
    let processor = TransactionProcessor::new(
        origin,
        Arc::new(SequentialGenerator::default()),
        store.clone(),
    )
    .with_export_settings(ExportSettings {
        absolute_references: settings.absolute_references,
    });

    let results = processor.process_bundle(&bundle, store.as_ref()).await?;

    let rendered: Vec<serde_json::Value> = results
        .iter()
        .map(|(entry, response)| {
            json!({
                "method": entry.method().as_str(),
                "status": response.status.as_u16(),
                "location": entry.key().map(|k| k.to_string()),
                "resource": response.resource,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "results": rendered }))?);

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn seed_store(store: &MemoryStore, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let resources: Vec<serde_json::Value> =
        serde_json::from_str(&raw).context("seed file must be a JSON array of resources")?;

    for resource in resources {
        let resource_type = resource
            .get("resourceType")
            .and_then(|v| v.as_str())
            .context("seed resource is missing resourceType")?
            .to_string();
        let id = resource
            .get("id")
            .and_then(|v| v.as_str())
            .context("seed resource is missing id")?
            .to_string();
        store.insert(&resource_type, &id, resource);
    }
    Ok(())
}
