use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use stand_scout::config::AppConfig;
use stand_scout::persist::write_json;
use stand_scout::pipeline::{load_references, resolve_tool_path, Pipeline};

#[derive(Parser)]
#[command(
    name = "stand-scout",
    version,
    about = "Vehicle-listing extraction pipeline driving headless Chrome"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect detail links from a search-results page
    Links {
        /// Search-results page to read (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
        /// Cap on the number of cards processed
        #[arg(long)]
        limit: Option<usize>,
        /// Output artifact; relative paths resolve against the binary
        #[arg(long, default_value = "car_links.json")]
        out: PathBuf,
    },
    /// Extract structured details for one listing or a batch file
    Details {
        /// Single listing URL (overrides --file)
        #[arg(long)]
        url: Option<String>,
        /// Batch input: JSON array of URLs or object whose values are URLs
        #[arg(long, default_value = "car_links.json")]
        file: PathBuf,
        /// Cap on the number of listings processed
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "car_details.json")]
        out: PathBuf,
    },
    /// Harvest carousel images for the first cards of a search page
    Images {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "car_images.json")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stand_scout=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Details { url, file, limit, out } => {
            let limit = limit.filter(|n| *n > 0);
            let urls = match url {
                Some(url) => vec![url],
                None => {
                    let path = resolve_tool_path(&file);
                    let mut urls = load_references(&path)?;
                    if let Some(limit) = limit {
                        urls.truncate(limit);
                    }
                    info!("read {} link(s) from {}", urls.len(), path.display());
                    urls
                }
            };

            let pipeline = Pipeline::new(config)?;
            let results = pipeline.run_details(&urls).await;
            persist(&resolve_tool_path(&out), &results);
            pipeline.close();
        }
        Command::Links { url, limit, out } => {
            let limit = limit.filter(|n| *n > 0);
            let search_url = url.unwrap_or_else(|| config.discovery.search_url.clone());

            let pipeline = Pipeline::new(config)?;
            let results = pipeline.run_links(&search_url, limit).await?;
            persist(&resolve_tool_path(&out), &results);
            pipeline.close();
        }
        Command::Images { url, limit, out } => {
            let limit = limit.filter(|n| *n > 0);
            let search_url = url.unwrap_or_else(|| config.discovery.search_url.clone());

            let pipeline = Pipeline::new(config)?;
            let results = pipeline.run_images(&search_url, limit).await?;
            persist(&resolve_tool_path(&out), &results);
            pipeline.close();
        }
    }

    Ok(())
}

/// A failed write is logged with the attempted path but does not discard
/// the run or flip the exit code; the results already exist in memory and
/// downstream treats a missing artifact as "no new data".
fn persist<T: Serialize>(path: &Path, value: &T) {
    if let Err(e) = write_json(path, value) {
        error!(path = %path.display(), "could not write artifact: {e}");
    }
}
