// src/bin/download_dataset.rs
//
// Utility for listing the bulk datasets and downloading a single one by its
// code, for debugging an archive in isolation.

use anyhow::{bail, Result};
use clap::Parser;
use faoscraper::fetch::{datasets, zips};
use reqwest::Client;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
struct Args {
    /// Directory holding the cached dataset metadata
    #[arg(long, default_value = "source")]
    source_dir: PathBuf,

    /// Directory to download archives into
    #[arg(long, default_value = "datasets")]
    output_dir: PathBuf,

    /// List all available datasets
    #[arg(long)]
    list: bool,

    /// Download the dataset with this code
    #[arg(long, value_name = "DATASET_CODE")]
    download: Option<String>,

    /// Re-download even if the archive already exists
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    fs::create_dir_all(&args.source_dir)?;

    let client = Client::new();
    let dataset_list = datasets::load_metadata(&client, &args.source_dir).await?;

    if args.list {
        println!("Available datasets ({} total):", dataset_list.len());
        for ds in &dataset_list {
            println!(
                "{:<8} {:<60} {:<10} {}",
                ds.code,
                ds.name,
                ds.file_size.as_deref().unwrap_or("-"),
                ds.file_location
            );
        }
        return Ok(());
    }

    let Some(code) = args.download else {
        bail!("nothing to do; pass --list or --download CODE");
    };

    let Some(ds) = dataset_list.iter().find(|d| d.code == code) else {
        bail!("no dataset with code {:?}", code);
    };

    let dest = args.output_dir.join(ds.file_name());
    if dest.is_file() && args.force {
        fs::remove_file(&dest)?;
    } else if dest.is_file() {
        info!(path = %dest.display(), "already downloaded; use --force to overwrite");
        return Ok(());
    }

    info!(code = %ds.code, name = %ds.name, url = %ds.file_location, "downloading");
    let path = zips::download_zip(&client, &ds.file_location, &args.output_dir).await?;
    info!(path = %path.display(), "saved");
    Ok(())
}
