// src/fetch/zips.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use url::Url;

/// Download the given archive URL into `dest_dir` under its original
/// filename, skipping the download when the file is already on disk.
/// Returns the full path of the archive.
pub async fn download_zip(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let url = Url::parse(url_str).with_context(|| format!("parsing {}", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = dest_dir.join(filename);

    if fs::try_exists(&dest_path).await.unwrap_or(false) {
        debug!(path = %dest_path.display(), "archive already on disk");
        return Ok(dest_path);
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let resp = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", url))?;
    let bytes = resp.bytes().await?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing {}", dest_path.display()))?;

    Ok(dest_path)
}
