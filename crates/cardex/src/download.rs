//! 📥 Fetching the directory export — gigabytes of XML, straight to disk.
//!
//! 🎬 COLD OPEN — the export endpoint publishes one enormous file, daily-ish.
//! We stream it to the tmp dir chunk by chunk: no buffering the whole body in
//! memory, no clever resumption protocol, just a byte bar and patience.
//!
//! 🧠 Knowledge graph:
//! - If the destination already exists we skip the download entirely, unless
//!   `force` says otherwise. Re-downloading 4 GB because you re-ran the
//!   command ten seconds later is how data caps die.
//! - Network and HTTP-status failures both become `SyncError::Download`, so
//!   callers get one variant to match on instead of reqwest's whole taxonomy.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::errors::SyncError;

fn download_err(url: &str, message: impl ToString) -> anyhow::Error {
    SyncError::Download {
        url: url.to_owned(),
        message: message.to_string(),
    }
    .into()
}

/// 🚀 Stream `url` into `dest`, unless `dest` already exists and `force` is
/// off. Parent directories must already exist — the orchestrator makes them.
pub(crate) async fn download_export(url: &str, dest: &Path, force: bool) -> Result<()> {
    if !force {
        if let Ok(meta) = tokio::fs::metadata(dest).await {
            // -- ♻️ cached from a previous run; --force exists for the distrustful
            info!(
                "reusing existing export at {} ({} bytes); pass --force to re-download",
                dest.display(),
                meta.len()
            );
            return Ok(());
        }
    }

    info!("downloading {url} -> {}", dest.display());

    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(|err| download_err(url, err))?
        .error_for_status()
        .map_err(|err| download_err(url, err))?;

    // 0 when the server is coy about Content-Length; the bar copes
    let total = response.content_length().unwrap_or(0);
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("downloading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap() // -- 🐛 safe unwrap: template string is hardcoded and valid, I checked, twice
            .progress_chars("=>-"),
    );

    let mut file = File::create(dest).await.context(format!(
        "💀 Could not create '{}'. The download was willing; the disk was not.",
        dest.display()
    ))?;

    let mut response = response;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| download_err(url, err))?
    {
        file.write_all(&chunk).await.context(format!(
            "💀 Writing the export to '{}' failed partway through. Check disk space.",
            dest.display()
        ))?;
        bar.inc(chunk.len() as u64);
    }

    file.flush().await.context(format!(
        "💀 Could not flush '{}' after the last chunk. So close.",
        dest.display()
    ))?;
    bar.finish();

    info!("download complete: {}", dest.display());
    Ok(())
}
