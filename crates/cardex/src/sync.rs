//! 🎛️ The run orchestrator — where the whole pipeline gets assembled.
//!
//! 🎬 COLD OPEN — one function, five acts:
//! make the directories, fetch the export, stream it through the router,
//! sweep the tmp dir, hand back the numbers. Everything below this module is
//! a specialist; this is the one that knows the running order.
//!
//! 🧠 Knowledge graph:
//! - Cleanup runs before errors propagate, matching how the run would behave
//!   under a `finally`. A failed sync still sweeps its tmp dir (unless
//!   `keep_tmp`), and a failed *sweep* is only worth a warning — the sync
//!   result is the headline either way.
//! - Ctrl-C arrives through `shutdown_signal()`, which the stream driver
//!   converts into a clean close plus `SyncError::Interrupted`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::download::download_export;
use crate::progress::SyncProgress;
use crate::report::{HugeFile, largest_files};
use crate::router::PartitionRouter;
use crate::stats::{RunStats, RunSummary};
use crate::streamer::stream_cards;

/// 📛 The export's name once it lands in the tmp dir.
const EXPORT_FILE_NAME: &str = "directory-export-business-cards.xml";

/// ⏻ Resolves when the user says stop.
///
/// If the Ctrl-C handler can't be registered at all we fall back to a future
/// that never resolves — a sync that can't be interrupted beats a sync that
/// interrupts itself at startup.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("could not register the Ctrl-C handler; interrupts are disabled for this run");
        futures::future::pending::<()>().await;
    }
}

fn ensure_dirs(config: &AppConfig) -> Result<()> {
    for dir in [&config.tmp_dir, &config.log_dir, &config.extracts_dir] {
        std::fs::create_dir_all(dir).context(format!(
            "💀 Could not create '{}'. A sync without its directories is just a wish.",
            dir.display()
        ))?;
    }
    Ok(())
}

/// 🧹 Sweep the tmp dir. Failures here are warnings, never errors — the sync
/// already happened, and nobody wants a red exit code over leftover temp files.
fn cleanup_tmp(tmp_dir: &Path, keep_tmp: bool) {
    if keep_tmp {
        info!("keeping tmp dir {} as requested", tmp_dir.display());
        return;
    }
    match std::fs::remove_dir_all(tmp_dir) {
        Ok(()) => info!("cleaned up tmp dir {}", tmp_dir.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("could not clean up tmp dir {}: {err}", tmp_dir.display()),
    }
}

/// 🚀 The full sync: download (or reuse), partition, count, sweep.
pub async fn run_sync(config: &AppConfig, force_download: bool) -> Result<RunSummary> {
    ensure_dirs(config)?;
    let input = config.tmp_dir.join(EXPORT_FILE_NAME);
    download_export(&config.export_url, &input, force_download).await?;

    let total_size = tokio::fs::metadata(&input)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);

    let mut router = PartitionRouter::new(config.extracts_dir.clone(), config.max_bytes);
    let mut stats = RunStats::default();
    let mut progress = SyncProgress::new(EXPORT_FILE_NAME.to_string(), total_size);

    let outcome = stream_cards(
        &input,
        &mut router,
        &mut stats,
        &mut progress,
        shutdown_signal(),
    )
    .await;

    // sweep first, then let the stream verdict through
    cleanup_tmp(&config.tmp_dir, config.keep_tmp);
    let outcome = outcome?;

    info!(
        "sync complete: {} cards into {} files",
        outcome.cards_processed,
        router.files_created()
    );
    Ok(stats.summary(router.files_created()))
}

/// 📥 Just the download half, for the `download` action. Returns where the
/// export landed so the CLI can brag about its size.
pub async fn run_download(config: &AppConfig, force: bool) -> Result<PathBuf> {
    ensure_dirs(config)?;
    let input = config.tmp_dir.join(EXPORT_FILE_NAME);
    download_export(&config.export_url, &input, force).await?;
    Ok(input)
}

/// 🏋️ The huge-files report, for the `huge` action.
pub fn run_huge(config: &AppConfig) -> Result<Vec<HugeFile>> {
    largest_files(&config.extracts_dir, config.huge_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EXPORT_BODY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<root xmlns=\"http://www.peppol.eu/schema/pd/businesscard-generic/201907/\" version=\"2\">\n\
  <businesscard>\n\
    <entity countrycode=\"NO\">\n\
      <name name=\"Fjord Services AS\"/>\n\
      <regdate>2024-01-15</regdate>\n\
    </entity>\n\
  </businesscard>\n\
  <businesscard>\n\
    <entity countrycode=\"SE\">\n\
      <name name=\"Lagom AB\"/>\n\
    </entity>\n\
  </businesscard>\n\
</root>\n";

    async fn serve_export() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EXPORT_BODY))
            .mount(&server)
            .await;
        server
    }

    fn test_config(root: &Path, server: &MockServer) -> AppConfig {
        AppConfig {
            tmp_dir: root.join("tmp"),
            log_dir: root.join("log"),
            extracts_dir: root.join("extracts"),
            export_url: format!("{}/export", server.uri()),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_the_whole_pipeline_runs_end_to_end() {
        let server = serve_export().await;
        let root = tempfile::tempdir().expect("tempdir");
        let config = test_config(root.path(), &server);

        let summary = run_sync(&config, false).await.expect("sync should succeed");

        assert_eq!(summary.cards_processed, 2);
        assert_eq!(summary.countries, 2);
        assert_eq!(summary.date_buckets, 2);
        assert_eq!(summary.files_created, 2);

        let no_artifact = config.extracts_dir.join("NO/business-cards.000001.xml");
        let se_artifact = config.extracts_dir.join("SE/business-cards.000001.xml");
        assert!(no_artifact.exists());
        assert!(se_artifact.exists());

        // tmp was swept on success
        assert!(!config.tmp_dir.exists());
    }

    #[tokio::test]
    async fn the_one_where_keep_tmp_spares_the_download() {
        let server = serve_export().await;
        let root = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            keep_tmp: true,
            ..test_config(root.path(), &server)
        };

        run_sync(&config, false).await.expect("sync should succeed");

        assert!(config.tmp_dir.join(EXPORT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn the_one_where_download_alone_leaves_the_export_in_tmp() {
        let server = serve_export().await;
        let root = tempfile::tempdir().expect("tempdir");
        let config = test_config(root.path(), &server);

        let input = run_download(&config, false)
            .await
            .expect("download should succeed");

        assert_eq!(input, config.tmp_dir.join(EXPORT_FILE_NAME));
        assert_eq!(
            std::fs::read_to_string(&input).expect("export on disk"),
            EXPORT_BODY
        );
        // download-only never touches extracts
        assert!(std::fs::read_dir(&config.extracts_dir)
            .expect("extracts dir exists")
            .next()
            .is_none());
    }

    #[tokio::test]
    async fn the_one_where_huge_reports_on_what_sync_wrote() {
        let server = serve_export().await;
        let root = tempfile::tempdir().expect("tempdir");
        let config = test_config(root.path(), &server);

        run_sync(&config, false).await.expect("sync should succeed");
        let report = run_huge(&config).expect("report should succeed");

        assert_eq!(report.len(), 2);
        assert!(report[0].size >= report[1].size);
        assert!(report.iter().all(|f| f.path.extension().is_some_and(|e| e == "xml")));
    }
}
