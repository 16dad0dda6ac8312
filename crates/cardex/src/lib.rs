//! 🗂️ cardex — partitions the PEPPOL directory export into per-country,
//! size-bounded XML artifacts, in one streaming pass.
//!
//! The public surface is deliberately tiny: a config, three run entry points,
//! and the error taxonomy the CLI needs for exit codes. Everything else is
//! plumbing and stays `pub(crate)`.

pub mod app_config;
mod common;
mod download;
mod errors;
mod extractors;
mod progress;
mod report;
mod router;
mod sinks;
mod stats;
mod streamer;
mod sync;

pub use app_config::{AppConfig, load_config};
pub use errors::SyncError;
pub use report::HugeFile;
pub use stats::RunSummary;
pub use sync::{run_download, run_huge, run_sync};
