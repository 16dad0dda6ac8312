//! 🏷️ The error taxonomy — because "something went wrong" is not a diagnosis.
//!
//! 🎬 COLD OPEN — INT. HOME OFFICE — 11:58 PM
//!
//! The sync has been running for forty minutes. The progress bar is at 97%.
//! And then: an error. Just the word "error". No path. No byte offset. No
//! dignity. Our hero stares at the terminal. The terminal stares back.
//!
//! Never again. Every failure mode in cardex gets a name, a payload, and a
//! Display impl you can actually read at midnight.
//!
//! 🧠 Knowledge graph:
//! - These variants ride *inside* anyhow chains — the rest of the crate keeps
//!   its `.context(...)` habit, and callers `downcast_ref` when they need to
//!   know which kind of bad thing happened (exit codes, tests).
//! - `MissingInput` / `MalformedInput`: stream-level, fatal, finalization runs first.
//! - `ArtifactState`: a previously-written extract does not end with the bytes
//!   we wrote. We refuse to guess a truncation offset. Fail loudly, stay honest.
//! - `Download`: the directory export could not be fetched. Fatal to the
//!   download step only — nothing under extracts/ is touched.
//! - `Interrupted`: Ctrl-C. Finalization already ran. Exit code 130, like the
//!   shell gods intended.
//!
//! 🦆 (the duck is load-bearing)

use std::path::PathBuf;

use thiserror::Error;

/// 💀 Everything that can go fatally wrong during a sync, with names.
///
/// Absent countries and absent dates are *not* in here on purpose — those are
/// recovered locally (record excluded / fallback bucket synthesized) and never
/// bubble up. Only the genuinely fatal stuff earns a variant.
#[derive(Debug, Error)]
pub enum SyncError {
    /// 📂 The input export was not there when streaming was about to begin.
    /// Nothing was opened, nothing needs cleaning. The file simply stood us up.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// 🪓 The XML parser hit something it could not chew. The byte position is
    /// where the reader gave up, which is usually close enough to find the crime
    /// scene with `head -c`.
    #[error("malformed XML near byte {position}: {message}")]
    MalformedInput { position: u64, message: String },

    /// 🧨 An existing extract does not end with the expected `</root>\n` bytes.
    /// Either someone edited it by hand, or a previous run died mid-write.
    /// Truncating blindly would corrupt it further, so we stop here instead.
    #[error(
        "artifact '{path}' does not end with the expected closing tag; \
         refusing to reopen it for appending"
    )]
    ArtifactState { path: PathBuf },

    /// 📡 The export download failed — transport, DNS, or an unhappy HTTP status.
    /// Partition state on disk is untouched by this.
    #[error("download from {url} failed: {message}")]
    Download { url: String, message: String },

    /// ⚠️ Ctrl-C arrived mid-stream. The open artifact was still closed properly
    /// before this surfaced, so everything on disk remains valid XML.
    #[error("interrupted by user")]
    Interrupted,
}
