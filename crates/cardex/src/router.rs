//! 🗂️ The partition router — the rollover/reopen state machine at the heart
//! of cardex.
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Two hundred countries. One write handle. The handle moves between files
//! like a chess piece, and every file it leaves behind must be valid XML the
//! instant it's left. No exceptions for errors. No exceptions for Ctrl-C.
//! No exceptions.
//!
//! 🧠 Knowledge graph:
//! - [`ArtifactState`] makes the "at most one open artifact" rule structural:
//!   the enum *is* the handle, and there is exactly one field of it. The old
//!   implementation tracked this with a nullable path comparison; the enum
//!   can't even express two open files.
//! - Rollover is *reactive*: before each append we stat the file currently
//!   occupying the sequence slot, and if it's already over `max_bytes` we bump
//!   the sequence once. That means a single artifact may overshoot the cap by
//!   up to one record, and a pre-existing oversized artifact from a previous
//!   run rolls over before this run writes a single byte to it. Intentional,
//!   verbatim-preserved behavior.
//! - Reopen-and-patch: a closed artifact ends with exactly
//!   [`ARTIFACT_TAIL`](crate::common::ARTIFACT_TAIL). We verify those bytes
//!   are really there, truncate exactly them, and keep writing inside the
//!   still-open wrapper. If they're not there, `SyncError::ArtifactState` —
//!   loudly, before any damage.
//! - The writer is flushed after every record, so the stat in the rollover
//!   check sees real on-disk bytes, not a BufWriter's private stash.
//!
//! ⚠️ Precondition (documented, not enforced): one run at a time per extracts
//! tree. Two concurrent runs will race each other's reopen/truncate and the
//! result is modern art, not XML.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions, create_dir_all, metadata};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::common::{ARTIFACT_HEADER, ARTIFACT_TAIL, artifact_path};
use crate::errors::SyncError;
use crate::sinks::CardSink;

/// 🔒 The single write handle, as a type. `Closed` or `Open` — there is no
/// third state, and there is no second handle.
enum ArtifactState {
    Closed,
    Open {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

impl std::fmt::Debug for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🐛 File handles don't gossip about their internals in Debug output
        match self {
            ArtifactState::Closed => f.write_str("Closed"),
            ArtifactState::Open { path, .. } => f.debug_tuple("Open").field(path).finish(),
        }
    }
}

/// 🗂️ Routes serialized records into size-bounded, per-country extract files.
///
/// Owns the per-country sequence map (created on first sight, never destroyed
/// during a run) and the one-and-only open artifact handle.
#[derive(Debug)]
pub(crate) struct PartitionRouter {
    extracts_dir: PathBuf,
    max_bytes: u64,
    /// current sequence per observed country; new country starts at 1
    sequences: HashMap<String, u32>,
    state: ArtifactState,
    files_created: u64,
}

/// 📏 Size of the file at `path`, or `None` if nothing lives there.
async fn on_disk_len(path: &Path) -> Result<Option<u64>> {
    match metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).context(format!(
            "💀 Could not stat '{}'. The filesystem is being coy.",
            path.display()
        )),
    }
}

impl PartitionRouter {
    pub(crate) fn new(extracts_dir: PathBuf, max_bytes: u64) -> Self {
        Self {
            extracts_dir,
            max_bytes,
            sequences: HashMap::new(),
            state: ArtifactState::Closed,
            files_created: 0,
        }
    }

    /// 🚪 Close the currently-open artifact, if any: write the closing wrapper
    /// tag, flush, drop the handle. Leaves the file valid XML. Idempotent.
    async fn close_current(&mut self) -> Result<()> {
        if let ArtifactState::Open { path, mut writer } =
            std::mem::replace(&mut self.state, ArtifactState::Closed)
        {
            writer.write_all(ARTIFACT_TAIL).await.context(format!(
                "💀 Failed to write the closing tag to '{}'. The wrapper remains ajar.",
                path.display()
            ))?;
            writer.flush().await.context(format!(
                "💀 Failed to flush '{}' on close. The bytes saw the disk and froze.",
                path.display()
            ))?;
            debug!("closed artifact {}", path.display());
        }
        Ok(())
    }

    /// 🆕 Brand-new artifact: parent dirs, XML declaration, open wrapper tag.
    async fn create_artifact(&mut self, path: &Path) -> Result<BufWriter<File>> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await.context(format!(
                "💀 Could not create '{}'. The directory refused to be born.",
                parent.display()
            ))?;
        }
        let mut file = File::create(path).await.context(format!(
            "💀 Could not create extract file '{}'. We stared at the path. The path stared back.",
            path.display()
        ))?;
        file.write_all(ARTIFACT_HEADER.as_bytes())
            .await
            .context("💀 Failed to write the artifact header. Zero bytes in and already losing.")?;
        self.files_created += 1;
        info!("created output file {}", path.display());
        Ok(BufWriter::new(file))
    }

    /// ♻️ Reopen a previously-closed artifact: verify the trailing closing-tag
    /// bytes are exactly where they should be, truncate them away, and position
    /// the cursor inside the still-open wrapper.
    ///
    /// The verification is the whole point. A file that was cut off mid-write
    /// has the wrong tail, and blindly truncating 8 bytes off it would corrupt
    /// it further. [`SyncError::ArtifactState`] instead.
    async fn reopen_artifact(&mut self, path: &Path, len: u64) -> Result<BufWriter<File>> {
        let tail_len = ARTIFACT_TAIL.len() as u64;
        if len < tail_len {
            return Err(SyncError::ArtifactState {
                path: path.to_path_buf(),
            }
            .into());
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .context(format!(
                "💀 Could not reopen '{}' for appending. The door would not budge.",
                path.display()
            ))?;

        let mut tail = vec![0u8; ARTIFACT_TAIL.len()];
        file.seek(SeekFrom::Start(len - tail_len))
            .await
            .context("💀 Seek to the closing tag failed. The file has no end. Terrifying.")?;
        file.read_exact(&mut tail)
            .await
            .context("💀 Could not read the trailing bytes back. The tail got away.")?;
        if tail != ARTIFACT_TAIL {
            return Err(SyncError::ArtifactState {
                path: path.to_path_buf(),
            }
            .into());
        }

        let new_len = len - tail_len;
        file.set_len(new_len).await.context(format!(
            "💀 Truncating '{}' failed halfway through the surgery.",
            path.display()
        ))?;
        file.seek(SeekFrom::Start(new_len))
            .await
            .context("💀 Post-truncate seek failed. The cursor is lost at sea.")?;
        debug!("reopened artifact {} for appending", path.display());
        Ok(BufWriter::new(file))
    }

    /// 🔀 Make `candidate` the open artifact, closing whatever was open before.
    /// No-op when it already is — the common case, and the fast one.
    async fn ensure_open(&mut self, candidate: PathBuf) -> Result<()> {
        let already_open =
            matches!(&self.state, ArtifactState::Open { path, .. } if *path == candidate);
        if already_open {
            return Ok(());
        }

        self.close_current().await?;
        let writer = match on_disk_len(&candidate).await? {
            None => self.create_artifact(&candidate).await?,
            Some(len) => self.reopen_artifact(&candidate, len).await?,
        };
        self.state = ArtifactState::Open {
            path: candidate,
            writer,
        };
        Ok(())
    }

    pub(crate) fn files_created(&self) -> u64 {
        self.files_created
    }
}

#[async_trait]
impl CardSink for PartitionRouter {
    /// 📥 The routing algorithm, once per record, in record order:
    /// sequence lookup → reactive rollover check → handle switch if needed →
    /// append the fragment, two-space indented, one line per non-blank line.
    async fn append(&mut self, country: &str, body: &str) -> Result<()> {
        let sequence = self.sequences.entry(country.to_owned()).or_insert(1);
        let mut candidate = artifact_path(&self.extracts_dir, country, *sequence);

        // reactive rollover: checked against whatever file occupies the slot
        // right now — including a leftover from a previous run
        if let Some(len) = on_disk_len(&candidate).await? {
            if len > self.max_bytes {
                *sequence += 1;
                candidate = artifact_path(&self.extracts_dir, country, *sequence);
            }
        }

        self.ensure_open(candidate).await?;

        if let ArtifactState::Open { path, writer } = &mut self.state {
            for line in body.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                writer.write_all(b"  ").await?;
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            // flush per record so the next rollover stat sees the truth
            writer.flush().await.context(format!(
                "💀 Failed to flush a record into '{}'. It was SO close to the disk.",
                path.display()
            ))?;
        }
        Ok(())
    }

    /// 🗑️ Mandatory finalization — runs on success, on parse errors, and on
    /// interrupts alike. An artifact without its closing tag is not output,
    /// it's debris.
    async fn finalize(&mut self) -> Result<()> {
        self.close_current().await
    }

    fn files_created(&self) -> u64 {
        self.files_created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PEPPOL_NS;

    const CARD_A: &str = "<businesscard><entity countrycode=\"BE\"/></businesscard>";
    const CARD_B: &str = "<businesscard><entity countrycode=\"BE\" extra=\"1\"/></businesscard>";

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("artifact should be readable")
    }

    #[tokio::test]
    async fn the_one_where_a_fresh_artifact_is_wrapped_and_closed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);

        router.append("BE", CARD_A).await?;
        router.finalize().await?;

        let path = artifact_path(dir.path(), "BE", 1);
        let contents = read(&path);
        assert_eq!(
            contents,
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <root xmlns=\"{PEPPOL_NS}\" version=\"2\">\n  {CARD_A}\n</root>\n"
            )
        );
        assert_eq!(router.files_created(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_finalize_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);

        router.append("BE", CARD_A).await?;
        router.finalize().await?;
        router.finalize().await?; // second call: nothing open, nothing written

        let contents = read(&artifact_path(dir.path(), "BE", 1));
        assert_eq!(contents.matches("</root>").count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_multiline_bodies_are_indented_per_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);

        let body = "<businesscard>\n    <entity countrycode=\"BE\"/>\n\n  </businesscard>";
        router.append("BE", body).await?;
        router.finalize().await?;

        let contents = read(&artifact_path(dir.path(), "BE", 1));
        // each non-blank source line lands two-space indented; blank lines vanish
        assert!(contents.contains("  <businesscard>\n      <entity countrycode=\"BE\"/>\n    </businesscard>\n"));
        assert!(!contents.contains("\n\n"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_rollover_is_reactive_not_preventive() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // max_bytes of 1: every existing artifact is instantly oversized
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1);

        router.append("BE", CARD_A).await?; // creates 000001
        router.append("BE", CARD_B).await?; // 000001 is now oversized → 000002
        router.append("BE", CARD_A).await?; // 000002 oversized → 000003
        router.finalize().await?;

        // contiguous sequence starting at 1, no gaps
        for seq in 1..=3 {
            let path = artifact_path(dir.path(), "BE", seq);
            let contents = read(&path);
            assert!(contents.starts_with("<?xml"), "{} lacks a header", path.display());
            assert!(contents.ends_with("</root>\n"), "{} lacks a tail", path.display());
        }
        assert!(!artifact_path(dir.path(), "BE", 4).exists());
        // first file overshot the cap by one record: reactive, not preventive
        assert_eq!(read(&artifact_path(dir.path(), "BE", 1)).matches("businesscard").count(), 2);
        assert_eq!(router.files_created(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_leftover_oversized_artifact_rolls_before_any_write() -> Result<()> {
        let dir = tempfile::tempdir()?;

        // previous run left a properly-closed artifact behind
        {
            let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);
            router.append("BE", CARD_A).await?;
            router.finalize().await?;
        }
        let before = read(&artifact_path(dir.path(), "BE", 1));

        // this run's cap says that artifact is already too big — fresh country
        // state, first record, and it must roll to 000002 without touching 000001
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1);
        router.append("BE", CARD_B).await?;
        router.finalize().await?;

        assert_eq!(read(&artifact_path(dir.path(), "BE", 1)), before);
        let second = read(&artifact_path(dir.path(), "BE", 2));
        assert!(second.contains("extra=\"1\""));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_reopen_keeps_prior_bytes_identical() -> Result<()> {
        let dir = tempfile::tempdir()?;

        {
            let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);
            router.append("BE", CARD_A).await?;
            router.finalize().await?;
        }
        let before = read(&artifact_path(dir.path(), "BE", 1));

        // second run, same cap: the artifact is not oversized, so the new
        // record is patched in right before the closing tag
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);
        router.append("BE", CARD_B).await?;
        router.finalize().await?;
        // reopened, not created — the counter only counts births
        assert_eq!(router.files_created(), 0);

        let after = read(&artifact_path(dir.path(), "BE", 1));
        let before_open = before.strip_suffix("</root>\n").expect("closed artifact");
        assert!(after.starts_with(before_open), "prior content must be byte-identical");
        assert_eq!(after, format!("{before_open}  {CARD_B}\n</root>\n"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_mangled_tail_fails_loudly() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = artifact_path(dir.path(), "BE", 1);
        std::fs::create_dir_all(path.parent().unwrap())?;
        // a file that died mid-write: wrapper never closed
        std::fs::write(&path, "<?xml version=\"1.0\"?>\n<root>\n  <businesscard")?;

        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);
        let err = router.append("BE", CARD_A).await.expect_err("must refuse");
        assert!(
            err.chain()
                .any(|cause| matches!(cause.downcast_ref::<SyncError>(), Some(SyncError::ArtifactState { .. }))),
            "expected ArtifactState in the chain, got: {err:#}"
        );
        // nothing was truncated, nothing was appended
        let contents = read(&path);
        assert!(contents.ends_with("<businesscard"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_countries_get_separate_artifacts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut router = PartitionRouter::new(dir.path().to_path_buf(), 1_000_000);

        router.append("BE", CARD_A).await?;
        router.append("NL", CARD_A).await?;
        router.append("BE", CARD_B).await?; // back to BE: reopen, not recreate
        router.finalize().await?;

        let be = read(&artifact_path(dir.path(), "BE", 1));
        let nl = read(&artifact_path(dir.path(), "NL", 1));
        assert_eq!(be.matches("businesscard").count(), 4); // two cards, two tags each
        assert_eq!(nl.matches("businesscard").count(), 2);
        assert!(be.ends_with("</root>\n"));
        assert!(nl.ends_with("</root>\n"));
        assert_eq!(router.files_created(), 2);
        Ok(())
    }
}
