//! 📦 Common data structures — the building blocks of cardex.
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! Somewhere in Brussels, a 4 GB XML export rolls off a server. It contains
//! every business card in the PEPPOL directory, and it does not fit in RAM.
//! It was never going to fit in RAM. Nobody asked if it would fit in RAM.
//!
//! ✅ And then — a [`Card`] is born. One record, pulled from the stream,
//! alive only long enough to be measured, serialized, and filed away under
//! its country. It does not linger. It does not accumulate. It is the
//! mayfly of this codebase, and the memory profile thanks it for its service.
//!
//! 🦆
//!
//! This module also pins down the bytes that every extract file starts and
//! ends with. The router *truncates files based on these exact bytes* — if you
//! change them, every previously-written extract becomes unappendable. That is
//! not a threat, it's a schema.

use std::path::{Path, PathBuf};

/// 📡 The versioned PEPPOL business-card namespace. Input records may carry it
/// prefixed, unprefixed, or not at all — output extracts always declare it once
/// on the wrapper element and never inside the fragments.
pub(crate) const PEPPOL_NS: &str =
    "http://www.peppol.eu/schema/pd/businesscard-generic/201907/";

/// 🏗️ The first bytes of every extract file: XML declaration plus the opening
/// wrapper. Written exactly once per artifact, at creation.
pub(crate) const ARTIFACT_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<root xmlns=\"http://www.peppol.eu/schema/pd/businesscard-generic/201907/\" version=\"2\">\n";

/// 🔚 The last bytes of every *closed* extract file. Reopening an artifact means
/// verifying these 8 bytes are at the end and truncating exactly them away.
pub(crate) const ARTIFACT_TAIL: &[u8] = b"</root>\n";

/// 🃏 One business-registration record, extracted and ready to route.
///
/// Ephemeral by design: the stream driver builds one, the router writes its
/// `body`, the stats take their counts, and then it drops. If you find yourself
/// putting these in a `Vec`, you are about to reinvent the memory problem this
/// whole crate exists to avoid.
#[derive(Debug, Clone)]
pub(crate) struct Card {
    /// 🌍 Grouping key. `None` means the record is counted but never written —
    /// a card with no country has nowhere to be filed.
    pub country: Option<String>,
    /// 📅 `YYYY-MM-DD` from the registration date, or `None` when the stats
    /// layer must synthesize a fallback bucket. Never affects file placement.
    pub date: Option<String>,
    /// 🏷️ Free-text entity name — only consulted to build the fallback bucket.
    pub entity_name: Option<String>,
    /// 📦 The canonical serialized fragment: namespace declarations gone,
    /// prefixes stripped, everything else byte-for-byte as the source had it.
    pub body: String,
}

/// 🗂️ Where a `(country, sequence)` partition lives on disk:
/// `<extracts>/<country>/business-cards.<sequence:06>.xml`.
///
/// Six digits zero-padded so `ls` sorts them and sequence 1,000,000 remains
/// someone else's problem.
pub(crate) fn artifact_path(extracts_dir: &Path, country: &str, sequence: u32) -> PathBuf {
    extracts_dir
        .join(country)
        .join(format!("business-cards.{sequence:06}.xml"))
}
