//! 🕳️ Card sinks — where routable records go to be written down.
//!
//! 🎭 This module is the casting agency. Need records filed on disk under
//! their country? The [`crate::router::PartitionRouter`] is the star. Need to
//! assert what the stream driver *would* have written without touching a
//! filesystem? The understudy lives here.
//!
//! # Contract
//! - `append` takes a record that already has a country (countryless records
//!   never reach a sink — the stream driver drops them after counting).
//! - `finalize` flushes and closes whatever is open. MUST be called, on every
//!   exit path, success or failure. Skipping it leaves an unclosed wrapper
//!   element on disk, which is a bug *and* invalid XML. Two crimes, one line.
//!
//! 🦆 (mandatory duck, it knows what it did)

use anyhow::Result;
use async_trait::async_trait;

/// 🚰 Something that accepts serialized record fragments, keyed by country.
#[async_trait]
pub(crate) trait CardSink {
    /// 📥 File one record fragment under its country.
    async fn append(&mut self, country: &str, body: &str) -> Result<()>;

    /// 🗑️ Close up shop. Idempotent, mandatory, non-negotiable.
    async fn finalize(&mut self) -> Result<()>;

    /// 📊 How many output files this sink has created so far this run.
    fn files_created(&self) -> u64;
}

/// 🧪 A sink that never forgets and never touches disk.
///
/// Collects `(country, body)` pairs so driver tests can assert exactly which
/// records were routed and in what order. Also remembers whether `finalize`
/// was called, because "did we close the wrapper" is the single most
/// important question this crate ever asks.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct InMemoryCardSink {
    pub(crate) received: Vec<(String, String)>,
    pub(crate) finalized: bool,
}

#[cfg(test)]
#[async_trait]
impl CardSink for InMemoryCardSink {
    async fn append(&mut self, country: &str, body: &str) -> Result<()> {
        self.received.push((country.to_owned(), body.to_owned()));
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn files_created(&self) -> u64 {
        // RAM is free real estate; no files were harmed
        0
    }
}
