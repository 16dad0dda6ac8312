//! 📊 Run statistics — pure counting, zero I/O, maximum accountability.
//!
//! 🎬 *[narrator voice]* "Four million cards went in. How many came out?
//! And in which buckets? The auditors want to know. The auditors always
//! want to know."
//!
//! 🧠 Knowledge graph:
//! - `RunStats` is the single scoreboard for one run: total cards seen,
//!   per-country counts, per-date-bucket counts. Owned by the orchestrator,
//!   fed by the stream driver, read exactly once at the end.
//! - Cards without a country bump the total but nothing else — they are
//!   processed, not routed, and they leave no other trace. This is policy,
//!   not an accident.
//! - The fallback bucket is a *statistics* concern: a missing date never moves
//!   a record to a different file, it only changes which bucket gets the +1.
//!   That's why [`fallback_bucket`] lives here and the router never sees a date.
//!
//! 🦆 (the duck counts itself. total: 1 duck.)

use std::collections::HashMap;

/// 📈 Counters for one sync run. Created at run start, incremented per card,
/// summarized once at the end. Not persisted — every run starts from zero.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    cards_processed: u64,
    country_counts: HashMap<String, u64>,
    date_counts: HashMap<String, u64>,
}

/// 🏁 The end-of-run summary the CLI prints and callers assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Every card the stream driver saw, routable or not.
    pub cards_processed: u64,
    /// Distinct countries that received at least one record.
    pub countries: usize,
    /// Distinct date buckets, real and synthesized alike.
    pub date_buckets: usize,
    /// Output files created *this run* (reopened files don't count twice).
    pub files_created: u64,
}

impl RunStats {
    /// 👁️ A card crossed the stream boundary. Counted whether or not it ever
    /// reaches an output file.
    pub(crate) fn card_seen(&mut self) {
        self.cards_processed += 1;
    }

    /// ➕ A routable card: bump its country and its date bucket.
    pub(crate) fn record(&mut self, country: &str, date_bucket: &str) {
        *self.country_counts.entry(country.to_owned()).or_insert(0) += 1;
        *self.date_counts.entry(date_bucket.to_owned()).or_insert(0) += 1;
    }

    pub(crate) fn cards_processed(&self) -> u64 {
        self.cards_processed
    }

    pub(crate) fn country_count(&self, country: &str) -> u64 {
        self.country_counts.get(country).copied().unwrap_or(0)
    }

    pub(crate) fn date_count(&self, bucket: &str) -> u64 {
        self.date_counts.get(bucket).copied().unwrap_or(0)
    }

    /// 🏁 Fold the counters into a [`RunSummary`]. The file count comes from the
    /// router — it owns the handles, it gets to say how many files were born.
    pub(crate) fn summary(&self, files_created: u64) -> RunSummary {
        RunSummary {
            cards_processed: self.cards_processed,
            countries: self.country_counts.len(),
            date_buckets: self.date_counts.len(),
            files_created,
        }
    }
}

/// 📅 Synthesize a date-ish bucket for a card with no registration date.
///
/// `"2000-"` + the first five alphanumeric characters of the entity name,
/// uppercased — so `"Acme5 Corp!"` lands in `2000-ACME5`. A name with no
/// alphanumeric characters at all (or no name) gets the literal `2000-UNKNOWN`.
///
/// ⚠️ Filter first, slice second, uppercase last — in that order. The corpus of
/// already-written extracts was bucketed this way, and changing the order would
/// silently fork the statistics between runs.
pub(crate) fn fallback_bucket(entity_name: Option<&str>) -> String {
    let stem: String = entity_name
        .map(|name| {
            name.chars()
                .filter(|c| c.is_alphanumeric())
                .take(5)
                .flat_map(char::to_uppercase)
                .collect()
        })
        .unwrap_or_default();

    if stem.is_empty() {
        "2000-UNKNOWN".to_string()
    } else {
        format!("2000-{stem}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_acme_gets_its_own_bucket() {
        // 🧪 The canonical example: punctuation out, digits in, caps on.
        assert_eq!(fallback_bucket(Some("Acme5 Corp!")), "2000-ACME5");
    }

    #[test]
    fn the_one_where_punctuation_only_names_go_to_unknown() {
        // 🧪 "!!!" has strong feelings but zero alphanumerics.
        assert_eq!(fallback_bucket(Some("!!!")), "2000-UNKNOWN");
        assert_eq!(fallback_bucket(Some("")), "2000-UNKNOWN");
        assert_eq!(fallback_bucket(None), "2000-UNKNOWN");
    }

    #[test]
    fn the_one_where_short_names_are_used_whole() {
        // 🧪 Fewer than five alphanumerics? Take what there is. No padding.
        assert_eq!(fallback_bucket(Some("ab")), "2000-AB");
        assert_eq!(fallback_bucket(Some("Foo Ltd")), "2000-FOOLT");
    }

    #[test]
    fn the_one_where_counting_actually_counts() {
        let mut stats = RunStats::default();

        stats.card_seen();
        stats.record("BE", "2023-05-01");
        stats.card_seen();
        stats.record("BE", "2000-FOOLT");
        stats.card_seen(); // countryless card: seen, never recorded

        assert_eq!(stats.cards_processed(), 3);
        assert_eq!(stats.country_count("BE"), 2);
        assert_eq!(stats.country_count("NL"), 0);
        assert_eq!(stats.date_count("2023-05-01"), 1);
        assert_eq!(stats.date_count("2000-FOOLT"), 1);

        let summary = stats.summary(1);
        assert_eq!(
            summary,
            RunSummary {
                cards_processed: 3,
                countries: 1,
                date_buckets: 2,
                files_created: 1,
            }
        );
    }
}
