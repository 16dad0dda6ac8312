//! 📊 progress.rs — "Are we there yet?" — every multi-gigabyte sync, forever.
//!
//! 🚀 The export is enormous and the terminal is small. This module bridges
//! the two: an indicatif bar tracking bytes consumed from the input, and a
//! comfy-table readout of cards/s, throughput, files created, and the ETA.
//!
//! ⚠️ Warning: watching the bar will not make the XML parse faster.
//! We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants. the hill remains occupied.
const MIB: u64 = 1024 * 1024;

// -- 🔄 rate window width; wide enough to smooth parser hiccups, short enough to react
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes, but for humans.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        // 🐛 raw bytes mode. small files need love too.
        format!("{bytes} bytes")
    }
}

/// 🔢 Commas every three digits, for the humans in the audience.
fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS if the run earns it.
fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 📊 Live progress for one streaming pass over the export.
///
/// Fed absolute counters (bytes consumed, cards seen, files created) at the
/// driver's reporting cadence; rates come from a sliding window so a burst of
/// tiny records doesn't turn the display into a seismograph.
pub(crate) struct SyncProgress {
    input_name: String,
    total_size: u64,
    bytes_read: u64,
    cards: u64,
    files_created: u64,
    bar: ProgressBar,
    /// (when, bytes, cards) samples inside the rate window
    samples: VecDeque<(Instant, u64, u64)>,
    started: Instant,
}

impl std::fmt::Debug for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("SyncProgress")
            .field("input_name", &self.input_name)
            .field("total_size", &self.total_size)
            .field("bytes_read", &self.bytes_read)
            .field("cards", &self.cards)
            .field("files_created", &self.files_created)
            .finish()
    }
}

impl SyncProgress {
    /// 🚀 `total_size` is the input file's byte size; pass 0 for "no idea" and
    /// the percent column will politely shrug.
    pub(crate) fn new(input_name: String, total_size: u64) -> Self {
        let bar = ProgressBar::new(total_size);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .unwrap() // -- 🐛 safe unwrap: template string is hardcoded and valid, I checked, twice
                .progress_chars("=>-"),
        );

        let started = Instant::now();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        let mut samples = VecDeque::new();
        samples.push_back((started, 0u64, 0u64));

        Self {
            input_name,
            total_size,
            bytes_read: 0,
            cards: 0,
            files_created: 0,
            bar,
            samples,
            started,
        }
    }

    /// 🔄 New absolute counters from the driver. Recomputes rates, redraws.
    pub(crate) fn update(&mut self, bytes_read: u64, cards: u64, files_created: u64) {
        self.bytes_read = bytes_read;
        self.cards = cards;
        self.files_created = files_created;

        let (cards_per_sec, mib_per_sec) = self.window_rates();
        self.render(cards_per_sec, mib_per_sec);
        self.bar.set_position(self.bytes_read);
    }

    /// ✅ EOF reached, or close enough. Ring the bell.
    pub(crate) fn finish(&self) {
        self.bar.finish();
    }

    /// 📈 Rates over the sliding window: evict stale samples, push the present,
    /// diff against the oldest survivor.
    fn window_rates(&mut self) -> (f64, f64) {
        let now = Instant::now();
        while let Some(&(when, _, _)) = self.samples.front() {
            if now.duration_since(when) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.bytes_read, self.cards));

        if let Some(&(oldest_when, oldest_bytes, oldest_cards)) = self.samples.front() {
            let elapsed = now.duration_since(oldest_when).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.bytes_read.saturating_sub(oldest_bytes);
                let cards_delta = self.cards.saturating_sub(oldest_cards);
                return (
                    cards_delta as f64 / elapsed,
                    (bytes_delta as f64 / elapsed) / MIB as f64,
                );
            }
        }
        // -- 💤 not enough elapsed time yet — zeros, composure maintained
        (0.0, 0.0)
    }

    /// 🎨 Paint the readout into the bar's message slot.
    fn render(&self, cards_per_sec: f64, mib_per_sec: f64) {
        let percent = if self.total_size > 0 {
            (self.bytes_read as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.started.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation — assumes the future looks like the past,
            // which for a single forward file read is almost honest
            let estimated_total = elapsed.as_secs_f64() / (percent / 100.0);
            let left = estimated_total - elapsed.as_secs_f64();
            if left > 0.0 {
                format_duration(Duration::from_secs_f64(left))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} cards/s", format_count(cards_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} cards", format_count(self.cards)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{mib_per_sec:.2} MiB/s")).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {}",
                format_bytes(self.bytes_read),
                format_bytes(self.total_size)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{percent:.2}%")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} files opened", format_count(self.files_created)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{remaining} remaining")).set_alignment(CellAlignment::Right),
        ]);

        self.bar
            .set_message(format!("input: {}\n{}", self.input_name, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_byte_formatting_picks_sane_units() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * MIB), "3.00 MiB");
    }

    #[test]
    fn the_one_where_commas_show_up_every_three_digits() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_stay_readable() {
        assert_eq!(format_duration(Duration::from_secs(62)), "01:02");
        assert_eq!(format_duration(Duration::from_secs(3723)), "01:02:03");
    }

    #[test]
    fn the_one_where_updates_do_not_panic_without_a_terminal() {
        // 🧪 smoke test: headless environments (CI) must survive a redraw
        let mut progress = SyncProgress::new("test-input.xml".into(), 100);
        progress.update(50, 10_000, 2);
        progress.update(100, 20_000, 3);
        progress.finish();
    }
}
