//! 🚰 The stream driver — one forward pass, constant memory, no regrets.
//!
//! 🎬 COLD OPEN — INT. HOME OFFICE — 02:14 AM
//!
//! The export is 4 GB. The laptop has 8. Someone on the internet suggests
//! "just load it into a DOM". The laptop's fan spins up in protest before
//! the sentence is even finished.
//!
//! This module reads the export as a pull-event sequence instead: each
//! `businesscard` subtree is captured, extracted, routed, counted, and then
//! *gone*. The event buffer is cleared per event, one capture is alive at a
//! time, and the high-water memory mark is one record, not one country.
//!
//! 🧠 Knowledge graph:
//! - Existence is checked before the first byte: absent input is
//!   `SyncError::MissingInput`, with nothing to clean up.
//! - Parse errors become `SyncError::MalformedInput` — but only *after* the
//!   sink's finalize has run, so whatever artifact was open gets its closing
//!   tag. Same deal for Ctrl-C. Finalize runs on Every. Exit. Path.
//! - The shutdown future is a parameter: the orchestrator passes Ctrl-C,
//!   tests pass `futures::future::pending()` (or `ready(())` to simulate an
//!   interrupt without owning a keyboard).
//! - Progress reports every 10,000 records — frequent enough to feel alive,
//!   rare enough that indicatif isn't the bottleneck.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use crate::common::Card;
use crate::errors::SyncError;
use crate::extractors::{CardCapture, is_businesscard};
use crate::progress::SyncProgress;
use crate::sinks::CardSink;
use crate::stats::{RunStats, fallback_bucket};

/// 🔔 Report progress this often, in records.
const PROGRESS_EVERY: u64 = 10_000;

/// 🏁 What the pass produced (the interesting numbers live in the stats and
/// the sink; this is just the headcount).
#[derive(Debug)]
pub(crate) struct StreamOutcome {
    pub cards_processed: u64,
}

fn malformed(position: u64, message: impl ToString) -> anyhow::Error {
    SyncError::MalformedInput {
        position,
        message: message.to_string(),
    }
    .into()
}

/// 📖 Read one complete record subtree, starting after its opening tag.
async fn capture_card<R>(reader: &mut Reader<R>, start: &BytesStart<'static>) -> Result<Card>
where
    R: AsyncBufRead + Unpin,
{
    let mut capture = CardCapture::begin(start)?;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let done = {
            let event = reader
                .read_event_into_async(&mut buf)
                .await
                .map_err(|err| malformed(reader.buffer_position() as u64, err))?;
            if matches!(event, Event::Eof) {
                return Err(malformed(
                    reader.buffer_position() as u64,
                    "unexpected end of file inside a businesscard record",
                ));
            }
            capture.handle(&event)?
        };
        if done {
            return Ok(capture.into_card());
        }
    }
}

/// 🚏 One card, fully handled: counted always; bucketed and routed only when
/// it has a country. Countryless cards end here — processed, never written.
async fn route_card<S: CardSink>(card: Card, stats: &mut RunStats, sink: &mut S) -> Result<()> {
    stats.card_seen();
    if let Some(country) = card.country.as_deref() {
        // the date only picks the stats bucket — file placement is country-only
        let bucket = match card.date.as_deref() {
            Some(date) => date.to_owned(),
            None => fallback_bucket(card.entity_name.as_deref()),
        };
        stats.record(country, &bucket);
        sink.append(country, &card.body).await?;
    }
    Ok(())
}

/// 🚀 The single pass. Drives extraction, routing, stats, and progress off one
/// event loop, finalizes the sink no matter how the loop ends, and translates
/// the ending into the caller's vocabulary: an outcome, a typed error, or
/// `SyncError::Interrupted`.
pub(crate) async fn stream_cards<S, F>(
    input: &Path,
    sink: &mut S,
    stats: &mut RunStats,
    progress: &mut SyncProgress,
    shutdown: F,
) -> Result<StreamOutcome>
where
    S: CardSink,
    F: Future<Output = ()>,
{
    let input_exists = tokio::fs::try_exists(input).await.context(format!(
        "💀 Could not even check whether '{}' exists. The filesystem is screening our calls.",
        input.display()
    ))?;
    if !input_exists {
        return Err(SyncError::MissingInput(input.to_path_buf()).into());
    }

    let file = File::open(input).await.context(format!(
        "💀 The input export '{}' exists but would not open. Permissions, probably. It's always permissions.",
        input.display()
    ))?;
    let mut reader = Reader::from_reader(BufReader::new(file));

    info!("streaming {} in a single pass", input.display());

    tokio::pin!(shutdown);
    let mut buf = Vec::new();
    let mut cards: u64 = 0;
    let mut interrupted = false;
    let mut stream_err: Option<anyhow::Error> = None;

    'stream: loop {
        buf.clear();
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                interrupted = true;
                break 'stream;
            }
            event = reader.read_event_into_async(&mut buf) => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                stream_err = Some(malformed(reader.buffer_position() as u64, err));
                break 'stream;
            }
        };

        match event {
            Event::Eof => break 'stream,
            Event::Start(start) if is_businesscard(start.name()) => {
                // own the opening tag so the event buffer can be reused below
                let start = start.into_owned();
                let card = match capture_card(&mut reader, &start).await {
                    Ok(card) => card,
                    Err(err) => {
                        stream_err = Some(err);
                        break 'stream;
                    }
                };
                cards += 1;
                if let Err(err) = route_card(card, stats, sink).await {
                    stream_err = Some(err);
                    break 'stream;
                }
                if cards % PROGRESS_EVERY == 0 {
                    progress.update(reader.buffer_position() as u64, cards, sink.files_created());
                }
            }
            Event::Empty(start) if is_businesscard(start.name()) => {
                // a degenerate self-closing record: counted, never routable
                let card = match CardCapture::empty(&start) {
                    Ok(card) => card,
                    Err(err) => {
                        stream_err = Some(err);
                        break 'stream;
                    }
                };
                cards += 1;
                if let Err(err) = route_card(card, stats, sink).await {
                    stream_err = Some(err);
                    break 'stream;
                }
            }
            // wrapper elements, whitespace between records, declarations: noise
            _ => {}
        }
    }

    // ⚠️ finalization is unconditional — an unclosed wrapper is invalid output,
    // and "the parser exploded" is not an excuse the XML spec accepts
    let finalize_result = sink.finalize().await;

    if let Some(err) = stream_err {
        if let Err(finalize_err) = finalize_result {
            // the stream error is the story; the finalize error is a footnote
            warn!("finalizing the open artifact during error unwind also failed: {finalize_err:#}");
        }
        return Err(err);
    }
    finalize_result?;

    progress.update(reader.buffer_position() as u64, cards, sink.files_created());
    progress.finish();

    if interrupted {
        info!("interrupted after {cards} cards; open artifact was closed cleanly");
        return Err(SyncError::Interrupted.into());
    }

    info!("processed {cards} business cards");
    Ok(StreamOutcome {
        cards_processed: cards,
    })
}
