//! Per-window replay driver.
//!
//! Architecture:
//!   [windows, in order] → load deltas + snapshot → extract levels → ingest
//!        ↓ (crossbeam bounded channel)
//!   [render thread] — draws each finished window through a `PlotSink`
//!
//! Windows are reconstructed one at a time on the calling thread. A window
//! that fails is logged and skipped; it produces no image.

use std::thread;

use anyhow::Context;
use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::book::{extract_levels, BookState, PriceLevels};
use crate::config::{ConfigError, ReplayConfig, WindowSpec};
use crate::engine::{ingest_delta, IngestConfig, TimeSeries};
use crate::error::BookError;
use crate::parser::DataFile;
use crate::plot::{get_plot_values, PlotSegment};
use crate::render::{PlotSink, WindowReport};
use crate::sink::{run_sink, SinkStats};
use crate::types::DeltaRecord;

/// Why a window could not be reconstructed.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WindowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WindowError::Book(e) => e.kind(),
            WindowError::Config(_) => "ConfigError",
        }
    }
}

/// Final state of one ingestion run.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub count: usize,
    /// Seed slot plus the `count` filled slots.
    pub series: TimeSeries,
    pub bids: PriceLevels,
    pub asks: PriceLevels,
}

impl Reconstruction {
    /// Depth bars for every surviving level, bids first.
    pub fn plot_segments(&self, bid_tier: f64, ask_tier: f64) -> Vec<PlotSegment> {
        let mut segments = Vec::with_capacity(self.bids.len() + self.asks.len());
        get_plot_values(&self.bids, &mut segments, bid_tier, true, self.count);
        get_plot_values(&self.asks, &mut segments, ask_tier, false, self.count);
        segments
    }
}

/// Seed live level maps from `book` (keeping `depth` levels per side, 0 = all)
/// and replay `deltas` against them.
pub fn reconstruct(
    book: &BookState,
    deltas: &[DeltaRecord],
    depth: usize,
    ingest: &IngestConfig,
) -> Result<Reconstruction, BookError> {
    let mut bids = extract_levels(&book.bids, PriceLevels::new(), depth);
    let mut asks = extract_levels(&book.asks, PriceLevels::new(), depth);
    let mut series = TimeSeries::for_book(book, deltas);

    let count = ingest_delta(book, deltas, &mut bids, &mut asks, &mut series, ingest)?;

    Ok(Reconstruction {
        count,
        series: series.filled(count),
        bids,
        asks,
    })
}

/// Load one window's inputs, reconstruct it and build its report.
pub fn replay_window(config: &ReplayConfig, window: &WindowSpec) -> Result<WindowReport, WindowError> {
    let deltas = DataFile::open(config.delta_path(window))?.parse_deltas()?;
    let book = BookState::load(config.snapshot_path(window))?;
    let ingest = config.ingest_config(window, book.start_timestamp())?;

    if deltas.first().is_some_and(|d| d.timestamp > ingest.end) {
        warn!(window = %window.label(), "first delta is past the window end");
    }

    let rebuilt = reconstruct(&book, &deltas, config.snapshot_depth, &ingest)?;
    let segments = rebuilt.plot_segments(config.bid_tier, config.ask_tier);

    Ok(WindowReport {
        label: window.label(),
        output: config.output_path(window),
        count: rebuilt.count,
        series: rebuilt.series,
        segments,
        bid_levels: rebuilt.bids.len(),
        ask_levels: rebuilt.asks.len(),
        sent_ns: 0,
    })
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub windows_ok: usize,
    pub windows_failed: usize,
    pub sink: SinkStats,
}

/// Reconstruct every configured window and render the successful ones.
pub fn run<S>(config: &ReplayConfig, sink: S) -> anyhow::Result<RunSummary>
where
    S: PlotSink + Send + 'static,
{
    let clock = quanta::Clock::new();
    let (tx, rx) = bounded::<WindowReport>(config.channel_capacity);

    let sink_clock = clock.clone();
    let sink_handle = thread::Builder::new()
        .name("render".to_string())
        .spawn(move || run_sink(rx, sink, &sink_clock))
        .context("failed to spawn render thread")?;

    let mut windows_ok = 0;
    let mut windows_failed = 0;

    for window in &config.windows {
        let start = clock.raw();
        match replay_window(config, window) {
            Ok(mut report) => {
                let elapsed_ns = clock.delta_as_nanos(start, clock.raw());
                info!(
                    window = %report.label,
                    slots = report.count,
                    bid_levels = report.bid_levels,
                    ask_levels = report.ask_levels,
                    elapsed_us = elapsed_ns / 1_000,
                    "window reconstructed"
                );
                windows_ok += 1;
                report.sent_ns = clock.delta_as_nanos(0, clock.raw());
                // Blocks when the renderer falls behind (backpressure).
                if tx.send(report).is_err() {
                    error!("render thread disconnected, stopping");
                    break;
                }
            }
            Err(e) => {
                windows_failed += 1;
                error!(window = %window.label(), kind = e.kind(), error = %e, "window skipped");
            }
        }
    }

    drop(tx);
    let sink = sink_handle
        .join()
        .map_err(|_| anyhow::anyhow!("render thread panicked"))?;

    Ok(RunSummary {
        windows_ok,
        windows_failed,
        sink,
    })
}
