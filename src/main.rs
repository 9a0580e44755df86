//! Order-book replay — main entry point.
//!
//! Usage: `orderbook_replay [config.json]`
//!
//! Reconstructs every configured window and writes one chart per window
//! into the configured output directory.

use anyhow::Context;
use tracing::{info, warn};

use orderbook_replay::config::ReplayConfig;
use orderbook_replay::driver;
use orderbook_replay::logging::init_logging;
use orderbook_replay::render::PpmRenderer;

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "replay.json".to_string());
    let config = ReplayConfig::load(&config_path).with_context(|| format!("loading {config_path}"))?;

    info!(
        config = %config_path,
        pair = %config.pair,
        date = %config.date,
        windows = config.windows.len(),
        "starting replay"
    );

    let summary = driver::run(&config, PpmRenderer::default())?;

    info!(
        ok = summary.windows_ok,
        failed = summary.windows_failed,
        rendered = summary.sink.rendered,
        render_failed = summary.sink.failed,
        avg_render_us = summary.sink.avg_render_ns() / 1_000,
        median_queue_ns = summary.sink.median(),
        "replay finished"
    );
    if summary.windows_failed > 0 || summary.sink.failed > 0 {
        warn!("some windows produced no image");
    }

    Ok(())
}
