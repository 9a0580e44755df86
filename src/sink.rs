//! Render thread — consumes finished windows from the driver.
//!
//! Receives `WindowReport`s over a crossbeam bounded channel, hands each one
//! to a `PlotSink`, and tracks how long windows waited in the queue and how
//! long rendering took.

use crossbeam_channel::Receiver;
use tracing::{error, info};

use crate::render::{PlotSink, WindowReport};

/// Run the sink loop. Blocks until the channel is closed.
///
/// # Arguments
/// * `rx` — Receiver end of the report channel.
/// * `sink` — Where reports are rendered.
/// * `clock` — quanta::Clock shared with the driver for latency measurement.
pub fn run_sink<S: PlotSink>(rx: Receiver<WindowReport>, mut sink: S, clock: &quanta::Clock) -> SinkStats {
    let mut stats = SinkStats::new();

    while let Ok(report) = rx.recv() {
        let recv_ns = clock.delta_as_nanos(0, clock.raw());
        let queue_ns = recv_ns.saturating_sub(report.sent_ns);

        let start = clock.raw();
        let result = sink.render(&report);
        let render_ns = clock.delta_as_nanos(start, clock.raw());

        match result {
            Ok(()) => {
                stats.record(queue_ns, render_ns);
                info!(
                    window = %report.label,
                    output = %report.output.display(),
                    slots = report.count,
                    bid_levels = report.bid_levels,
                    ask_levels = report.ask_levels,
                    render_us = render_ns / 1_000,
                    "window rendered"
                );
            }
            Err(e) => {
                stats.failed += 1;
                let reason = format!("{e:#}");
                error!(window = %report.label, error = %reason, "render failed");
            }
        }
    }

    stats
}

/// Statistics collected by the sink thread.
#[derive(Debug, Clone)]
pub struct SinkStats {
    pub rendered: u64,
    pub failed: u64,
    pub total_render_ns: u64,
    pub min_queue_ns: u64,
    pub max_queue_ns: u64,
    /// Queue latencies, kept for percentile calculation.
    pub queue_latencies: Vec<u64>,
}

impl Default for SinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkStats {
    pub fn new() -> Self {
        Self {
            rendered: 0,
            failed: 0,
            total_render_ns: 0,
            min_queue_ns: u64::MAX,
            max_queue_ns: 0,
            queue_latencies: Vec::new(),
        }
    }

    #[inline]
    pub fn record(&mut self, queue_ns: u64, render_ns: u64) {
        self.rendered += 1;
        self.total_render_ns += render_ns;
        self.min_queue_ns = self.min_queue_ns.min(queue_ns);
        self.max_queue_ns = self.max_queue_ns.max(queue_ns);
        self.queue_latencies.push(queue_ns);
    }

    pub fn avg_render_ns(&self) -> u64 {
        if self.rendered == 0 {
            return 0;
        }
        self.total_render_ns / self.rendered
    }

    pub fn percentile(&self, p: f64) -> u64 {
        if self.queue_latencies.is_empty() {
            return 0;
        }
        let mut sorted = self.queue_latencies.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn median(&self) -> u64 {
        self.percentile(50.0)
    }
}
