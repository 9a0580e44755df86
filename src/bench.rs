//! Dedicated benchmark binary for the replay engine.
//!
//! Usage: `benchmark <deltas.csv> <snapshot>`
//!
//! Measures:
//! 1. Delta file parsing throughput
//! 2. Ingestion throughput (deltas/sec) over the whole file, no cutoff
//! 3. Plot geometry extraction

use anyhow::Context;

use orderbook_replay::book::BookState;
use orderbook_replay::driver::reconstruct;
use orderbook_replay::engine::{distinct_timestamps, IngestConfig};
use orderbook_replay::logging::init_logging;
use orderbook_replay::parser::DataFile;

const WARMUP_ITERATIONS: usize = 5;
const BENCH_ITERATIONS: usize = 20;

/// Run `f` after warmup and return per-iteration nanoseconds.
fn time_runs<T>(clock: &quanta::Clock, mut f: impl FnMut() -> T) -> Vec<u64> {
    for _ in 0..WARMUP_ITERATIONS {
        std::hint::black_box(f());
    }
    (0..BENCH_ITERATIONS)
        .map(|_| {
            let start = clock.raw();
            std::hint::black_box(f());
            clock.delta_as_nanos(start, clock.raw())
        })
        .collect()
}

fn avg(times: &[u64]) -> u64 {
    times.iter().sum::<u64>() / times.len().max(1) as u64
}

fn best(times: &[u64]) -> u64 {
    times.iter().copied().min().unwrap_or(0).max(1)
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let mut args = std::env::args().skip(1);
    let (delta_path, snapshot_path) = match (args.next(), args.next()) {
        (Some(d), Some(s)) => (d, s),
        _ => anyhow::bail!("usage: benchmark <deltas.csv> <snapshot>"),
    };

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║        ORDERBOOK REPLAY — BENCHMARK SUITE            ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    let clock = quanta::Clock::new();

    // ── Benchmark 1: Delta parsing ────────────────────────────────
    println!("── Benchmark 1: Delta parsing ────────────────────────");
    let file = DataFile::open(&delta_path).with_context(|| format!("opening {delta_path}"))?;
    anyhow::ensure!(!file.is_empty(), "{delta_path} is empty");
    let deltas = file.parse_deltas()?;
    let parse_times = time_runs(&clock, || file.parse_deltas());
    let parse_throughput = deltas.len() as f64 / best(&parse_times) as f64 * 1e9;

    println!("  File size:         {:.2} MiB", file.len() as f64 / (1024.0 * 1024.0));
    println!("  Deltas parsed:     {}", deltas.len());
    println!("  Distinct stamps:   {}", distinct_timestamps(&deltas));
    println!("  Avg parse time:    {:.2} µs", avg(&parse_times) as f64 / 1000.0);
    println!("  Min parse time:    {:.2} µs", best(&parse_times) as f64 / 1000.0);
    println!("  Parse throughput:  {parse_throughput:.0} deltas/sec (best run)\n");

    // ── Benchmark 2: Ingestion ────────────────────────────────────
    println!("── Benchmark 2: Ingestion (no cutoff) ────────────────");
    let book = BookState::load(&snapshot_path)?;
    let ingest = IngestConfig::new(book.start_timestamp(), u64::MAX);
    let rebuilt = reconstruct(&book, &deltas, 0, &ingest)?;
    let ingest_times = time_runs(&clock, || reconstruct(&book, &deltas, 0, &ingest));
    let per_delta_ns = best(&ingest_times) as f64 / deltas.len().max(1) as f64;
    let ingest_throughput = deltas.len() as f64 / best(&ingest_times) as f64 * 1e9;

    println!("  Slots filled:      {}", rebuilt.count);
    println!("  Final depth:       {} bids, {} asks", rebuilt.bids.len(), rebuilt.asks.len());
    println!("  Avg ingest time:   {:.2} µs", avg(&ingest_times) as f64 / 1000.0);
    println!("  Min ingest time:   {:.2} µs", best(&ingest_times) as f64 / 1000.0);
    println!("  Per-delta:         {per_delta_ns:.0} ns");
    println!("  Ingest throughput: {ingest_throughput:.0} deltas/sec (best run)\n");

    // ── Benchmark 3: Plot geometry ────────────────────────────────
    println!("── Benchmark 3: Plot geometry ────────────────────────");
    let plot_times = time_runs(&clock, || rebuilt.plot_segments(1.0, 1.0));
    println!("  Segments:          {}", rebuilt.plot_segments(1.0, 1.0).len());
    println!("  Min extract time:  {:.2} µs\n", best(&plot_times) as f64 / 1000.0);

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                   SUMMARY                            ║");
    println!("╠══════════════════════════════════════════════════════╣");
    println!("║  Parse throughput:   {parse_throughput:>12.0} deltas/sec        ║");
    println!("║  Ingest throughput:  {ingest_throughput:>12.0} deltas/sec        ║");
    println!("║  Per-delta latency:  {per_delta_ns:>9.0} ns                  ║");
    println!("╚══════════════════════════════════════════════════════╝");

    Ok(())
}
