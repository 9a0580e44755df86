//! Delta ingestion engine.
//!
//! Replays timestamped level updates against caller-owned level maps and
//! samples top of book once per distinct timestamp:
//! - records are grouped by consecutive equal timestamps and never re-sorted;
//! - every record of a group is applied before the group's slot is written;
//! - the end cutoff is the only early exit.

use serde::Deserialize;
use tracing::{debug, trace};

use crate::book::{BookState, PriceLevels};
use crate::error::BookError;
use crate::types::*;

/// What to do when a side runs out of levels mid-ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySidePolicy {
    /// Keep sampling the last best price seen on that side.
    #[default]
    CarryForward,
    /// Abort the window with `EmptyBook`.
    Fail,
}

/// Parameters for one ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Groups with a timestamp after this are not applied.
    pub end: Timestamp,
    /// Book reference time; older groups are already reflected in the snapshot.
    pub start: Timestamp,
    pub empty_side: EmptySidePolicy,
    /// Reject sequences that go backwards in time.
    pub strict_order: bool,
}

impl IngestConfig {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            end,
            start,
            empty_side: EmptySidePolicy::default(),
            strict_order: false,
        }
    }
}

/// Top-of-book series. Slot 0 is the snapshot seed; the engine writes slots
/// `1..=count`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub best_bids: Vec<f64>,
    pub best_asks: Vec<f64>,
    pub mid_price: Vec<f64>,
}

impl TimeSeries {
    /// Zeroed series with room for the seed plus `slots` update slots.
    pub fn with_capacity(slots: usize) -> Self {
        Self {
            best_bids: vec![0.0; slots + 1],
            best_asks: vec![0.0; slots + 1],
            mid_price: vec![0.0; slots + 1],
        }
    }

    /// Series sized for `deltas` and seeded from the book's snapshot.
    pub fn for_book(book: &BookState, deltas: &[DeltaRecord]) -> Self {
        let mut series = Self::with_capacity(distinct_timestamps(deltas));
        series.write(0, book.best_bid, book.best_ask);
        series
    }

    /// Number of update slots (excluding the seed).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.best_bids.len().saturating_sub(1)
    }

    #[inline(always)]
    fn write(&mut self, slot: usize, bid: Price, ask: Price) {
        self.best_bids[slot] = bid.to_f64();
        self.best_asks[slot] = ask.to_f64();
        self.mid_price[slot] = bid.mid(ask);
    }

    /// The seed slot plus the first `count` update slots.
    pub fn filled(&self, count: usize) -> TimeSeries {
        let end = (count + 1).min(self.best_bids.len());
        TimeSeries {
            best_bids: self.best_bids[..end].to_vec(),
            best_asks: self.best_asks[..end].to_vec(),
            mid_price: self.mid_price[..end].to_vec(),
        }
    }
}

/// Number of consecutive timestamp groups, i.e. the most slots an
/// ingestion run over `deltas` can fill.
pub fn distinct_timestamps(deltas: &[DeltaRecord]) -> usize {
    deltas.chunk_by(|a, b| a.timestamp == b.timestamp).count()
}

/// Apply a single level update in place.
#[inline(always)]
pub fn apply_delta(bids: &mut PriceLevels, asks: &mut PriceLevels, delta: &DeltaRecord) {
    let book = match delta.side {
        Side::Bid => bids,
        Side::Ask => asks,
    };
    if delta.level.qty.is_zero() {
        // Absent keys are a no-op.
        book.remove(&delta.level.price);
    } else {
        book.insert(delta.level.price, delta.level.qty);
    }
}

/// Best price of a side after a group, resolved through the empty-side policy.
#[inline(always)]
fn resolve_best(
    levels: &PriceLevels,
    side: Side,
    last: Price,
    policy: EmptySidePolicy,
) -> Result<Price, BookError> {
    let best = match side {
        Side::Bid => levels.keys().next_back(),
        Side::Ask => levels.keys().next(),
    };
    match (best, policy) {
        (Some(&price), _) => Ok(price),
        (None, EmptySidePolicy::CarryForward) => {
            trace!(side = %side, last = %last, "side empty, carrying last best price");
            Ok(last)
        }
        (None, EmptySidePolicy::Fail) => Err(BookError::EmptyBook { side }),
    }
}

/// Replay `deltas` against the live level maps and fill `series`.
///
/// Returns the number of update slots written. Level maps are left in the
/// state reached after the last applied group, also when an error is
/// returned mid-run.
pub fn ingest_delta(
    book: &BookState,
    deltas: &[DeltaRecord],
    bids: &mut PriceLevels,
    asks: &mut PriceLevels,
    series: &mut TimeSeries,
    config: &IngestConfig,
) -> Result<usize, BookError> {
    let required = distinct_timestamps(deltas);
    if series.capacity() < required {
        return Err(BookError::ArraySizeMismatch {
            required,
            available: series.capacity(),
        });
    }

    let mut count = 0;
    let mut skipped = 0;
    let mut last_bid = book.best_bid;
    let mut last_ask = book.best_ask;
    let mut previous: Option<Timestamp> = None;
    let mut index = 0;

    for group in deltas.chunk_by(|a, b| a.timestamp == b.timestamp) {
        let timestamp = group[0].timestamp;
        if let Some(prev) = previous {
            if config.strict_order && timestamp < prev {
                return Err(BookError::TimestampOrder {
                    index,
                    previous: prev,
                    timestamp,
                });
            }
        }
        previous = Some(timestamp);
        index += group.len();

        if timestamp > config.end {
            break;
        }
        if timestamp < config.start {
            skipped += 1;
            continue;
        }

        for delta in group {
            apply_delta(bids, asks, delta);
        }

        last_bid = resolve_best(bids, Side::Bid, last_bid, config.empty_side)?;
        last_ask = resolve_best(asks, Side::Ask, last_ask, config.empty_side)?;
        count += 1;
        series.write(count, last_bid, last_ask);
    }

    debug!(
        count,
        skipped,
        bid_levels = bids.len(),
        ask_levels = asks.len(),
        "delta ingestion finished"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::extract_levels;

    fn px(units: u64) -> Price {
        Price::from_units(units)
    }

    fn book() -> BookState {
        BookState::from_parts(
            vec![0],
            vec![Level::new(px(100), 5.0), Level::new(px(99), 3.0)],
            vec![Level::new(px(101), 4.0), Level::new(px(102), 2.0)],
        )
        .unwrap()
    }

    fn live_maps(book: &BookState) -> (PriceLevels, PriceLevels) {
        (
            extract_levels(&book.bids, PriceLevels::new(), 0),
            extract_levels(&book.asks, PriceLevels::new(), 0),
        )
    }

    fn scenario() -> Vec<DeltaRecord> {
        vec![
            DeltaRecord::new(1, Side::Bid, px(100), 0.0),
            DeltaRecord::new(1, Side::Ask, px(101), 6.0),
            DeltaRecord::new(2, Side::Bid, px(98), 10.0),
        ]
    }

    #[test]
    fn test_reference_scenario() {
        let book = book();
        let deltas = scenario();
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 2)).unwrap();

        assert_eq!(count, 2);
        assert_eq!(series.best_bids, vec![100.0, 99.0, 99.0]);
        assert_eq!(series.best_asks, vec![101.0, 101.0, 101.0]);
        assert_eq!(series.mid_price, vec![100.5, 100.0, 100.0]);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids.get(&px(99)), Some(&Qty(3.0)));
        assert_eq!(bids.get(&px(98)), Some(&Qty(10.0)));
        assert_eq!(asks.get(&px(101)), Some(&Qty(6.0)));
        assert_eq!(asks.get(&px(102)), Some(&Qty(2.0)));
    }

    #[test]
    fn test_cutoff_before_first_delta() {
        let book = book();
        let deltas = scenario();
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);
        let seeded = series.clone();

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 0)).unwrap();

        assert_eq!(count, 0);
        assert_eq!(series, seeded);
        assert_eq!(bids, live_maps(&book).0);
    }

    #[test]
    fn test_cutoff_stops_mid_stream() {
        let book = book();
        let deltas = scenario();
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 1)).unwrap();

        assert_eq!(count, 1);
        assert!(!bids.contains_key(&px(98)));
        assert_eq!(series.best_bids[2], 0.0);
    }

    #[test]
    fn test_groups_older_than_snapshot_are_skipped() {
        let book = BookState::from_parts(vec![5], vec![Level::new(px(100), 1.0)], vec![Level::new(px(101), 1.0)]).unwrap();
        let deltas = vec![
            DeltaRecord::new(3, Side::Bid, px(100), 0.0),
            DeltaRecord::new(6, Side::Ask, px(103), 1.0),
        ];
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);

        let config = IngestConfig::new(book.start_timestamp(), 10);
        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &config).unwrap();

        assert_eq!(count, 1);
        assert!(bids.contains_key(&px(100)));
        assert_eq!(series.best_bids[1], 100.0);
    }

    #[test]
    fn test_absent_price_removal_is_noop() {
        let book = book();
        let (mut bids, mut asks) = live_maps(&book);
        let before = (bids.clone(), asks.clone());
        apply_delta(&mut bids, &mut asks, &DeltaRecord::new(1, Side::Bid, px(50), 0.0));
        apply_delta(&mut bids, &mut asks, &DeltaRecord::new(1, Side::Ask, px(500), 0.0));
        assert_eq!((bids, asks), before);
    }

    #[test]
    fn test_negative_size_removes_level() {
        let book = book();
        let (mut bids, mut asks) = live_maps(&book);
        apply_delta(&mut bids, &mut asks, &DeltaRecord::new(1, Side::Bid, px(100), -2.0));
        assert!(!bids.contains_key(&px(100)));
        assert!(bids.values().all(|q| !q.is_zero()));
    }

    #[test]
    fn test_empty_side_carries_forward() {
        let book = book();
        let deltas = vec![
            DeltaRecord::new(1, Side::Ask, px(101), 0.0),
            DeltaRecord::new(1, Side::Ask, px(102), 0.0),
            DeltaRecord::new(2, Side::Ask, px(103), 1.0),
        ];
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 10)).unwrap();

        assert_eq!(count, 2);
        assert_eq!(series.best_asks, vec![101.0, 101.0, 103.0]);
    }

    #[test]
    fn test_empty_side_fails_under_strict_policy() {
        let book = book();
        let deltas = vec![
            DeltaRecord::new(1, Side::Bid, px(100), 0.0),
            DeltaRecord::new(1, Side::Bid, px(99), 0.0),
        ];
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);
        let config = IngestConfig {
            empty_side: EmptySidePolicy::Fail,
            ..IngestConfig::new(0, 10)
        };

        let err = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &config).unwrap_err();
        assert!(matches!(err, BookError::EmptyBook { side: Side::Bid }));
    }

    #[test]
    fn test_undersized_series_is_rejected() {
        let book = book();
        let deltas = scenario();
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::with_capacity(1);

        let err = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 10)).unwrap_err();
        assert!(matches!(
            err,
            BookError::ArraySizeMismatch {
                required: 2,
                available: 1
            }
        ));
        assert_eq!(bids, live_maps(&book).0);
    }

    #[test]
    fn test_strict_order_rejects_backwards_time() {
        let book = book();
        let deltas = vec![
            DeltaRecord::new(2, Side::Bid, px(98), 1.0),
            DeltaRecord::new(2, Side::Bid, px(97), 1.0),
            DeltaRecord::new(1, Side::Bid, px(96), 1.0),
        ];
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);
        let config = IngestConfig {
            strict_order: true,
            ..IngestConfig::new(0, 10)
        };

        let err = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &config).unwrap_err();
        assert!(matches!(
            err,
            BookError::TimestampOrder {
                index: 2,
                previous: 2,
                timestamp: 1
            }
        ));
    }

    #[test]
    fn test_unsorted_stream_is_not_resorted() {
        let book = book();
        let deltas = vec![
            DeltaRecord::new(2, Side::Bid, px(100), 9.0),
            DeltaRecord::new(1, Side::Bid, px(100), 1.0),
        ];
        let (mut bids, mut asks) = live_maps(&book);
        let mut series = TimeSeries::for_book(&book, &deltas);

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 10)).unwrap();

        assert_eq!(count, 2);
        // Applied in file order, so the later row wins.
        assert_eq!(bids.get(&px(100)), Some(&Qty(1.0)));
    }

    #[test]
    fn test_best_prices_match_maps_at_every_slot() {
        let book = book();
        let deltas: Vec<DeltaRecord> = (1..=40u64)
            .map(|i| {
                let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
                let price = match side {
                    Side::Bid => px(90 + i % 10),
                    Side::Ask => px(101 + i % 7),
                };
                let size = if i % 3 == 0 { 0.0 } else { i as f64 };
                DeltaRecord::new(i / 2 + 1, side, price, size)
            })
            .collect();

        let (mut bids, mut asks) = live_maps(&book);
        let total = distinct_timestamps(&deltas);
        let mut series = TimeSeries::for_book(&book, &deltas);
        let mut last = (book.best_bid, book.best_ask);

        // Replay group by group and compare every sampled slot to the maps.
        let mut applied = 0;
        for end in 1..=21u64 {
            let mut step = TimeSeries::for_book(&book, &deltas);
            let (mut b, mut a) = live_maps(&book);
            let count = ingest_delta(&book, &deltas, &mut b, &mut a, &mut step, &IngestConfig::new(0, end)).unwrap();
            assert!(count <= total);
            assert!(count >= applied);
            applied = count;
            if count > 0 {
                let best_bid = b.keys().next_back().copied().unwrap_or(last.0);
                let best_ask = a.keys().next().copied().unwrap_or(last.1);
                assert_eq!(step.best_bids[count], best_bid.to_f64());
                assert_eq!(step.best_asks[count], best_ask.to_f64());
                assert!(b.values().chain(a.values()).all(|q| !q.is_zero()));
                last = (best_bid, best_ask);
            }
        }

        let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, u64::MAX)).unwrap();
        assert_eq!(count, total);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let book = book();
        let deltas = scenario();
        let run = || {
            let (mut bids, mut asks) = live_maps(&book);
            let mut series = TimeSeries::for_book(&book, &deltas);
            let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 2)).unwrap();
            (count, series, bids, asks)
        };
        let (c1, s1, b1, a1) = run();
        let (c2, s2, b2, a2) = run();
        assert_eq!(c1, c2);
        assert_eq!(b1, b2);
        assert_eq!(a1, a2);
        let bits = |s: &TimeSeries| {
            s.best_bids
                .iter()
                .chain(&s.best_asks)
                .chain(&s.mid_price)
                .map(|v| v.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&s1), bits(&s2));
    }

    #[test]
    fn test_filled_includes_seed() {
        let mut series = TimeSeries::with_capacity(3);
        series.write(0, px(1), px(3));
        series.write(1, px(2), px(4));
        let filled = series.filled(1);
        assert_eq!(filled.mid_price, vec![2.0, 3.0]);
        assert_eq!(series.filled(10).best_bids.len(), 4);
    }
}
