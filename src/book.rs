//! Snapshot-backed book state and price-level extraction.
//!
//! `BookState` owns the raw snapshot sides. The live level maps that the
//! ingestion engine mutates are extracted from it and owned by the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BookError;
use crate::parser::DataFile;
use crate::types::*;

/// Price → size for one side. Sorted ascending; best bid = last entry,
/// best ask = first entry. Every entry has strictly positive size.
pub type PriceLevels = BTreeMap<Price, Qty>;

/// Raw levels of one side as listed by the snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotSide {
    pub side: Side,
    pub levels: Vec<Level>,
}

impl SnapshotSide {
    pub fn new(side: Side, levels: Vec<Level>) -> Self {
        Self { side, levels }
    }

    /// Best resting price of this side, ignoring zero-size levels.
    pub fn best_price(&self) -> Option<Price> {
        let resting = self.levels.iter().filter(|l| !l.qty.is_zero()).map(|l| l.price);
        match self.side {
            Side::Bid => resting.max(),
            Side::Ask => resting.min(),
        }
    }
}

/// Book loaded from one snapshot. Immutable after construction.
#[derive(Debug, Clone)]
pub struct BookState {
    /// Snapshot timestamps in file order; index 0 is the ingestion reference.
    pub timestamps: Vec<Timestamp>,
    pub bids: SnapshotSide,
    pub asks: SnapshotSide,
    pub best_bid: Price,
    pub best_ask: Price,
}

impl BookState {
    /// Load a snapshot file (JSON document or CSV snapshot rows).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BookError> {
        let file = DataFile::open(path.as_ref())?;
        let snapshot = file.parse_snapshot()?;
        let book = Self::build(file.path(), snapshot.timestamps, snapshot.bids, snapshot.asks)?;
        debug!(
            path = %file.path().display(),
            bids = book.bids.levels.len(),
            asks = book.asks.levels.len(),
            best_bid = %book.best_bid,
            best_ask = %book.best_ask,
            "snapshot loaded"
        );
        Ok(book)
    }

    /// Build from in-memory snapshot data.
    pub fn from_parts(timestamps: Vec<Timestamp>, bids: Vec<Level>, asks: Vec<Level>) -> Result<Self, BookError> {
        Self::build(Path::new("<memory>"), timestamps, bids, asks)
    }

    fn build(origin: &Path, timestamps: Vec<Timestamp>, bids: Vec<Level>, asks: Vec<Level>) -> Result<Self, BookError> {
        if timestamps.is_empty() {
            return Err(BookError::malformed_snapshot(PathBuf::from(origin), "no timestamps"));
        }
        let bids = SnapshotSide::new(Side::Bid, bids);
        let asks = SnapshotSide::new(Side::Ask, asks);
        let best_bid = bids.best_price().ok_or(BookError::EmptyBook { side: Side::Bid })?;
        let best_ask = asks.best_price().ok_or(BookError::EmptyBook { side: Side::Ask })?;
        Ok(Self {
            timestamps,
            bids,
            asks,
            best_bid,
            best_ask,
        })
    }

    /// Reference time for ingestion: the first snapshot timestamp.
    #[inline]
    pub fn start_timestamp(&self) -> Timestamp {
        self.timestamps[0]
    }

    #[inline]
    pub fn mid_price(&self) -> f64 {
        self.best_bid.mid(self.best_ask)
    }
}

/// Merge a raw snapshot side into `target` and return it.
///
/// Positive levels are upserted, zero-size levels remove an existing key.
/// With `count > 0` only the best `count` levels of the side are kept
/// (highest bids, lowest asks); `count == 0` keeps everything.
pub fn extract_levels(side: &SnapshotSide, mut target: PriceLevels, count: usize) -> PriceLevels {
    for level in &side.levels {
        if level.qty.is_zero() {
            target.remove(&level.price);
        } else {
            target.insert(level.price, level.qty);
        }
    }

    if count > 0 && target.len() > count {
        target = match side.side {
            Side::Bid => target.into_iter().rev().take(count).collect(),
            Side::Ask => target.into_iter().take(count).collect(),
        };
    }
    target
}
