//! Order-book replay: rebuild a limit order book from a snapshot plus a
//! delta stream and sample top of book after every distinct timestamp.
//!
//! ```
//! use orderbook_replay::book::{extract_levels, BookState, PriceLevels};
//! use orderbook_replay::engine::{ingest_delta, IngestConfig, TimeSeries};
//! use orderbook_replay::types::{DeltaRecord, Level, Price, Side};
//!
//! let book = BookState::from_parts(
//!     vec![0],
//!     vec![Level::new(Price::from_units(100), 5.0), Level::new(Price::from_units(99), 3.0)],
//!     vec![Level::new(Price::from_units(101), 4.0)],
//! )?;
//! let deltas = [DeltaRecord::new(1, Side::Bid, Price::from_units(100), 0.0)];
//!
//! let mut bids = extract_levels(&book.bids, PriceLevels::new(), 0);
//! let mut asks = extract_levels(&book.asks, PriceLevels::new(), 0);
//! let mut series = TimeSeries::for_book(&book, &deltas);
//! let count = ingest_delta(&book, &deltas, &mut bids, &mut asks, &mut series, &IngestConfig::new(0, 1))?;
//!
//! assert_eq!(count, 1);
//! assert_eq!(series.mid_price[1], 100.0);
//! # Ok::<(), orderbook_replay::error::BookError>(())
//! ```

pub mod book;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod logging;
pub mod parser;
pub mod plot;
pub mod render;
pub mod sink;
pub mod types;
