//! Core types for order-book replay.
//! Prices are exact fixed-point so they can key the level maps without
//! binary rounding; sizes stay as plain f64.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Number of decimal places carried by [`Price`].
pub const PRICE_DECIMALS: u32 = 8;

/// Fixed-point scale factor (10^PRICE_DECIMALS).
pub const PRICE_SCALE: u64 = 100_000_000;

/// A price level key, stored as `price * 10^8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Price(pub u64);

/// Why a decimal string could not be turned into a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    #[error("empty price")]
    Empty,
    #[error("negative price `{0}`")]
    Negative(String),
    #[error("non-numeric price `{0}`")]
    NotNumeric(String),
    #[error("price `{0}` is out of range")]
    Overflow(String),
}

impl Price {
    /// Build from an already-scaled raw value.
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Price(raw)
    }

    /// Whole-number price, handy in tests and fixtures.
    #[inline(always)]
    pub const fn from_units(units: u64) -> Self {
        Price(units * PRICE_SCALE)
    }

    /// Convert to f64 for output series and display only.
    #[inline(always)]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / PRICE_SCALE as f64
    }

    /// Midpoint of two prices as f64. Summed in fixed point first so the
    /// result only rounds once.
    #[inline(always)]
    pub fn mid(self, other: Price) -> f64 {
        (self.0 as f64 + other.0 as f64) / 2.0 / PRICE_SCALE as f64
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    /// Accepts plain decimals and exponent form (`1.234e-05`, as pandas and
    /// serde_json print small numbers). Digits past the eighth decimal are
    /// rounded half-to-even, so float noise such as `0.30000000000000004`
    /// lands on the same key as `0.3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PriceParseError::Empty);
        }
        let value = Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|_| PriceParseError::NotNumeric(s.to_string()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PriceParseError::Negative(s.to_string()));
        }

        value
            .round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointNearestEven)
            .checked_mul(Decimal::from(PRICE_SCALE))
            .and_then(|scaled| scaled.to_u64())
            .map(Price)
            .ok_or_else(|| PriceParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0 / PRICE_SCALE;
        let frac = self.0 % PRICE_SCALE;
        if frac == 0 {
            return write!(f, "{units}");
        }
        let frac = format!("{frac:08}");
        write!(f, "{units}.{}", frac.trim_end_matches('0'))
    }
}

/// Quantity stored as raw f64 — no arithmetic needed, just storage & display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Qty(pub f64);

impl Qty {
    /// Sizes at or below zero mean "no resting size".
    #[inline(always)]
    pub fn is_zero(self) -> bool {
        self.0 <= f64::EPSILON
    }
}

/// Side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl Side {
    /// Parse exchange side tokens: `bid`/`buy` and `ask`/`sell`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "bid" | "buy" | "b" => Some(Side::Bid),
            "ask" | "sell" | "s" | "a" => Some(Side::Ask),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single (price, size) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: Price,
    pub qty: Qty,
}

impl Level {
    #[inline(always)]
    pub fn new(price: Price, qty: f64) -> Self {
        Level { price, qty: Qty(qty) }
    }
}

/// Naive (timezone-less) timestamp in nanoseconds since the epoch.
pub type Timestamp = u64;

/// One incremental update: the absolute new size of a level at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaRecord {
    pub timestamp: Timestamp,
    pub side: Side,
    pub level: Level,
}

impl DeltaRecord {
    #[inline(always)]
    pub fn new(timestamp: Timestamp, side: Side, price: Price, size: f64) -> Self {
        DeltaRecord {
            timestamp,
            side,
            level: Level::new(price, size),
        }
    }
}
