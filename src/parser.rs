//! Readers for delta and snapshot files.
//!
//! Design choices:
//! - Memory-mapped file I/O via `memmap2` — zero-copy read, OS handles paging.
//! - Manual byte-level line splitting; header-driven column lookup so both the
//!   pandas export (timestamp index in column 0) and the typed row layout
//!   (`type,exchange,symbol,timestamp,side,bids,asks,price,size`) load.
//! - JSON arrays parsed with serde_json — only for snapshot levels.

use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use memmap2::Mmap;
use serde_json::Value;

use crate::error::BookError;
use crate::types::*;

/// A read-only memory-mapped input file.
pub struct DataFile {
    path: PathBuf,
    mmap: Mmap,
}

/// One snapshot row: a full listing of both sides at a point in time.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub timestamp: Timestamp,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// A snapshot file reduced to what the book needs: every timestamp it lists
/// and the levels of its first snapshot.
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub timestamps: Vec<Timestamp>,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl DataFile {
    /// Open and memory-map the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BookError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source: std::io::Error| BookError::Io {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(io_err)?;
        // SAFETY: read-only mapping; the file must not be modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        #[cfg(unix)]
        {
            let _ = mmap.advise(memmap2::Advice::Sequential);
        }
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Parse every incremental row into a delta record, in file order.
    pub fn parse_deltas(&self) -> Result<Vec<DeltaRecord>, BookError> {
        parse_deltas(&self.mmap[..])
    }

    /// Parse a snapshot file: `.json` documents are keyed, anything else is
    /// read as CSV snapshot rows.
    pub fn parse_snapshot(&self) -> Result<ParsedSnapshot, BookError> {
        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            parse_snapshot_json(&self.mmap[..])
        } else {
            parse_snapshot_rows(&self.mmap[..]).and_then(snapshot_from_rows)
        };
        parsed.map_err(|reason| BookError::malformed_snapshot(&self.path, reason))
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    kind: Option<usize>,
    timestamp: usize,
    side: Option<usize>,
    price: Option<usize>,
    size: Option<usize>,
    bids: Option<usize>,
    asks: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Self {
        let names: Vec<String> = parse_csv_fields(header)
            .into_iter()
            .map(|f| unquote(f).to_ascii_lowercase())
            .collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));
        Columns {
            kind: find(&["type"]),
            // pandas writes the index column first, often with an empty name.
            timestamp: find(&["timestamp", "time", "date", "datetime"]).unwrap_or(0),
            side: find(&["side"]),
            price: find(&["price"]),
            size: find(&["size", "amount", "qty", "quantity"]),
            bids: find(&["bids", "bid"]),
            asks: find(&["asks", "ask"]),
        }
    }
}

/// Iterate non-empty lines as (1-based line number, content without `\r\n`).
fn lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    let mut pos = 0;
    let mut line_no = 0;
    std::iter::from_fn(move || loop {
        if pos >= data.len() {
            return None;
        }
        let line_start = pos;
        let newline_pos = find_newline(data, pos);
        let content_end = if newline_pos > line_start && data[newline_pos - 1] == b'\r' {
            newline_pos - 1
        } else {
            newline_pos
        };
        pos = if newline_pos < data.len() { newline_pos + 1 } else { newline_pos };
        line_no += 1;
        if content_end > line_start {
            return Some((line_no, &data[line_start..content_end]));
        }
    })
}

/// Find position of next \n or end of data.
#[inline(always)]
fn find_newline(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && data[pos] != b'\n' {
        pos += 1;
    }
    pos
}

/// Split the header off and resolve its columns.
fn header_and_rows(data: &[u8]) -> Result<(Columns, impl Iterator<Item = (usize, &[u8])>), String> {
    let mut rows = lines(data);
    let (_, header) = rows.next().ok_or_else(|| "file is empty".to_string())?;
    let header = std::str::from_utf8(header).map_err(|_| "header is not UTF-8".to_string())?;
    Ok((Columns::from_header(header), rows))
}

fn parse_deltas(data: &[u8]) -> Result<Vec<DeltaRecord>, BookError> {
    let (cols, rows) = header_and_rows(data).map_err(|reason| BookError::malformed_delta(1, reason))?;
    let missing = |name: &str| BookError::malformed_delta(1, format!("header has no `{name}` column"));
    let side_col = cols.side.ok_or_else(|| missing("side"))?;
    let price_col = cols.price.ok_or_else(|| missing("price"))?;
    let size_col = cols.size.ok_or_else(|| missing("size"))?;

    let mut deltas = Vec::with_capacity(4096);
    for (line_no, line) in rows {
        let bad = |reason: String| BookError::malformed_delta(line_no, reason);
        let s = std::str::from_utf8(line).map_err(|_| bad("row is not UTF-8".to_string()))?;
        let fields = parse_csv_fields(s);
        let field = |idx: usize| fields.get(idx).map(|f| unquote(f)).unwrap_or_default();

        if let Some(kind_col) = cols.kind {
            if !field(kind_col).eq_ignore_ascii_case("incremental") {
                continue;
            }
        }

        let timestamp = parse_timestamp(&field(cols.timestamp)).map_err(bad)?;
        let side_raw = field(side_col);
        let side = Side::parse(&side_raw).ok_or_else(|| bad(format!("unknown side `{side_raw}`")))?;
        let price = field(price_col).parse::<Price>().map_err(|e| bad(format!("{e}")))?;
        let size_raw = field(size_col);
        let size: f64 = size_raw
            .trim()
            .parse()
            .map_err(|_| bad(format!("non-numeric size `{size_raw}`")))?;
        if !size.is_finite() {
            return Err(bad(format!("non-finite size `{size_raw}`")));
        }

        deltas.push(DeltaRecord::new(timestamp, side, price, size));
    }

    Ok(deltas)
}

fn parse_snapshot_rows(data: &[u8]) -> Result<Vec<SnapshotRow>, String> {
    let (cols, rows) = header_and_rows(data)?;
    let bids_col = cols.bids.ok_or("header has no `bids` column")?;
    let asks_col = cols.asks.ok_or("header has no `asks` column")?;

    let mut snapshots = Vec::new();
    for (line_no, line) in rows {
        let s = std::str::from_utf8(line).map_err(|_| format!("line {line_no} is not UTF-8"))?;
        let fields = parse_csv_fields(s);
        let field = |idx: usize| fields.get(idx).map(|f| unquote(f)).unwrap_or_default();

        if let Some(kind_col) = cols.kind {
            if !field(kind_col).eq_ignore_ascii_case("snapshot") {
                continue;
            }
        }

        let at_line = |reason: String| format!("line {line_no}: {reason}");
        let timestamp = parse_timestamp(&field(cols.timestamp)).map_err(at_line)?;
        let bids = parse_levels_json(&field(bids_col)).map_err(at_line)?;
        let asks = parse_levels_json(&field(asks_col)).map_err(at_line)?;
        snapshots.push(SnapshotRow { timestamp, bids, asks });
    }

    if snapshots.is_empty() {
        return Err("no snapshot rows".to_string());
    }
    Ok(snapshots)
}

/// Parse a CSV line respecting quoted fields (for JSON arrays with commas).
fn parse_csv_fields(s: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(9);
    let mut start = 0;
    let mut in_quotes = false;

    for (i, b) in s.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&s[start..]);
    fields
}

/// Strip surrounding quotes and collapse doubled quotes.
fn unquote(field: &str) -> Cow<'_, str> {
    let trimmed = field.trim();
    match trimmed.strip_prefix('"').and_then(|f| f.strip_suffix('"')) {
        Some(inner) if inner.contains("\"\"") => Cow::Owned(inner.replace("\"\"", "\"")),
        Some(inner) => Cow::Borrowed(inner),
        None => Cow::Borrowed(trimmed),
    }
}

/// Parse a timestamp: integer nanoseconds, or a naive
/// `YYYY-MM-DD HH:MM:SS[.fraction]` (a `T` separator is accepted).
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("missing timestamp".to_string());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u64>().map_err(|e| format!("timestamp `{s}`: {e}"));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| {
            format!("timestamp `{s}` is neither nanoseconds nor a naive date-time (offsets are not accepted)")
        })?;
    naive_to_nanos(naive)
}

/// Nanoseconds since the epoch for a naive date-time, treated as wall time
/// without any zone conversion.
pub fn naive_to_nanos(dt: NaiveDateTime) -> Result<Timestamp, String> {
    dt.and_utc()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| format!("timestamp {dt} is outside the supported range"))
}

/// Parse a JSON array of [price, size] pairs into Levels.
/// Input: "[[99999.99, 0.527], [99998.86, 3.1404], ...]"
fn parse_levels_json(s: &str) -> Result<Vec<Level>, String> {
    let value: Value = serde_json::from_str(s).map_err(|e| format!("level array: {e}"))?;
    levels_from_value(&value)
}

/// Levels from either `[[price, size], ...]` or `{"price": size, ...}`.
fn levels_from_value(value: &Value) -> Result<Vec<Level>, String> {
    match value {
        Value::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([price, size, ..]) => Ok(Level {
                    price: price_from_value(price)?,
                    qty: Qty(size_from_value(size)?),
                }),
                _ => Err(format!("level `{pair}` is not a [price, size] pair")),
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(price, size)| {
                Ok(Level {
                    price: price.parse::<Price>().map_err(|e| format!("{e}"))?,
                    qty: Qty(size_from_value(size)?),
                })
            })
            .collect(),
        other => Err(format!("expected level array or object, got `{other}`")),
    }
}

fn price_from_value(value: &Value) -> Result<Price, String> {
    // Numbers go through their shortest decimal text, never through f64 math.
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(format!("non-numeric price `{other}`")),
    };
    text.parse::<Price>().map_err(|e| format!("{e}"))
}

fn size_from_value(value: &Value) -> Result<f64, String> {
    let size = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    size.filter(|s| s.is_finite())
        .ok_or_else(|| format!("non-numeric size `{value}`"))
}

fn timestamp_from_value(value: &Value) -> Result<Timestamp, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("timestamp `{n}` is not integer nanoseconds")),
        Value::String(s) => parse_timestamp(s),
        other => Err(format!("invalid timestamp `{other}`")),
    }
}

fn snapshot_from_rows(rows: Vec<SnapshotRow>) -> Result<ParsedSnapshot, String> {
    let timestamps = rows.iter().map(|row| row.timestamp).collect();
    let first = rows.into_iter().next().ok_or("no snapshot rows")?;
    Ok(ParsedSnapshot {
        timestamps,
        bids: first.bids,
        asks: first.asks,
    })
}

fn parse_snapshot_json(data: &[u8]) -> Result<ParsedSnapshot, String> {
    let doc: Value = serde_json::from_slice(data).map_err(|e| format!("invalid JSON: {e}"))?;
    let obj = doc.as_object().ok_or("snapshot is not a JSON object")?;
    let field = |names: &[&str]| names.iter().find_map(|n| obj.get(*n));

    let timestamps: Vec<Timestamp> = match field(&["timestamps", "timestamp"]) {
        Some(Value::Array(items)) => items.iter().map(timestamp_from_value).collect::<Result<_, _>>()?,
        Some(single) => vec![timestamp_from_value(single)?],
        None => return Err("missing `timestamp`".to_string()),
    };
    if timestamps.is_empty() {
        return Err("`timestamps` is empty".to_string());
    }

    let bids = levels_from_value(field(&["bids", "bid"]).ok_or("missing `bids`")?)?;
    let asks = levels_from_value(field(&["asks", "ask"]).ok_or("missing `asks`")?)?;

    Ok(ParsedSnapshot { timestamps, bids, asks })
}
