//! Depth-bar geometry for the rendering sink.

use crate::book::PriceLevels;

/// Side colour of a depth bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotColor {
    Green,
    Red,
}

impl PlotColor {
    /// RGB used by raster sinks.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            PlotColor::Green => [0, 160, 60],
            PlotColor::Red => [200, 40, 40],
        }
    }
}

/// One horizontal bar: a surviving level spanning update slots `xmin..xmax`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotSegment {
    pub y: f64,
    pub xmin: usize,
    pub xmax: usize,
    pub color: PlotColor,
}

/// Append one segment per level in `levels`.
///
/// `y` is the level price scaled by the caller's side `tier`; bars span
/// `0..count`. Bids are green, asks red. `levels` is not modified.
pub fn get_plot_values(
    levels: &PriceLevels,
    segments: &mut Vec<PlotSegment>,
    tier: f64,
    is_bid: bool,
    count: usize,
) {
    let color = if is_bid { PlotColor::Green } else { PlotColor::Red };
    segments.reserve(levels.len());
    segments.extend(levels.keys().map(|price| PlotSegment {
        y: price.to_f64() * tier,
        xmin: 0,
        xmax: count,
        color,
    }));
}
