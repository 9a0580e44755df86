//! Rendering sink: consumes a finished window and produces an image.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;

use crate::engine::TimeSeries;
use crate::plot::PlotSegment;

/// Everything the sink needs from one reconstructed window.
#[derive(Debug, Clone)]
pub struct WindowReport {
    /// Window label, e.g. `0-4`.
    pub label: String,
    pub output: PathBuf,
    /// Update slots filled by the engine.
    pub count: usize,
    /// Seed slot plus `count` update slots.
    pub series: TimeSeries,
    pub segments: Vec<PlotSegment>,
    pub bid_levels: usize,
    pub ask_levels: usize,
    /// Monotonic send time, used for queueing latency.
    pub sent_ns: u64,
}

/// Destination for finished windows.
pub trait PlotSink {
    fn render(&mut self, report: &WindowReport) -> anyhow::Result<()>;
}

const BACKGROUND: [u8; 3] = [16, 16, 16];
const MID: [u8; 3] = [230, 200, 0];
const BID: [u8; 3] = [0, 220, 90];
const ASK: [u8; 3] = [240, 60, 60];

/// Writes a binary PPM (P6) chart: depth bars, mid-price, best bid, best ask.
#[derive(Debug, Clone, Copy)]
pub struct PpmRenderer {
    pub width: usize,
    pub height: usize,
    pub margin: usize,
}

impl Default for PpmRenderer {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 1250,
            margin: 20,
        }
    }
}

struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        let mut pixels = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            pixels.extend_from_slice(&BACKGROUND);
        }
        Self { width, height, pixels }
    }

    #[inline]
    fn set(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let idx = (y as usize * self.width + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Bresenham line.
    fn line(&mut self, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64), rgb: [u8; 3]) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.set(x0, y0, rgb);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        out.write_all(&self.pixels)
    }
}

/// Maps slot indices and prices onto pixel coordinates.
struct Viewport {
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
    slots: f64,
    lo: f64,
    hi: f64,
}

impl Viewport {
    fn new(renderer: &PpmRenderer, series: &TimeSeries) -> Self {
        let prices = series.best_bids.iter().chain(&series.best_asks).copied();
        let (mut lo, mut hi) = prices.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p), hi.max(p)));
        if !lo.is_finite() || !hi.is_finite() {
            (lo, hi) = (0.0, 1.0);
        }
        let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.01 };
        let margin = renderer.margin as f64;
        Self {
            left: margin,
            top: margin,
            plot_w: (renderer.width as f64 - 2.0 * margin).max(1.0),
            plot_h: (renderer.height as f64 - 2.0 * margin).max(1.0),
            slots: series.best_bids.len().saturating_sub(1).max(1) as f64,
            lo: lo - pad,
            hi: hi + pad,
        }
    }

    fn contains(&self, price: f64) -> bool {
        price >= self.lo && price <= self.hi
    }

    fn x(&self, slot: usize) -> i64 {
        (self.left + slot as f64 / self.slots * self.plot_w).round() as i64
    }

    fn y(&self, price: f64) -> i64 {
        (self.top + (self.hi - price) / (self.hi - self.lo) * self.plot_h).round() as i64
    }
}

impl PpmRenderer {
    fn draw(&self, report: &WindowReport) -> Canvas {
        let mut canvas = Canvas::new(self.width, self.height);
        let view = Viewport::new(self, &report.series);

        for seg in report.segments.iter().filter(|s| view.contains(s.y)) {
            let dim = seg.color.rgb().map(|c| c / 3);
            let y = view.y(seg.y);
            canvas.line((view.x(seg.xmin), y), (view.x(seg.xmax), y), dim);
        }

        let series = &report.series;
        for (values, rgb) in [(&series.mid_price, MID), (&series.best_bids, BID), (&series.best_asks, ASK)] {
            let points: Vec<(i64, i64)> = values.iter().enumerate().map(|(i, &v)| (view.x(i), view.y(v))).collect();
            match points.as_slice() {
                [single] => canvas.set(single.0, single.1, rgb),
                _ => {
                    for pair in points.windows(2) {
                        canvas.line(pair[0], pair[1], rgb);
                    }
                }
            }
        }
        canvas
    }
}

impl PlotSink for PpmRenderer {
    fn render(&mut self, report: &WindowReport) -> anyhow::Result<()> {
        let canvas = self.draw(report);
        if let Some(dir) = report.output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = File::create(&report.output).with_context(|| format!("creating {}", report.output.display()))?;
        let mut out = BufWriter::new(file);
        canvas.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::PlotColor;

    fn report(output: PathBuf) -> WindowReport {
        WindowReport {
            label: "0-4".to_string(),
            output,
            count: 2,
            series: TimeSeries {
                best_bids: vec![100.0, 99.0, 99.0],
                best_asks: vec![101.0, 101.0, 101.0],
                mid_price: vec![100.5, 100.0, 100.0],
            },
            segments: vec![
                PlotSegment {
                    y: 99.0,
                    xmin: 0,
                    xmax: 2,
                    color: PlotColor::Green,
                },
                PlotSegment {
                    y: 500.0,
                    xmin: 0,
                    xmax: 2,
                    color: PlotColor::Red,
                },
            ],
            bid_levels: 1,
            ask_levels: 1,
            sent_ns: 0,
        }
    }

    #[test]
    fn test_writes_ppm_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.ppm");
        let mut renderer = PpmRenderer {
            width: 40,
            height: 30,
            margin: 2,
        };
        renderer.render(&report(path.clone())).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = b"P6\n40 30\n255\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 40 * 30 * 3);
    }

    #[test]
    fn test_draws_series_colours() {
        let renderer = PpmRenderer {
            width: 40,
            height: 30,
            margin: 2,
        };
        let canvas = renderer.draw(&report(PathBuf::from("unused.ppm")));
        let has = |rgb: [u8; 3]| canvas.pixels.chunks(3).any(|px| px == rgb.as_slice());
        assert!(has(BID));
        assert!(has(ASK));
        assert!(has(MID));
    }

    #[test]
    fn test_line_stays_in_bounds() {
        let mut canvas = Canvas::new(5, 5);
        canvas.line((-10, -10), (20, 20), BID);
        assert_eq!(canvas.pixels.len(), 5 * 5 * 3);
        assert_eq!(&canvas.pixels[0..3], &BID);
    }
}
