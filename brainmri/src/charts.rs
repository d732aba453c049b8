//! SVG chart rendering.
//!
//! Produces the dataset charts of the analysis stage and the training curves
//! of the transfer-learning stage as standalone SVG documents.

use crate::errors::{PipelineError, Result};
use crate::utils::ensure_parent;
use std::f64::consts::PI;
use std::path::Path;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 90.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Palette cycled through for bars, slices and series.
pub const PALETTE: [&str; 8] = [
    "#3498db", "#e74c3c", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#34495e", "#e67e22",
];

/// A point of a line series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    /// Horizontal value.
    pub x: f64,
    /// Vertical value.
    pub y: f64,
}

/// A named line series.
#[derive(Debug, Clone)]
pub struct DataSeries {
    /// Legend entry.
    pub name: String,
    /// Points in drawing order.
    pub points: Vec<DataPoint>,
    /// Stroke color.
    pub color: String,
}

impl DataSeries {
    /// Builds a series from per-epoch values, numbering epochs from 1.
    #[must_use]
    pub fn from_epochs(name: impl Into<String>, values: &[f64], color: &str) -> Self {
        Self {
            name: name.into(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: (i + 1) as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// A labeled value for bar and pie charts.
#[derive(Debug, Clone)]
pub struct BarData {
    /// Category label.
    pub label: String,
    /// Category value.
    pub value: f64,
}

/// One histogram bin, `[start, end)` except for the last, which is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    /// Lower edge.
    pub start: f64,
    /// Upper edge.
    pub end: f64,
    /// Number of values in the bin.
    pub count: usize,
}

/// Splits `values` into `bins` equal-width bins spanning their range.
///
/// A degenerate range (all values equal) is widened to `value ± 0.5`.
#[must_use]
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut result: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count: 0,
        })
        .collect();
    for &v in values {
        let index = (((v - lo) / width).floor() as usize).min(bins - 1);
        result[index].count += 1;
    }
    result
}

/// Renders a bar chart.
pub fn bar_chart(title: &str, x_label: &str, y_label: &str, bars: &[BarData], path: &Path) -> Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let y_max = nice_max(bars.iter().map(|b| b.value).fold(0.0, f64::max));

    let mut svg = open_svg(title);
    push_y_grid(&mut svg, 0.0, y_max, plot_width, plot_height);
    push_axes(&mut svg, x_label, y_label, plot_width, plot_height);

    if !bars.is_empty() {
        let slot = plot_width / bars.len() as f64;
        let bar_width = slot * 0.7;
        for (i, bar) in bars.iter().enumerate() {
            let height = if y_max > 0.0 { bar.value / y_max * plot_height } else { 0.0 };
            let x = MARGIN_LEFT + slot * i as f64 + (slot - bar_width) / 2.0;
            let y = MARGIN_TOP + plot_height - height;
            svg.push_str(&format!(
                r#"<rect x="{x:.2}" y="{y:.2}" width="{bar_width:.2}" height="{height:.2}" fill="{}"/>"#,
                PALETTE[i % PALETTE.len()]
            ));
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{COLOR_TEXT}">{}</text>"#,
                x + bar_width / 2.0,
                y - 6.0,
                format_value(bar.value)
            ));
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{COLOR_TEXT}">{}</text>"#,
                x + bar_width / 2.0,
                MARGIN_TOP + plot_height + 20.0,
                escape_xml(&bar.label)
            ));
        }
    }

    close_and_write(svg, path)
}

/// Renders a pie chart with percentage labels.
pub fn pie_chart(title: &str, slices: &[BarData], path: &Path) -> Result<()> {
    let total: f64 = slices.iter().map(|s| s.value).sum();
    let (cx, cy, r) = (CHART_WIDTH / 2.0 - 80.0, CHART_HEIGHT / 2.0 + 20.0, 170.0);

    let mut svg = open_svg(title);
    let mut angle = -PI / 2.0;
    for (i, slice) in slices.iter().enumerate() {
        if total <= 0.0 || slice.value <= 0.0 {
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        let fraction = slice.value / total;
        let sweep = fraction * 2.0 * PI;

        if (fraction - 1.0).abs() < f64::EPSILON {
            svg.push_str(&format!(r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{color}"/>"#));
        } else {
            let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
            let end = angle + sweep;
            let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
            let large_arc = u8::from(sweep > PI);
            svg.push_str(&format!(
                r#"<path d="M {cx} {cy} L {x1:.2} {y1:.2} A {r} {r} 0 {large_arc} 1 {x2:.2} {y2:.2} Z" fill="{color}" stroke="white" stroke-width="2"/>"#
            ));
        }

        let mid = angle + sweep / 2.0;
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="Arial, sans-serif" font-size="13" fill="white">{:.1}%</text>"#,
            cx + r * 0.6 * mid.cos(),
            cy + r * 0.6 * mid.sin() + 4.0,
            fraction * 100.0
        ));
        angle += sweep;
    }

    let mut legend_y = MARGIN_TOP + 20.0;
    for (i, slice) in slices.iter().enumerate() {
        push_legend_entry(&mut svg, CHART_WIDTH - 220.0, legend_y, PALETTE[i % PALETTE.len()], &slice.label);
        legend_y += 25.0;
    }

    close_and_write(svg, path)
}

/// Renders a histogram of `values` with `bins` equal-width bins.
pub fn histogram(title: &str, x_label: &str, values: &[f64], bins: usize, path: &Path) -> Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let bins = histogram_bins(values, bins);
    let y_max = nice_max(bins.iter().map(|b| b.count as f64).fold(0.0, f64::max));

    let mut svg = open_svg(title);
    push_y_grid(&mut svg, 0.0, y_max, plot_width, plot_height);
    push_axes(&mut svg, x_label, "Frequency", plot_width, plot_height);

    if let (Some(first), Some(last)) = (bins.first(), bins.last()) {
        let span = last.end - first.start;
        for bin in &bins {
            let x = MARGIN_LEFT + (bin.start - first.start) / span * plot_width;
            let width = (bin.end - bin.start) / span * plot_width;
            let height = if y_max > 0.0 { bin.count as f64 / y_max * plot_height } else { 0.0 };
            svg.push_str(&format!(
                r#"<rect x="{x:.2}" y="{:.2}" width="{width:.2}" height="{height:.2}" fill="{}" stroke="white" stroke-width="1"/>"#,
                MARGIN_TOP + plot_height - height,
                PALETTE[0]
            ));
        }
        for (value, x) in [(first.start, MARGIN_LEFT), (last.end, MARGIN_LEFT + plot_width)] {
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{:.2}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{COLOR_TEXT}">{}</text>"#,
                MARGIN_TOP + plot_height + 20.0,
                format_value(value)
            ));
        }
    }

    close_and_write(svg, path)
}

/// Renders one or more line series against a shared y range.
pub fn line_chart(title: &str, x_label: &str, y_label: &str, series: &[DataSeries], path: &Path) -> Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let (x_min, x_max, y_min, y_max) = find_ranges(series);
    let (y_min, y_max) = if y_max - y_min < f64::EPSILON {
        (y_min - 0.5, y_max + 0.5)
    } else {
        (y_min.min(0.0), y_max)
    };
    let x_span = if x_max - x_min < f64::EPSILON { 1.0 } else { x_max - x_min };

    let project = |p: &DataPoint| {
        (
            MARGIN_LEFT + (p.x - x_min) / x_span * plot_width,
            MARGIN_TOP + plot_height - (p.y - y_min) / (y_max - y_min) * plot_height,
        )
    };

    let mut svg = open_svg(title);
    push_y_grid(&mut svg, y_min, y_max, plot_width, plot_height);
    push_axes(&mut svg, x_label, y_label, plot_width, plot_height);

    for s in series.iter().filter(|s| !s.points.is_empty()) {
        let path_data = s
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (x, y) = project(p);
                format!("{} {x:.2} {y:.2}", if i == 0 { "M" } else { "L" })
            })
            .collect::<Vec<_>>()
            .join(" ");
        svg.push_str(&format!(
            r#"<path d="{path_data}" fill="none" stroke="{}" stroke-width="3"/>"#,
            s.color
        ));
        for p in &s.points {
            let (x, y) = project(p);
            svg.push_str(&format!(
                r#"<circle cx="{x:.2}" cy="{y:.2}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                s.color
            ));
        }
    }

    if let Some(first) = series.iter().find(|s| !s.points.is_empty()) {
        for p in &first.points {
            let (x, _) = project(p);
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{:.2}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{COLOR_TEXT}">{:.0}</text>"#,
                MARGIN_TOP + plot_height + 20.0,
                p.x
            ));
        }
    }

    let mut legend_y = MARGIN_TOP + 10.0;
    for s in series {
        push_legend_entry(&mut svg, CHART_WIDTH - MARGIN_RIGHT - 150.0, legend_y, &s.color, &s.name);
        legend_y += 25.0;
    }

    close_and_write(svg, path)
}

/// Escapes text for inclusion in SVG markup.
#[must_use]
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn open_svg(title: &str) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" width="{CHART_WIDTH}" height="{CHART_HEIGHT}">"#
    );
    svg.push_str(&format!(
        r#"<rect width="{CHART_WIDTH}" height="{CHART_HEIGHT}" fill="white"/>"#
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{COLOR_TEXT}">{}</text>"#,
        CHART_WIDTH / 2.0,
        escape_xml(title)
    ));
    svg
}

fn close_and_write(mut svg: String, path: &Path) -> Result<()> {
    svg.push_str("</svg>\n");
    ensure_parent(path)?;
    std::fs::write(path, svg).map_err(|e| PipelineError::io(path, e))
}

fn push_y_grid(svg: &mut String, y_min: f64, y_max: f64, plot_width: f64, plot_height: f64) {
    for i in 0..=5 {
        let fraction = f64::from(i) / 5.0;
        let y = MARGIN_TOP + plot_height - fraction * plot_height;
        let value = y_min + fraction * (y_max - y_min);
        svg.push_str(&format!(
            r#"<line x1="{MARGIN_LEFT}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{COLOR_GRID}" stroke-width="1"/>"#,
            MARGIN_LEFT + plot_width
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{:.2}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{COLOR_TEXT}">{}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            format_value(value)
        ));
    }
}

fn push_axes(svg: &mut String, x_label: &str, y_label: &str, plot_width: f64, plot_height: f64) {
    let bottom = MARGIN_TOP + plot_height;
    svg.push_str(&format!(
        r#"<line x1="{MARGIN_LEFT}" y1="{bottom}" x2="{}" y2="{bottom}" stroke="{COLOR_AXIS}" stroke-width="2"/>"#,
        MARGIN_LEFT + plot_width
    ));
    svg.push_str(&format!(
        r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{bottom}" stroke="{COLOR_AXIS}" stroke-width="2"/>"#
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{COLOR_TEXT}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 25.0,
        escape_xml(x_label)
    ));
    let mid = CHART_HEIGHT / 2.0;
    svg.push_str(&format!(
        r#"<text x="20" y="{mid}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{COLOR_TEXT}" transform="rotate(-90 20 {mid})">{}</text>"#,
        escape_xml(y_label)
    ));
}

fn push_legend_entry(svg: &mut String, x: f64, y: f64, color: &str, label: &str) {
    svg.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="15" height="15" fill="{color}"/>"#
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{COLOR_TEXT}">{}</text>"#,
        x + 20.0,
        y + 12.0,
        escape_xml(label)
    ));
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if x_min.is_infinite() {
        return (0.0, 1.0, 0.0, 1.0);
    }
    (x_min, x_max, y_min, y_max)
}

/// Rounds an axis maximum up so the grid has readable labels.
fn nice_max(value: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    let magnitude = 10_f64.powf(value.log10().floor());
    let step = magnitude / 2.0;
    (value / step).ceil() * step
}

fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
