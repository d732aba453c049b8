//! Descriptive statistics and dataset charts.

use super::metadata::ImageMetadata;
use crate::charts::{self, BarData};
use crate::errors::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Min, max, mean and sample standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (`n - 1`); NaN for fewer than two values.
    pub std: f64,
}

impl ColumnStats {
    /// Computes the statistics. Every field is NaN for empty input.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() < 2 {
            f64::NAN
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        Self {
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std,
        }
    }
}

/// Width, height and channel statistics for a group of images.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    /// Width column.
    pub width: ColumnStats,
    /// Height column.
    pub height: ColumnStats,
    /// Channel-count column.
    pub channels: ColumnStats,
    /// Number of images.
    pub count: usize,
}

impl GroupStats {
    fn from_rows<'a>(rows: impl Iterator<Item = &'a ImageMetadata> + Clone) -> Self {
        let widths: Vec<f64> = rows.clone().map(|r| f64::from(r.width)).collect();
        let heights: Vec<f64> = rows.clone().map(|r| f64::from(r.height)).collect();
        let channels: Vec<f64> = rows.map(|r| r.channels() as f64).collect();
        Self {
            width: ColumnStats::from_values(&widths),
            height: ColumnStats::from_values(&heights),
            channels: ColumnStats::from_values(&channels),
            count: widths.len(),
        }
    }
}

/// Overall and per-class statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    /// Every image.
    pub overall: GroupStats,
    /// One entry per class label, sorted.
    pub per_class: BTreeMap<String, GroupStats>,
}

impl DatasetStats {
    /// Aggregates the metadata table.
    #[must_use]
    pub fn from_metadata(rows: &[ImageMetadata]) -> Self {
        let mut labels: Vec<&str> = rows.iter().map(|r| r.class.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();

        let per_class = labels
            .into_iter()
            .map(|label| {
                let stats = GroupStats::from_rows(rows.iter().filter(|r| r.class == label));
                (label.to_string(), stats)
            })
            .collect();

        Self {
            overall: GroupStats::from_rows(rows.iter()),
            per_class,
        }
    }

    /// Renders the statistics text file.
    #[must_use]
    pub fn render(&self) -> String {
        let o = &self.overall;
        let mut out = String::from("Overall Statistics:\n");
        out.push_str(&format!("Min width: {}\n", fmt_int(o.width.min)));
        out.push_str(&format!("Max width: {}\n", fmt_int(o.width.max)));
        out.push_str(&format!("Average width: {}\n", fmt2(o.width.mean)));
        out.push_str(&format!("Width standard deviation: {}\n", fmt2(o.width.std)));
        out.push_str(&format!("Average height: {}\n", fmt2(o.height.mean)));
        out.push_str(&format!("Height standard deviation: {}\n", fmt2(o.height.std)));
        out.push_str(&format!("Average channels: {}\n", fmt2(o.channels.mean)));
        out.push_str(&format!("Channels standard deviation: {}\n\n", fmt2(o.channels.std)));

        out.push_str("Per-Class Statistics:\n");
        for (label, s) in &self.per_class {
            out.push_str(&format!("Class: {label}\n"));
            for (name, column) in [("Width", &s.width), ("Height", &s.height), ("Channels", &s.channels)] {
                out.push_str(&format!("{name} Min: {}\n", fmt_int(column.min)));
                out.push_str(&format!("{name} Max: {}\n", fmt_int(column.max)));
                out.push_str(&format!("{name} Mean: {}\n", fmt2(column.mean)));
                out.push_str(&format!("{name} Standard Deviation: {}\n", fmt2(column.std)));
            }
            out.push_str(&format!("Image Count: {}\n\n", s.count));
        }
        out
    }

    /// Logs one summary line overall and one per class.
    pub fn log(&self) {
        let o = &self.overall;
        info!(
            "Overall statistics: Min width={}, Max width={}, Avg width={}, Width std={}, Avg height={}, Height std={}, Avg channels={}, Channels std={}",
            fmt_int(o.width.min),
            fmt_int(o.width.max),
            fmt2(o.width.mean),
            fmt2(o.width.std),
            fmt2(o.height.mean),
            fmt2(o.height.std),
            fmt2(o.channels.mean),
            fmt2(o.channels.std)
        );
        for (label, s) in &self.per_class {
            info!(
                class = %label,
                count = s.count,
                "Class: {label}, Width Mean={}, Height Mean={}, Channels Mean={}",
                fmt2(s.width.mean),
                fmt2(s.height.mean),
                fmt2(s.channels.mean)
            );
        }
    }
}

/// File names of the five charts, in the order they are written.
pub const CHART_FILES: [&str; 5] = [
    "image_stats_bar.svg",
    "image_stats_pie.svg",
    "image_stats_width_distribution.svg",
    "image_stats_height_distribution.svg",
    "image_stats_channels_distribution.svg",
];

/// Writes the five dataset charts into `plots_dir` and returns their paths.
pub fn write_charts(stats: &DatasetStats, rows: &[ImageMetadata], plots_dir: &Path) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = CHART_FILES.iter().map(|f| plots_dir.join(f)).collect();
    let bars: Vec<BarData> = stats
        .per_class
        .iter()
        .map(|(label, s)| BarData {
            label: label.clone(),
            value: s.count as f64,
        })
        .collect();

    charts::bar_chart("Image Statistics by Class", "Class", "Number of Images", &bars, &paths[0])?;
    info!("Saved bar plot to {}", paths[0].display());

    charts::pie_chart("Image Distribution by Class", &bars, &paths[1])?;
    info!("Saved pie chart to {}", paths[1].display());

    let widths: Vec<f64> = rows.iter().map(|r| f64::from(r.width)).collect();
    charts::histogram("Image Width Distribution", "Width", &widths, 30, &paths[2])?;
    info!("Saved width distribution plot to {}", paths[2].display());

    let heights: Vec<f64> = rows.iter().map(|r| f64::from(r.height)).collect();
    charts::histogram("Image Height Distribution", "Height", &heights, 30, &paths[3])?;
    info!("Saved height distribution plot to {}", paths[3].display());

    let channels: Vec<f64> = rows.iter().map(|r| r.channels() as f64).collect();
    charts::histogram("Image Channels Distribution", "Channels", &channels, 10, &paths[4])?;
    info!("Saved channels distribution plot to {}", paths[4].display());

    Ok(paths)
}

fn fmt2(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value:.2}")
    }
}

fn fmt_int(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(class: &str, width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            path: PathBuf::from(format!("{class}/{width}x{height}.png")),
            class: class.into(),
            width,
            height,
            mode: "RGB".into(),
            bands: vec!["R".into(), "G".into(), "B".into()],
            format: Some("PNG".into()),
        }
    }

    #[test]
    fn test_column_stats_sample_std() {
        let stats = ColumnStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std - 2.138_089_935).abs() < 1e-6);
        assert!((stats.min - 2.0).abs() < f64::EPSILON);
        assert!((stats.max - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_value_std_is_nan() {
        let stats = ColumnStats::from_values(&[3.0]);
        assert!(stats.std.is_nan());
        assert_eq!(fmt2(stats.std), "nan");
    }

    #[test]
    fn test_render_contains_overall_and_class_sections() {
        let rows = vec![row("no", 10, 20), row("no", 30, 40), row("yes", 50, 60)];
        let text = DatasetStats::from_metadata(&rows).render();

        assert!(text.starts_with("Overall Statistics:\nMin width: 10\nMax width: 50\nAverage width: 30.00\n"));
        assert!(text.contains("Class: no\nWidth Min: 10\nWidth Max: 30\nWidth Mean: 20.00\n"));
        assert!(text.contains("Class: yes\n"));
        assert!(text.contains("Width Standard Deviation: nan\n"));
        assert!(text.contains("Image Count: 2\n\n"));
    }

    #[test]
    fn test_write_charts_produces_five_files() {
        let dir = TempDir::new().unwrap();
        let rows = vec![row("no", 10, 20), row("yes", 30, 40)];
        let stats = DatasetStats::from_metadata(&rows);

        let paths = write_charts(&stats, &rows, dir.path()).unwrap();

        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.exists()));
    }
}
