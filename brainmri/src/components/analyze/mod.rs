//! Dataset analysis: metadata table, quality/format report, class-balance
//! report, descriptive statistics with charts, and a random sample grid.
//!
//! Every I/O or decode error aborts the analysis. A corrupt image is never
//! skipped.

pub mod balance;
pub mod metadata;
pub mod quality;
pub mod samples;
pub mod stats;

pub use balance::{BalanceLevel, ClassCounts};
pub use metadata::{discover_classes, inspect_image, ClassDirectory, ImageMetadata};
pub use quality::{FormatIssue, QualityReport};
pub use stats::{ColumnStats, DatasetStats, GroupStats};

use crate::config::AnalyzeDataConfig;
use crate::errors::Result;
use crate::utils::{create_directories, write_text};
use tracing::{error, info, warn};

/// Text written to the counts report when no class directory exists.
pub const NO_CLASSES_MESSAGE: &str = "No class directories found.";

/// Summary of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// One row per image.
    pub metadata: Vec<ImageMetadata>,
    /// Quality and format findings.
    pub quality: QualityReport,
    /// Images per class.
    pub counts: ClassCounts,
    /// Balance level, `None` without classes.
    pub balance: Option<BalanceLevel>,
    /// Aggregated statistics.
    pub stats: DatasetStats,
    /// Whether the sample grid was written.
    pub sample_grid_written: bool,
}

/// Analyzes a labeled image tree.
#[derive(Debug, Clone)]
pub struct AnalyzeImageData {
    config: AnalyzeDataConfig,
}

impl AnalyzeImageData {
    /// Creates the component.
    #[must_use]
    pub fn new(config: AnalyzeDataConfig) -> Self {
        Self { config }
    }

    /// Runs every analysis step in order and writes all artifacts.
    pub fn analyze(&self) -> Result<AnalysisReport> {
        self.analyze_inner().map_err(|e| {
            error!(error = %e, "Error running image analysis");
            e
        })
    }

    fn analyze_inner(&self) -> Result<AnalysisReport> {
        let config = &self.config;
        create_directories(&[&config.plots_path])?;

        let classes = discover_classes(&config.data_folder)?;
        info!(
            classes = classes.len(),
            root = %config.data_folder.display(),
            "Discovered class directories"
        );

        let metadata = metadata::collect_metadata(&classes)?;
        metadata::write_metadata_csv(&config.image_metadata_path, &metadata)?;
        info!("Image metadata saved to: {}", config.image_metadata_path.display());

        let stats = DatasetStats::from_metadata(&metadata);
        stats.log();
        write_text(&config.image_stats_results_path, &stats.render())?;
        info!("Saved results to {}", config.image_stats_results_path.display());
        stats::write_charts(&stats, &metadata, &config.plots_path)?;

        let quality = QualityReport::check(&metadata, &config.allowed_formats);
        write_text(&config.image_quality_and_format, &quality.render())?;
        info!(
            quality_issues = quality.quality_issues.len(),
            format_issues = quality.format_issues.len(),
            "Image quality and format check saved to: {}",
            config.image_quality_and_format.display()
        );

        let mut counts = ClassCounts::default();
        for class in &classes {
            counts.add(&class.label, class.files.len());
        }
        let balance = counts.level();
        let counts_text = counts.render().unwrap_or_else(|| {
            warn!("No class directories under {}", config.data_folder.display());
            format!("{NO_CLASSES_MESSAGE}\n")
        });
        write_text(&config.image_counts_path, &counts_text)?;
        info!(
            "Image counts and class balance information saved to: {}",
            config.image_counts_path.display()
        );

        let sample_grid_written = samples::write_sample_grid(
            &classes,
            config.samples_per_class,
            &config.image_samples_path,
            &mut rand::thread_rng(),
        )?;

        Ok(AnalysisReport {
            metadata,
            quality,
            counts,
            balance,
            stats,
            sample_grid_written,
        })
    }
}
