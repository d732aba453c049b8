//! Color-layout and container-format checks.

use super::metadata::ImageMetadata;
use std::path::PathBuf;

/// Band layouts accepted without a quality warning.
pub const ALLOWED_BANDS: [&[&str]; 4] = [&["R", "G", "B"], &["R", "G", "B", "A"], &["L"], &["P"]];

/// Color modes accepted without a format warning.
pub const ALLOWED_MODES: [&str; 4] = ["RGB", "RGBA", "L", "P"];

/// Why an image was listed in the format section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatIssue {
    /// The color mode is outside [`ALLOWED_MODES`].
    Mode {
        /// Image path.
        path: PathBuf,
        /// Offending mode.
        mode: String,
    },
    /// The container format is not in the configured allow-list.
    Container {
        /// Image path.
        path: PathBuf,
        /// Detected format, `UNKNOWN` if unrecognized.
        format: String,
    },
}

impl std::fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mode { path, mode } => write!(f, "{}: mode {mode}", path.display()),
            Self::Container { path, format } => write!(f, "{}: format {format}", path.display()),
        }
    }
}

/// Outcome of the quality and format checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    /// Images whose band layout is not allowed, with their bands.
    pub quality_issues: Vec<(PathBuf, Vec<String>)>,
    /// Images with a disallowed mode or container.
    pub format_issues: Vec<FormatIssue>,
}

impl QualityReport {
    /// Runs both checks over `rows`. `allowed_formats` must be upper-case.
    #[must_use]
    pub fn check(rows: &[ImageMetadata], allowed_formats: &[String]) -> Self {
        let mut report = Self::default();
        for row in rows {
            if !has_allowed_bands(&row.bands) {
                report.quality_issues.push((row.path.clone(), row.bands.clone()));
            }
            if !ALLOWED_MODES.contains(&row.mode.as_str()) {
                report.format_issues.push(FormatIssue::Mode {
                    path: row.path.clone(),
                    mode: row.mode.clone(),
                });
            }
            let format = row.format.as_deref().unwrap_or("UNKNOWN");
            if !allowed_formats.iter().any(|f| f == format) {
                report.format_issues.push(FormatIssue::Container {
                    path: row.path.clone(),
                    format: format.to_string(),
                });
            }
        }
        report
    }

    /// Renders the text report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.quality_issues.is_empty() {
            out.push_str("No image quality issues found.\n");
        } else {
            out.push_str("Images with quality issues:\n");
            for (path, bands) in &self.quality_issues {
                out.push_str(&format!("{}: bands ({})\n", path.display(), bands.join(", ")));
            }
        }

        if self.format_issues.is_empty() {
            out.push_str("\nNo image format issues found.\n");
        } else {
            out.push_str("\nImages with format issues:\n");
            for issue in &self.format_issues {
                out.push_str(&format!("{issue}\n"));
            }
        }
        out
    }
}

fn has_allowed_bands(bands: &[String]) -> bool {
    ALLOWED_BANDS
        .iter()
        .any(|allowed| allowed.len() == bands.len() && allowed.iter().zip(bands).all(|(a, b)| a == b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::analyze::metadata::bands_for_mode;

    fn row(name: &str, mode: &str, format: &str) -> ImageMetadata {
        ImageMetadata {
            path: PathBuf::from(name),
            class: "c".into(),
            width: 1,
            height: 1,
            mode: mode.into(),
            bands: bands_for_mode(mode).iter().map(|b| (*b).to_string()).collect(),
            format: Some(format.into()),
        }
    }

    fn allowed() -> Vec<String> {
        vec!["JPEG".into(), "PNG".into()]
    }

    #[test]
    fn test_clean_images_produce_no_issues() {
        let report = QualityReport::check(&[row("a.png", "RGB", "PNG"), row("b.jpg", "L", "JPEG")], &allowed());
        assert_eq!(report, QualityReport::default());
        assert_eq!(
            report.render(),
            "No image quality issues found.\n\nNo image format issues found.\n"
        );
    }

    #[test]
    fn test_grayscale_alpha_is_quality_and_format_issue() {
        let report = QualityReport::check(&[row("la.png", "LA", "PNG")], &allowed());

        assert_eq!(report.quality_issues.len(), 1);
        assert_eq!(report.quality_issues[0].1, vec!["L", "A"]);
        assert_eq!(
            report.format_issues,
            vec![FormatIssue::Mode { path: "la.png".into(), mode: "LA".into() }]
        );
        assert!(report.render().contains("la.png: bands (L, A)"));
    }

    #[test]
    fn test_sixteen_bit_rgb_has_allowed_bands_but_bad_mode() {
        let report = QualityReport::check(&[row("deep.png", "RGB;16", "PNG")], &allowed());
        assert!(report.quality_issues.is_empty());
        assert_eq!(report.format_issues.len(), 1);
    }

    #[test]
    fn test_container_outside_allow_list() {
        let report = QualityReport::check(&[row("a.gif", "RGB", "GIF")], &allowed());
        assert_eq!(
            report.format_issues,
            vec![FormatIssue::Container { path: "a.gif".into(), format: "GIF".into() }]
        );
        assert!(report.render().contains("Images with format issues:\na.gif: format GIF\n"));
    }
}
