//! Class discovery, header inspection and the metadata table.

use crate::errors::{PipelineError, Result};
use crate::utils::ensure_parent;
use image::{ColorType, ImageDecoder, ImageReader};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Columns of the metadata CSV.
pub const METADATA_COLUMNS: [&str; 5] = ["File Path", "class", "Width", "Height", "Channels"];

/// A directory whose direct children include files, labeled by its basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDirectory {
    /// Class label.
    pub label: String,
    /// Directory path.
    pub path: PathBuf,
    /// Files directly inside the directory, sorted.
    pub files: Vec<PathBuf>,
}

/// Walks `root` once and returns every directory that directly contains
/// files, in sorted path order.
pub fn discover_classes(root: &Path) -> Result<Vec<ClassDirectory>> {
    let mut classes = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut files = Vec::new();
        for child in WalkDir::new(entry.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let child = child.map_err(|e| walk_error(entry.path(), e))?;
            if child.file_type().is_file() {
                files.push(child.into_path());
            }
        }
        if files.is_empty() {
            continue;
        }
        let label = entry
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(class = %label, images = files.len(), "Discovered class directory");
        classes.push(ClassDirectory {
            label,
            path: entry.into_path(),
            files,
        });
    }
    Ok(classes)
}

fn walk_error(root: &Path, err: walkdir::Error) -> PipelineError {
    let path = err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
    PipelineError::io(path, source)
}

/// Header-level facts about one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Image path.
    pub path: PathBuf,
    /// Class label.
    pub class: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color mode name (`RGB`, `L`, `I;16`, ...).
    pub mode: String,
    /// Band names derived from the mode.
    pub bands: Vec<String>,
    /// Container format (`PNG`, `JPEG`, ...), if recognized.
    pub format: Option<String>,
}

impl ImageMetadata {
    /// Number of color bands.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.bands.len()
    }
}

/// Reads dimensions and color layout from the image header without decoding
/// pixel data.
pub fn inspect_image(path: &Path, class: &str) -> Result<ImageMetadata> {
    let reader = ImageReader::open(path)
        .map_err(|e| PipelineError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::io(path, e))?;
    let format = reader.format().map(|f| format!("{f:?}").to_ascii_uppercase());
    let decoder = reader.into_decoder().map_err(|e| PipelineError::image(path, e))?;
    let (width, height) = decoder.dimensions();
    let mode = mode_name(decoder.color_type());

    Ok(ImageMetadata {
        path: path.to_path_buf(),
        class: class.to_string(),
        width,
        height,
        bands: bands_for_mode(mode).iter().map(|b| (*b).to_string()).collect(),
        mode: mode.to_string(),
        format,
    })
}

/// Maps a decoder color type onto the conventional mode vocabulary.
#[must_use]
pub fn mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "UNKNOWN",
    }
}

/// Band names of a mode.
#[must_use]
pub fn bands_for_mode(mode: &str) -> &'static [&'static str] {
    match mode {
        "L" => &["L"],
        "P" => &["P"],
        "I;16" => &["I"],
        "LA" | "LA;16" => &["L", "A"],
        "RGB" | "RGB;16" | "RGB;F" => &["R", "G", "B"],
        "RGBA" | "RGBA;16" | "RGBA;F" => &["R", "G", "B", "A"],
        _ => &[],
    }
}

/// Inspects every file of every class, sorted by class then path.
pub fn collect_metadata(classes: &[ClassDirectory]) -> Result<Vec<ImageMetadata>> {
    let mut rows = Vec::new();
    for class in classes {
        for file in &class.files {
            rows.push(inspect_image(file, &class.label)?);
        }
    }
    rows.sort_by(|a, b| a.class.cmp(&b.class).then_with(|| a.path.cmp(&b.path)));
    Ok(rows)
}

/// Writes the header and one record per image.
pub fn write_metadata<W: Write>(writer: &mut csv::Writer<W>, rows: &[ImageMetadata]) -> Result<()> {
    writer.write_record(METADATA_COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.path.to_string_lossy().as_ref(),
            row.class.as_str(),
            &row.width.to_string(),
            &row.height.to_string(),
            &row.channels().to_string(),
        ])?;
    }
    Ok(())
}

/// Writes the metadata CSV to `path`.
pub fn write_metadata_csv(path: &Path, rows: &[ImageMetadata]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    write_metadata(&mut writer, rows)?;
    writer.flush().map_err(|e| PipelineError::io(path, e))
}
