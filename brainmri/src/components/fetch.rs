//! Remote archive download and extraction.

use crate::config::FetchDataConfig;
use crate::errors::{PipelineError, Result};
use crate::utils::create_directories;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Downloads the dataset archive and unpacks it.
#[derive(Debug, Clone)]
pub struct FetchData {
    config: FetchDataConfig,
}

impl FetchData {
    /// Creates the component.
    #[must_use]
    pub fn new(config: FetchDataConfig) -> Self {
        Self { config }
    }

    /// Streams `data_url` to `<filepath>/file.zip` and returns that path.
    pub async fn download(&self) -> Result<PathBuf> {
        self.download_inner().await.map_err(|e| {
            error!(url = %self.config.data_url, error = %e, "Error downloading file");
            e
        })
    }

    async fn download_inner(&self) -> Result<PathBuf> {
        create_directories(&[&self.config.filepath])?;
        let target = self.config.archive_path();
        download_file(&self.config.data_url, &target).await?;
        Ok(target)
    }

    /// Extracts the downloaded archive into `extract_path` and returns it.
    pub fn extract(&self) -> Result<PathBuf> {
        self.extract_inner().map_err(|e| {
            error!(error = %e, "Error extracting file");
            e
        })
    }

    fn extract_inner(&self) -> Result<PathBuf> {
        let archive_path = self.config.archive_path();
        let destination = self.config.extract_path.clone();
        create_directories(&[&destination])?;

        let file = File::open(&archive_path).map_err(|e| PipelineError::io(&archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(&destination)?;

        info!(
            entries = archive.len(),
            "Extraction complete. Files extracted to {}",
            destination.display()
        );
        Ok(destination)
    }
}

/// Streams `url` to `target`, logging progress by whole percent.
pub async fn download_file(url: &str, target: &Path) -> Result<()> {
    info!("Downloading file from: {url}");
    info!("Saving file to: {}", target.display());

    let mut response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Download(format!("{url} returned HTTP {status}")));
    }

    let total = response.content_length();
    match total {
        Some(bytes) => info!("Total file size: {:.2} MB", bytes as f64 / BYTES_PER_MB),
        None => info!("Total file size unknown"),
    }

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| PipelineError::io(target, e))?;
    let mut progress = DownloadProgress::new(total);

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| PipelineError::io(target, e))?;
        if let Some(report) = progress.advance(chunk.len() as u64) {
            info!("{report}");
        }
    }
    file.flush().await.map_err(|e| PipelineError::io(target, e))?;

    info!("Download complete!");
    info!("File saved to: {}", target.display());
    Ok(())
}

/// Tracks download progress and decides when to report it.
///
/// With a known total, a report is produced each time the integer percentage
/// advances. Without one, every chunk reports the byte count.
#[derive(Debug, Clone)]
struct DownloadProgress {
    total: Option<u64>,
    downloaded: u64,
    last_percent: Option<u64>,
}

impl DownloadProgress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            last_percent: None,
        }
    }

    fn advance(&mut self, bytes: u64) -> Option<String> {
        self.downloaded += bytes;
        match self.total {
            Some(total) => {
                let percent = (self.downloaded.min(total) * 100) / total;
                if self.last_percent == Some(percent) {
                    return None;
                }
                self.last_percent = Some(percent);
                Some(format!("Downloaded {percent}% of the file"))
            }
            None => Some(format!("Downloaded {} bytes", self.downloaded)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;
    use std::io::Write;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, url: &str) -> FetchDataConfig {
        FetchDataConfig {
            root_dir: dir.path().join("data"),
            filepath: dir.path().join("data/download"),
            extract_path: dir.path().join("data/extracted"),
            data_url: url.to_string(),
        }
    }

    fn zip_bytes() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("brain/yes/img_1.txt", options).unwrap();
            writer.write_all(b"tumor").unwrap();
            writer.start_file("brain/no/img_1.txt", options).unwrap();
            writer.write_all(b"healthy").unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_progress_reports_each_percent_once() {
        let mut progress = DownloadProgress::new(Some(1000));
        assert_eq!(progress.advance(5).as_deref(), Some("Downloaded 0% of the file"));
        assert_eq!(progress.advance(2), None);
        assert_eq!(progress.advance(3).as_deref(), Some("Downloaded 1% of the file"));
        assert_eq!(progress.advance(990).as_deref(), Some("Downloaded 100% of the file"));
    }

    #[test]
    fn test_progress_without_length_reports_bytes() {
        let mut progress = DownloadProgress::new(None);
        assert_eq!(progress.advance(10).as_deref(), Some("Downloaded 10 bytes"));
        assert_eq!(progress.advance(5).as_deref(), Some("Downloaded 15 bytes"));
    }

    #[test]
    fn test_extract_unpacks_archive() {
        let dir = TempDir::new().unwrap();
        let fetch = FetchData::new(config_in(&dir, "http://unused"));
        std::fs::create_dir_all(dir.path().join("data/download")).unwrap();
        std::fs::write(dir.path().join("data/download/file.zip"), zip_bytes()).unwrap();

        let out = fetch.extract().unwrap();

        let content = std::fs::read_to_string(out.join("brain/yes/img_1.txt")).unwrap();
        assert_eq!(content, "tumor");
        assert!(out.join("brain/no/img_1.txt").exists());
    }

    #[test]
    fn test_extract_missing_archive_is_error() {
        let dir = TempDir::new().unwrap();
        let fetch = FetchData::new(config_in(&dir, "http://unused"));
        let err = fetch.extract().unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_extract_corrupt_archive_is_error() {
        let dir = TempDir::new().unwrap();
        let fetch = FetchData::new(config_in(&dir, "http://unused"));
        std::fs::create_dir_all(dir.path().join("data/download")).unwrap();
        std::fs::write(dir.path().join("data/download/file.zip"), b"not a zip").unwrap();

        let err = fetch.extract().unwrap_err();
        assert_eq!(err.kind(), "archive");
    }

    #[tokio::test]
    async fn test_download_writes_archive() {
        let dir = TempDir::new().unwrap();
        let body = zip_bytes();
        let url = serve_once("200 OK", body.clone(), "file.zip").await.unwrap();
        let fetch = FetchData::new(config_in(&dir, &url));

        let path = fetch.download().await.unwrap();

        assert_eq!(path, dir.path().join("data/download/file.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        fetch.extract().unwrap();
        assert!(dir.path().join("data/extracted/brain/yes/img_1.txt").exists());
    }

    #[tokio::test]
    async fn test_download_http_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("404 Not Found", b"missing".to_vec(), "file.zip").await.unwrap();
        let fetch = FetchData::new(config_in(&dir, &url));

        let err = fetch.download().await.unwrap_err();
        assert_eq!(err.kind(), "download");
        assert!(err.to_string().contains("404"));
    }
}
