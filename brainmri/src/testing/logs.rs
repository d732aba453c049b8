//! In-memory capture of formatted tracing output.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::Level;

/// Collects everything a thread-local `fmt` subscriber writes.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes info-and-above events on the current thread into this capture
    /// until the guard is dropped.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured text so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Occurrences of `needle` in the captured text.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_only_while_installed() {
        let logs = LogCapture::new();
        {
            let _guard = logs.install();
            tracing::info!("kept");
            tracing::debug!("below the level");
        }
        tracing::info!("after the guard");

        assert_eq!(logs.count("kept"), 1);
        assert_eq!(logs.count("below the level"), 0);
        assert_eq!(logs.count("after the guard"), 0);
    }
}
