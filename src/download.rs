//! Side-effect seams of an export: where files go, how failures are shown,
//! and what time it is.

use crate::data_url::DataUrl;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Receives an activated download anchor: the `download` file name and the
/// anchor's `href`.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, file_name: &str, href: &str) -> Result<()>;
}

/// Shows a failure to the user. Called at most once per export.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Writes downloads into a directory. The file is written under a temporary
/// name and renamed, so a failed write leaves no partial PNG behind.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, file_name: &str, href: &str) -> Result<()> {
        if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(Error::DownloadError(format!("refusing file name {:?}", file_name)));
        }
        let payload = DataUrl::parse(href)?;
        std::fs::create_dir_all(&self.dir)?;
        let final_path = self.dir.join(file_name);
        let tmp_path = self.dir.join(format!(".{}.part", file_name));
        if let Err(e) = std::fs::write(&tmp_path, &payload.bytes) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        std::fs::rename(&tmp_path, &final_path)?;
        info!("Saved {} ({} bytes)", final_path.display(), payload.bytes.len());
        Ok(())
    }
}

/// Keeps downloads in memory; cloning shares the same store
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, file_name: &str, href: &str) -> Result<()> {
        let payload = DataUrl::parse(href)?;
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::DownloadError("sink poisoned".into()))?;
        files.push((file_name.to_string(), payload.bytes));
        Ok(())
    }
}

/// Reports failures through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_href() -> String {
        DataUrl::new("image/png", b"\x89PNGfake".to_vec()).to_url()
    }

    #[test]
    fn memory_sink_collects_decoded_payloads() {
        let sink = MemorySink::new();
        let shared = sink.clone();
        sink.deliver("a.png", &png_href()).unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared.files()[0].1, b"\x89PNGfake");
    }

    #[test]
    fn directory_sink_writes_and_rejects_traversal() {
        let dir = std::env::temp_dir().join(format!("postmock-sink-{}", uuid::Uuid::new_v4()));
        let sink = DirectorySink::new(&dir);
        sink.deliver("out.png", &png_href()).unwrap();
        assert_eq!(std::fs::read(dir.join("out.png")).unwrap(), b"\x89PNGfake");
        assert!(!dir.join(".out.png.part").exists());

        assert!(sink.deliver("../evil.png", &png_href()).is_err());
        assert!(sink.deliver("bad.png", "not-a-data-url").is_err());
        assert!(!dir.join("bad.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
