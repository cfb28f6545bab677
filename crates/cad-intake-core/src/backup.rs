use crate::error::BackupError;
use dashmap::DashMap;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};
use zip::write::FileOptions;
use zip::ZipWriter;

pub const ARCHIVE_NAME: &str = "backup.zip";

/// True when the file can be opened for exclusive access and is not empty,
/// i.e. no other process is mid-write.
pub fn is_file_ready(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => {
            let locked = file.try_lock_exclusive().is_ok();
            let non_empty = file.metadata().map(|m| m.len() > 0).unwrap_or(false);
            locked && non_empty
        }
        Err(_) => false,
    }
}

/// Appends incoming files to per-batch zip archives. One writer at a time.
pub struct BackupArchiver {
    lock: Mutex<()>,
    poll_interval: Duration,
    max_polls: usize,
    entries: DashMap<PathBuf, Vec<String>>,
}

impl Default for BackupArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupArchiver {
    pub fn new() -> Self {
        Self::with_polling(Duration::from_secs(1), 30)
    }

    pub fn with_polling(poll_interval: Duration, max_polls: usize) -> Self {
        Self {
            lock: Mutex::new(()),
            poll_interval,
            max_polls,
            entries: DashMap::new(),
        }
    }

    /// Add `file` to `archive`, creating the archive on first use.
    /// Retries once after a failed write.
    pub fn append(&self, archive: &Path, file: &Path) -> Result<(), BackupError> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // released on every return path, including `?`
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if !archive.exists() {
            if let Some(parent) = archive.parent() {
                fs::create_dir_all(parent)?;
            }
            create_archive(archive, file, &name)?;
            debug!("Created backup archive {}", archive.display());
            self.record(archive, name);
            return Ok(());
        }

        let first = self
            .wait_until_ready(archive, false)
            .and_then(|_| append_entry(archive, file, &name));

        match first {
            Ok(()) => {
                self.record(archive, name);
                Ok(())
            }
            Err(e) => {
                warn!("Could not backup file {}, trying again ({})", name, e);
                self.wait_until_ready(archive, true)
                    .and_then(|_| append_entry(archive, file, &name))
                    .map_err(|e| BackupError::Exhausted {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                self.record(archive, name);
                Ok(())
            }
        }
    }

    /// Entries written this batch, per archive.
    pub fn entries(&self) -> Vec<(PathBuf, Vec<String>)> {
        let mut entries: Vec<(PathBuf, Vec<String>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn record(&self, archive: &Path, name: String) {
        self.entries
            .entry(archive.to_path_buf())
            .or_default()
            .push(name);
    }

    /// Poll readiness at a fixed interval, bounded by `max_polls`.
    fn wait_until_ready(&self, archive: &Path, sleep_first: bool) -> Result<(), BackupError> {
        if sleep_first {
            thread::sleep(self.poll_interval);
        }
        for attempt in 0..=self.max_polls {
            if is_file_ready(archive) {
                return Ok(());
            }
            trace!("Waiting for {} (poll {})", archive.display(), attempt + 1);
            if attempt < self.max_polls {
                thread::sleep(self.poll_interval);
            }
        }
        Err(BackupError::Io(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("{} stayed locked", archive.display()),
        )))
    }
}

fn create_archive(archive: &Path, file: &Path, name: &str) -> Result<(), BackupError> {
    let handle = File::create(archive)?;
    let mut zip = ZipWriter::new(handle);
    write_entry(&mut zip, file, name)?;
    zip.finish()?;
    Ok(())
}

fn append_entry(archive: &Path, file: &Path, name: &str) -> Result<(), BackupError> {
    let handle = OpenOptions::new().read(true).write(true).open(archive)?;
    let mut zip = ZipWriter::new_append(handle)?;
    write_entry(&mut zip, file, name)?;
    zip.finish()?;
    Ok(())
}

fn write_entry<W: io::Write + io::Seek>(zip: &mut ZipWriter<W>, file: &Path, name: &str) -> Result<(), BackupError> {
    zip.start_file(name, FileOptions::default())?;
    let mut source = File::open(file)?;
    io::copy(&mut source, zip)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn archive_names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_archive_created_lazily_and_appended() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.dwg");
        let b = tmp.path().join("b.dwg");
        fs::write(&a, "drawing a").unwrap();
        fs::write(&b, "drawing b").unwrap();

        let archive = tmp.path().join("Backup").join(ARCHIVE_NAME);
        let archiver = BackupArchiver::with_polling(Duration::from_millis(5), 3);
        assert!(!archive.exists());

        archiver.append(&archive, &a).unwrap();
        assert!(archive.exists());
        archiver.append(&archive, &b).unwrap();

        assert_eq!(archive_names(&archive), vec!["a.dwg", "b.dwg"]);

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut contents = String::new();
        zip.by_name("a.dwg").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "drawing a");
    }

    #[test]
    fn test_concurrent_appends_are_serialized() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join(ARCHIVE_NAME);
        let archiver = Arc::new(BackupArchiver::with_polling(Duration::from_millis(5), 10));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = tmp.path().join(format!("file{}.dwg", i));
                fs::write(&path, format!("contents {}", i)).unwrap();
                let archiver = Arc::clone(&archiver);
                let archive = archive.clone();
                thread::spawn(move || archiver.append(&archive, &path))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(archive_names(&archive).len(), 8);
        assert_eq!(archiver.entries()[0].1.len(), 8);
    }

    #[test]
    fn test_missing_source_reports_error() {
        let tmp = tempdir().unwrap();
        let present = tmp.path().join("present.dwg");
        fs::write(&present, "x").unwrap();
        let archive = tmp.path().join(ARCHIVE_NAME);
        let archiver = BackupArchiver::with_polling(Duration::from_millis(1), 1);

        archiver.append(&archive, &present).unwrap();
        let result = archiver.append(&archive, &tmp.path().join("gone.dwg"));
        assert!(matches!(result, Err(BackupError::Exhausted { .. })));
    }

    #[test]
    fn test_empty_file_is_not_ready() {
        let tmp = tempdir().unwrap();
        let empty = tmp.path().join("empty.zip");
        fs::write(&empty, "").unwrap();
        assert!(!is_file_ready(&empty));
        assert!(!is_file_ready(&tmp.path().join("missing.zip")));
    }
}
