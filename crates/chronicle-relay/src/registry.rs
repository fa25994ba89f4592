//! Persistent registry of root threads the relay keeps.
//!
//! The registry is a set of root event ids. It is loaded wholesale at startup
//! and only ever grows while the process runs.
//!
//! # File Format
//!
//! ```text
//! <64-hex event id>\n
//! <64-hex event id>\n
//! ```
//!
//! New ids are appended as they are added. [`RootRegistry::persist`] rewrites
//! the file atomically, dropping duplicate and unparseable lines.

use crate::{Error, Result};
use nostr_sdk::EventId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Set of known root thread ids backed by a newline-delimited file.
///
/// Thread-safe: share it across tasks via `Arc<RootRegistry>`.
pub struct RootRegistry {
    path: PathBuf,
    roots: Mutex<HashSet<EventId>>,
    /// Append handle; also serializes every write to the backing file.
    writer: Mutex<Option<File>>,
}

impl RootRegistry {
    /// Create an empty registry backed by `path`. Nothing is read or written yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            roots: Mutex::new(HashSet::new()),
            writer: Mutex::new(None),
        }
    }

    /// Create a registry and load its backing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let registry = Self::new(path);
        registry.load_from_file()?;
        Ok(registry)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every id from the backing file into memory.
    ///
    /// A missing file is an empty registry. Any other read failure is an
    /// error, since the relay must not serve with a partial registry.
    pub fn load_from_file(&self) -> Result<usize> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "No registry file at {}, starting empty",
                    self.path.display()
                );
                return Ok(0);
            }
            Err(e) => {
                return Err(Error::Registry(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut roots = self.roots.lock();
        for line in data.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match chronicle_core::parse_event_id(line) {
                Ok(id) => {
                    if roots.insert(id) {
                        loaded += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!("Registry line rejected: {}", e);
                    skipped += 1;
                }
            }
        }
        let total = roots.len();
        drop(roots);

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} malformed lines in {}",
                skipped,
                self.path.display()
            );
        }
        metrics::gauge!("registry_roots").set(total as f64);
        Ok(loaded)
    }

    /// Add a root id. Returns `true` if it was not known before.
    ///
    /// New ids are appended to the backing file. A failed append is logged and
    /// the id stays in memory; the next [`persist`](Self::persist) writes it out.
    pub fn add(&self, id: EventId) -> bool {
        let size = {
            let mut roots = self.roots.lock();
            if !roots.insert(id) {
                return false;
            }
            roots.len()
        };
        metrics::gauge!("registry_roots").set(size as f64);

        if let Err(e) = self.append(&id) {
            tracing::warn!(
                "Failed to append root {} to {}: {}",
                id,
                self.path.display(),
                e
            );
        }
        true
    }

    /// Whether a root id is known.
    pub fn includes(&self, id: &EventId) -> bool {
        self.roots.lock().contains(id)
    }

    /// Number of known roots.
    pub fn size(&self) -> usize {
        self.roots.lock().len()
    }

    /// Rewrite the backing file with the current set.
    pub fn persist(&self) -> Result<()> {
        let mut writer = self.writer.lock();

        let mut lines: Vec<String> = self.roots.lock().iter().map(|id| id.to_hex()).collect();
        lines.sort_unstable();

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        for line in &lines {
            writeln!(tmp, "{}", line)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Registry(format!("failed to replace {}: {}", self.path.display(), e)))?;

        // The old append handle points at the replaced inode
        *writer = None;

        tracing::debug!("Persisted {} roots to {}", lines.len(), self.path.display());
        Ok(())
    }

    fn append(&self, id: &EventId) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *writer = Some(file);
        }

        if let Some(file) = writer.as_mut() {
            writeln!(file, "{}", id.to_hex())?;
        }
        Ok(())
    }
}
