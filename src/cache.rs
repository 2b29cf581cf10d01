// src/cache.rs

use chrono::NaiveDate;
use glob::glob;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tokio::fs as tokio_fs;
use tracing::{debug, warn};

const REJECTED_SUFFIX: &str = "rejected";

/// Raw downloads of one source, one file per reference date:
/// `<root>/<source>/<yyyymmdd>_<source>.<ext>`.
///
/// A file present here means "already fetched"; it is parsed instead of
/// re-downloaded and removed once its records are merged.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    source: String,
    extension: String,
    archive: Option<PathBuf>,
}

impl ArtifactCache {
    pub fn new(root: &Path, source: &str, extension: &str, archive: Option<&Path>) -> io::Result<Self> {
        let dir = root.join(source);
        fs::create_dir_all(&dir)?;
        let cache = Self {
            dir,
            source: source.to_string(),
            extension: extension.to_string(),
            archive: archive.map(|a| a.join(source)),
        };
        cache.sweep_partial();
        Ok(cache)
    }

    /// Remove half-written `.tmp` files left by a store that never finished.
    fn sweep_partial(&self) {
        let pattern = format!("{}/*.tmp", self.dir.display());
        let Ok(paths) = glob(&pattern) else {
            return;
        };
        for path in paths.filter_map(Result::ok) {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed partial artifact"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial artifact"),
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            date.format("%Y%m%d"),
            self.source,
            self.extension
        ))
    }

    /// Cached bytes for `date`, if present.
    pub fn load(&self, date: NaiveDate) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(date)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a fresh download; `.tmp` then rename so a crash never leaves a
    /// truncated artifact that would later be taken as cached.
    pub async fn store(&self, date: NaiveDate, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(date);
        let tmp = path.with_extension(format!("{}.tmp", self.extension));
        tokio_fs::write(&tmp, bytes).await?;
        tokio_fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Drop an artifact that turned out to carry no data.
    pub fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to delete artifact");
            }
        }
    }

    /// Keep an unparsable artifact for inspection, out of the cache's way.
    pub fn quarantine(&self, path: &Path) -> io::Result<PathBuf> {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}", REJECTED_SUFFIX));
        let target = PathBuf::from(name);
        fs::rename(path, &target)?;
        Ok(target)
    }

    /// Artifacts whose records are now merged: archive them if configured,
    /// delete them otherwise.
    pub fn release(&self, paths: &[PathBuf]) -> io::Result<()> {
        if let Some(archive) = &self.archive {
            fs::create_dir_all(archive)?;
        }
        for path in paths {
            match (&self.archive, path.file_name()) {
                (Some(archive), Some(name)) => {
                    let target = archive.join(name);
                    if fs::rename(path, &target).is_err() {
                        // different filesystem
                        fs::copy(path, &target)?;
                        fs::remove_file(path)?;
                    }
                    debug!(from = %path.display(), to = %target.display(), "archived artifact");
                }
                _ => {
                    fs::remove_file(path)?;
                    debug!(path = %path.display(), "deleted artifact");
                }
            }
        }
        Ok(())
    }

    /// Cached artifacts still waiting to be merged, by date.
    pub fn pending(&self) -> Vec<NaiveDate> {
        let pattern = format!("{}/*_{}.{}", self.dir.display(), self.source, self.extension);
        let mut dates: Vec<NaiveDate> = match glob(&pattern) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .filter_map(|p| {
                    let name = p.file_name()?.to_str()?.to_string();
                    NaiveDate::parse_from_str(name.get(..8)?, "%Y%m%d").ok()
                })
                .collect(),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "bad artifact pattern");
                Vec::new()
            }
        };
        dates.sort();
        dates
    }

    /// Artifacts set aside by [`quarantine`](Self::quarantine).
    pub fn rejected(&self) -> Vec<PathBuf> {
        let pattern = format!("{}/*.{}", self.dir.display(), REJECTED_SUFFIX);
        glob(&pattern)
            .map(|paths| paths.filter_map(Result::ok).collect())
            .unwrap_or_default()
    }
}
