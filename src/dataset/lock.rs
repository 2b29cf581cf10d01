use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::DatasetError;

/// Exclusive claim on one dataset file, held for the length of a run.
///
/// Backed by `<dataset>.lock`, created with `create_new` so two processes
/// cannot both hold it. A lock left behind by a killed process must be
/// removed by hand; its content is the owning pid.
#[derive(Debug)]
pub struct DatasetLock {
    path: PathBuf,
}

pub fn lock_path(dataset: &Path) -> PathBuf {
    let mut name = dataset.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl DatasetLock {
    pub fn acquire(dataset: &Path) -> Result<Self, DatasetError> {
        let path = lock_path(dataset);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{}", std::process::id()) {
                    warn!(lock = %path.display(), error = %e, "could not record owner pid in lock");
                }
                debug!(lock = %path.display(), "acquired dataset lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(DatasetError::Locked {
                path: dataset.to_path_buf(),
                lock: path,
            }),
            Err(source) => Err(DatasetError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release dataset lock");
        }
    }
}
