// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Everything a run needs to know about the outside world.
///
/// Built once by the binary and handed to the orchestrator; nothing below it
/// looks at the working directory or the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for `bases/` and `downloads/` unless those are set explicitly.
    pub data_dir: PathBuf,
    pub bases_dir: Option<PathBuf>,
    pub downloads_dir: Option<PathBuf>,
    /// When set, consumed raw artifacts are moved here instead of deleted.
    pub archive_dir: Option<PathBuf>,
    /// Relative paths are taken from `data_dir`.
    pub holidays_file: PathBuf,
    pub user_agents_file: PathBuf,
    /// Business days re-fetched by a forced refresh.
    pub force_days: usize,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bases_dir: None,
            downloads_dir: None,
            archive_dir: None,
            holidays_file: PathBuf::from("ANBIMA.txt"),
            user_agents_file: PathBuf::from("user-agents.txt"),
            force_days: 6,
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
            concurrency: 3,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Never zero; a zero in the file means "one at a time".
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Config {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Re-root the data directory. Explicit `bases_dir`/`downloads_dir` are kept.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn bases_dir(&self) -> PathBuf {
        self.bases_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("bases"))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("downloads"))
    }

    pub fn holidays_path(&self) -> PathBuf {
        self.data_dir.join(&self.holidays_file)
    }

    pub fn user_agents_path(&self) -> PathBuf {
        self.data_dir.join(&self.user_agents_file)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let mut dirs = vec![self.bases_dir(), self.downloads_dir()];
        if let Some(archive) = &self.archive_dir {
            dirs.push(archive.clone());
        }
        for d in &dirs {
            fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.force_days, 6);
        assert_eq!(cfg.http.max_retries, 3);
        assert_eq!(cfg.bases_dir(), PathBuf::from("data/bases"));
        assert_eq!(cfg.downloads_dir(), PathBuf::from("data/downloads"));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = Config::from_yaml(
            "data_dir: /srv/anbima\nhttp:\n  timeout_secs: 5\n  concurrency: 0\n",
        )
        .unwrap();
        assert_eq!(cfg.http.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.http.max_retries, 3);
        assert_eq!(cfg.http.concurrency(), 1);
        assert_eq!(cfg.bases_dir(), PathBuf::from("/srv/anbima/bases"));
    }

    #[test]
    fn explicit_dirs_survive_data_dir_override() {
        let cfg = Config::from_yaml("bases_dir: /mnt/bases\n")
            .unwrap()
            .with_data_dir("/tmp/x");
        assert_eq!(cfg.bases_dir(), PathBuf::from("/mnt/bases"));
        assert_eq!(cfg.downloads_dir(), PathBuf::from("/tmp/x/downloads"));
    }

    #[test]
    fn side_files_resolve_under_data_dir() {
        let cfg = Config::default().with_data_dir("/srv/anbima");
        assert_eq!(cfg.holidays_path(), PathBuf::from("/srv/anbima/ANBIMA.txt"));
        assert_eq!(cfg.user_agents_path(), PathBuf::from("/srv/anbima/user-agents.txt"));

        let cfg = Config::from_yaml("data_dir: /srv/anbima\nholidays_file: /etc/anbima/feriados.txt\n").unwrap();
        assert_eq!(cfg.holidays_path(), PathBuf::from("/etc/anbima/feriados.txt"));
    }

    #[test]
    fn load_reads_file_and_creates_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anbima.yaml");
        fs::write(&path, format!("data_dir: {}\nforce_days: 10\n", dir.path().display()))
            .unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.force_days, 10);
        cfg.ensure_dirs().unwrap();
        assert!(dir.path().join("bases").is_dir());
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }
}
