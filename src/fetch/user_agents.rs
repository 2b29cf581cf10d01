use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use std::{fs, path::Path};
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Pool of browser identifications; one is drawn at random per attempt.
#[derive(Debug, Clone)]
pub struct UserAgents(Vec<String>);

impl Default for UserAgents {
    fn default() -> Self {
        Self(vec![DEFAULT_USER_AGENT.to_string()])
    }
}

impl UserAgents {
    pub fn new(agents: impl IntoIterator<Item = String>) -> Self {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if agents.is_empty() {
            Self::default()
        } else {
            Self(agents)
        }
    }

    /// One user agent per line.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading user agents {}", path.display()))?;
        let agents = Self::new(text.lines().map(str::to_string));
        debug!(path = %path.display(), count = agents.len(), "loaded user agents");
        Ok(agents)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "user agent file not found; using built-in agent");
            Ok(Self::default())
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pick(&self) -> &str {
        self.0
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}
