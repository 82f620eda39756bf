//! Storage backends for tracked experiments

use super::Experiment;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Persists the full experiment list
pub trait StorageBackend: Send + Sync {
    fn save_experiments(&self, experiments: &[Experiment]) -> Result<()>;

    fn load_experiments(&self) -> Result<Vec<Experiment>>;
}

/// `experiments.json` in a local directory
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn experiments_file(&self) -> PathBuf {
        self.base_dir.join("experiments.json")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl StorageBackend for LocalStorage {
    fn save_experiments(&self, experiments: &[Experiment]) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let json = serde_json::to_string_pretty(experiments)?;
        fs::write(self.experiments_file(), json)?;
        Ok(())
    }

    fn load_experiments(&self) -> Result<Vec<Experiment>> {
        let path = self.experiments_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
