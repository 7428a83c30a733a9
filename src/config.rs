use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tracing::info;

use engine::{storage::StorageFactory, Directory};
use kernel::prelude::{AccessControl, Acls, AllowAll, Overlay, RegisteredOverlays, Schema};
use overlays_posix_ids::{AutoPosixIdsFactory, AutoPosixIdsOverlay};

pub const DEFAULT_PATH: &str = "directory.sqlite3";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown overlay '{0}'")]
    UnknownOverlay(String),
}

fn default_overlays() -> Vec<String> {
    vec![AutoPosixIdsOverlay::overlay_key().to_owned()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_overlays")]
    pub overlays: Vec<String>,
    /// Without rules every principal may write.
    #[serde(default)]
    pub acls: Option<Acls>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            overlays: default_overlays(),
            acls: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Opening {}", path.display()))?;

        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Parsing {}", path.display()))
    }

    pub fn registered_overlays(&self) -> Result<RegisteredOverlays, ConfigError> {
        let mut registered = RegisteredOverlays::default();
        for name in self.overlays.iter() {
            if name == AutoPosixIdsOverlay::overlay_key() {
                registered.register(AutoPosixIdsFactory::default());
            } else {
                return Err(ConfigError::UnknownOverlay(name.clone()));
            }
        }

        Ok(registered)
    }

    fn access(&self) -> Arc<dyn AccessControl> {
        match &self.acls {
            Some(acls) => Arc::new(acls.clone()),
            None => Arc::new(AllowAll::default()),
        }
    }
}

pub struct DirectoryBuilder {
    config: Config,
}

impl DirectoryBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The command line wins over the configuration file.
    pub fn with_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.config.path = path;
        }
        self
    }

    pub fn path(&self) -> &str {
        self.config.path.as_deref().unwrap_or(DEFAULT_PATH)
    }

    pub fn build(&self) -> Result<Directory> {
        let path = self.path();

        info!(%path, overlays = ?self.config.overlays, "opening");

        let storage_factory = sqlite::Factory::new(path)?;
        storage_factory.migrate()?;

        Directory::attach(
            Arc::new(storage_factory),
            Arc::new(Schema::rfc2307()),
            self.config.access(),
            &self.config.registered_overlays()?,
        )
    }
}
