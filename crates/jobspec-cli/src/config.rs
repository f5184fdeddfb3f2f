//! CLI configuration
//!
//! Loaded from a JSON file: the path given on the command line, else
//! `<config dir>/jobspec/config.json`. A missing file means defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use jobspec_http_adapter::CollaboratorConfig;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "jobspec";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Remote graph-parse and task-evaluation services
    pub collaborators: CollaboratorConfig,
    /// Root of the versioned spec store
    pub store_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        let store_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("specs"))
            .unwrap_or_else(|| PathBuf::from(".jobspec").join("specs"));
        Self {
            collaborators: CollaboratorConfig::default(),
            store_dir,
        }
    }
}

impl CliConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }
}
