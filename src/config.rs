//! Run configuration: cutoff, threshold, requested auxiliary columns, and
//! verbosity. Loadable from an optional TOML file, then overridden by
//! whatever the CLI passed explicitly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cutoff: usize,
    pub threshold: f64,
    pub donors_info: Vec<String>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cutoff: 100,
            threshold: 0.1,
            donors_info: Vec::new(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| MatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| MatchError::Parse {
            file: path.to_path_buf(),
            line: 0,
            reason: format!("invalid configuration TOML: {e}"),
        })
    }
}
