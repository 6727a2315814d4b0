//! Operating modes
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `STRAND_SAFE_MODE=1`
//! 2. Config file passed to [`Config::load_from_file`]
//! 3. Defaults
//!
//! # Example Config File
//!
//! ```toml
//! [strand]
//! node_reuse = true
//! plug_reuse = true
//! timings = false
//! rogue_mode = false   # skip destruction tracking, unsafe
//! safe_mode = false    # disable every optimisation
//! undo = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Access layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keep one wrapper per live node in the identity table
    pub node_reuse: bool,
    /// Cache plug lookups per node and per attribute path
    pub plug_reuse: bool,
    /// Log elapsed time of hot operations
    pub timings: bool,
    /// Skip destruction subscriptions entirely
    ///
    /// Using a wrapper after its node is destroyed is then undefined.
    pub rogue_mode: bool,
    /// Accept hosts older than the minimum supported version
    pub ignore_version: bool,
    /// Disable every optimisation
    pub safe_mode: bool,
    /// Register committed modifiers with the host undo stack
    pub undo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_reuse: true,
            plug_reuse: true,
            timings: false,
            rogue_mode: false,
            ignore_version: false,
            safe_mode: false,
            undo: true,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    strand: Config,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Defaults overlaid with `STRAND_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables provided by `lookup` on top of `self`
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flags: [(&str, &mut bool); 7] = [
            ("STRAND_NODE_REUSE", &mut self.node_reuse),
            ("STRAND_PLUG_REUSE", &mut self.plug_reuse),
            ("STRAND_TIMINGS", &mut self.timings),
            ("STRAND_ROGUE_MODE", &mut self.rogue_mode),
            ("STRAND_IGNORE_VERSION", &mut self.ignore_version),
            ("STRAND_SAFE_MODE", &mut self.safe_mode),
            ("STRAND_UNDO", &mut self.undo),
        ];

        for (key, slot) in flags {
            if let Some(raw) = lookup(key) {
                match parse_flag(&raw) {
                    Some(value) => *slot = value,
                    None => log::warn!("Ignoring {}={:?}: expected a boolean", key, raw),
                }
            }
        }

        self
    }

    /// Parse the `[strand]` table of a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.strand)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?.with_vars(|key| std::env::var(key).ok());
        log::info!("Loaded strand config from {}", path.display());
        Ok(config)
    }

    /// Resolve interactions between flags
    ///
    /// Safe mode turns off reuse and rogue mode.
    pub fn effective(&self) -> Self {
        let mut config = self.clone();
        if config.safe_mode {
            config.node_reuse = false;
            config.plug_reuse = false;
            config.rogue_mode = false;
        }
        config
    }

    /// Whether destruction tracking is skipped
    pub fn is_rogue(&self) -> bool {
        self.rogue_mode && !self.safe_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.node_reuse);
        assert!(config.plug_reuse);
        assert!(config.undo);
        assert!(!config.is_rogue());
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("STRAND_NODE_REUSE", "0"),
            ("STRAND_TIMINGS", "yes"),
            ("STRAND_UNDO", "maybe"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!config.node_reuse);
        assert!(config.timings);
        // Unparseable values leave the default in place
        assert!(config.undo);
    }

    #[test]
    fn test_safe_mode_wins() {
        let config = Config {
            safe_mode: true,
            rogue_mode: true,
            ..Config::default()
        };
        assert!(!config.is_rogue());

        let effective = config.effective();
        assert!(!effective.node_reuse);
        assert!(!effective.plug_reuse);
        assert!(!effective.rogue_mode);
        assert!(effective.undo);
    }

    #[test]
    fn test_toml() {
        let config = Config::from_toml_str("[strand]\nrogue_mode = true\nplug_reuse = false\n").unwrap();
        assert!(config.is_rogue());
        assert!(!config.plug_reuse);
        assert!(config.node_reuse);

        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
        assert!(Config::from_toml_str("[strand]\nundo = 3").is_err());
    }
}
