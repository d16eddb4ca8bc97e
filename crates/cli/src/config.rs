//! Optional `tenure.toml` configuration.
//!
//! ```toml
//! # Lifecycle definitions to load; omit to use the built-in catalog.
//! definitions = "lifecycles.json"
//! # Tracing filter used when RUST_LOG is unset.
//! log_filter = "tenure_engine=info"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File looked up in the working directory when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "tenure.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CliConfig {
    /// Path to a definition document, relative to the config file.
    #[serde(default)]
    pub definitions: Option<PathBuf>,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl CliConfig {
    /// Load `explicit` if given (it must exist), otherwise `tenure.toml` in
    /// the working directory if present, otherwise defaults.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
        let mut config = Self::parse(&text)
            .map_err(|e| format!("error parsing config '{}': {}", path.display(), e))?;

        if let (Some(defs), Some(dir)) = (config.definitions.as_ref(), path.parent()) {
            if defs.is_relative() && !dir.as_os_str().is_empty() {
                config.definitions = Some(dir.join(defs));
            }
        }
        Ok(config)
    }

    pub(crate) fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn parses_both_keys() {
        let config = CliConfig::parse(
            "definitions = \"defs/lifecycles.json\"\nlog_filter = \"tenure_engine=debug\"\n",
        )
        .unwrap();
        assert_eq!(
            config.definitions.as_deref(),
            Some(Path::new("defs/lifecycles.json"))
        );
        assert_eq!(config.log_filter.as_deref(), Some("tenure_engine=debug"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CliConfig::parse("defintions = \"typo.json\"").is_err());
    }
}
