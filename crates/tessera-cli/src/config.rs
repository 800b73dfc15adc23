use std::fs;
use std::path::Path;

use serde::Deserialize;
use tessera_rt::RuntimeConfig;

use crate::error::CliError;

/// Layout of a `tessera` config file.
///
/// ```toml
/// [runtime]
/// stack_size = 1048576
/// bootstrap_stack = "probe"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub runtime: RuntimeConfig,
}

impl CliConfig {
    pub fn parse(path: &Path, content: &str) -> Result<Self, CliError> {
        toml::from_str(content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(path, &content)?;
        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// The runtime config from `path`, or the defaults when no file is given.
    pub fn runtime_config(path: Option<&Path>) -> Result<RuntimeConfig, CliError> {
        match path {
            Some(path) => Ok(Self::load(path)?.runtime),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_rt::{BootstrapStack, DEFAULT_STACK_SIZE};

    fn parse(content: &str) -> Result<CliConfig, CliError> {
        CliConfig::parse(Path::new("tessera.toml"), content)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn runtime_table_overrides_defaults() {
        let config = parse(
            r#"
            [runtime]
            stack_size = 2097152
            bootstrap_stack = "query"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.stack_size, 2 * 1024 * 1024);
        assert_eq!(config.runtime.bootstrap_stack, BootstrapStack::Query);
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = parse("[runtime]\nbootstrap_stack = \"query\"\n").unwrap();
        assert_eq!(config.runtime.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = parse("[runtime]\nbootstrap_stack = \"guess\"\n").unwrap_err();
        assert!(matches!(err, CliError::ConfigParse { .. }));
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert!(parse("[gc]\nthreads = 4\n").is_err());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = CliConfig::load(Path::new("/nonexistent/tessera.toml")).unwrap_err();
        match err {
            CliError::ConfigRead { path, .. } => assert_eq!(path, Path::new("/nonexistent/tessera.toml")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
