use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;
pub const DEFAULT_PAUSE_SECS: u64 = 1;
pub const DEFAULT_SENTINEL: &str = "NA";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub checkpoint_interval: Option<usize>,
    #[serde(default)]
    pub pause_secs: Option<u64>,
    #[serde(default)]
    pub sentinel: Option<String>,
    #[serde(default)]
    pub workflow: Option<WorkflowSection>,
    #[serde(default)]
    pub chemspider: Option<ChemSpiderSection>,
    #[serde(default)]
    pub obabel_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkflowSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChemSpiderSection {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub checkpoint_interval: usize,
    pub pause: Duration,
    pub sentinel: String,
    pub workflow_api_key: Option<String>,
    pub workflow_base_url: String,
    pub chemspider_base_url: String,
    pub obabel_path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// The workflow key is only demanded by operations that use it, so a
    /// scrape-only setup never has to configure one.
    pub fn require_api_key(&self) -> Result<&str, PipelineError> {
        self.workflow_api_key
            .as_deref()
            .ok_or(PipelineError::MissingApiKey)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `pfas-screen.json` from the working directory, or an explicit
    /// `--config` path. The default file is optional (defaults apply); an
    /// explicitly named file must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("pfas-screen.json"),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(PipelineError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let checkpoint_interval = config
            .checkpoint_interval
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL);
        if checkpoint_interval == 0 {
            return Err(PipelineError::ConfigParse(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }

        let sentinel = config
            .sentinel
            .unwrap_or_else(|| DEFAULT_SENTINEL.to_string());
        if sentinel.is_empty() {
            // An empty sentinel would make failed cells indistinguishable
            // from blank input cells.
            return Err(PipelineError::ConfigParse(
                "sentinel must not be empty".to_string(),
            ));
        }

        let workflow = config.workflow;
        let chemspider = config.chemspider;
        Ok(ResolvedConfig {
            checkpoint_interval,
            pause: Duration::from_secs(config.pause_secs.unwrap_or(DEFAULT_PAUSE_SECS)),
            sentinel,
            workflow_api_key: workflow
                .as_ref()
                .and_then(|section| section.api_key.clone()),
            workflow_base_url: workflow
                .and_then(|section| section.base_url)
                .unwrap_or_else(|| crate::workflow::DEFAULT_BASE_URL.to_string()),
            chemspider_base_url: chemspider
                .and_then(|section| section.base_url)
                .unwrap_or_else(|| crate::chemspider::DEFAULT_BASE_URL.to_string()),
            obabel_path: config.obabel_path.map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_empty() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.checkpoint_interval, 5);
        assert_eq!(resolved.pause, Duration::from_secs(1));
        assert_eq!(resolved.sentinel, "NA");
        assert!(resolved.workflow_api_key.is_none());
        assert_matches!(
            resolved.require_api_key().unwrap_err(),
            PipelineError::MissingApiKey
        );
    }

    #[test]
    fn explicit_missing_file_names_the_path() {
        let err = ConfigLoader::resolve(Some("no/such/screen.json")).unwrap_err();
        assert_matches!(
            err,
            PipelineError::MissingConfig(path) if path == PathBuf::from("no/such/screen.json")
        );
    }

    #[test]
    fn empty_sentinel_rejected() {
        let config = Config {
            sentinel: Some(String::new()),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, PipelineError::ConfigParse(_));
    }

    #[test]
    fn zero_interval_rejected() {
        let config = Config {
            checkpoint_interval: Some(0),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, PipelineError::ConfigParse(_));
    }

    #[test]
    fn sections_are_picked_up() {
        let config: Config = serde_json::from_str(
            r#"{
                "checkpoint_interval": 10,
                "workflow": { "api_key": "key-123" },
                "chemspider": { "base_url": "https://example.org/" }
            }"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.checkpoint_interval, 10);
        assert_eq!(resolved.require_api_key().unwrap(), "key-123");
        assert_eq!(resolved.chemspider_base_url, "https://example.org/");
    }
}
