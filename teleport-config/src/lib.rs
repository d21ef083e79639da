// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! File-backed configuration loading shared by the teleport crates.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Config files are YAML when the extension says so, JSON otherwise.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config {}", path.display()))?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct SampleConfig {
        metrics_port: u16,
        domain_names: Vec<String>,
    }

    impl Config for SampleConfig {}

    fn sample() -> SampleConfig {
        SampleConfig {
            metrics_port: 9184,
            domain_names: vec!["ETH-MAIN-A".to_string(), "OPT-MAIN-A".to_string()],
        }
    }

    #[test]
    fn test_yaml_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yaml");
        sample().save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("metrics-port: 9184"));
        assert_eq!(SampleConfig::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_json_is_default_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.conf");
        std::fs::write(
            &path,
            r#"{"metrics-port": 9184, "domain-names": ["ETH-MAIN-A", "OPT-MAIN-A"]}"#,
        )
        .unwrap();
        assert_eq!(SampleConfig::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = SampleConfig::load("/nonexistent/teleport.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/teleport.yaml"));
    }
}
