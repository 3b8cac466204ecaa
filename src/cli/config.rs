use crate::runtime::executor::RuntimeMode;
use crate::runtime::limiter::LimitOverrides;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "w3f.toml";
/// Comma-separated JSON-RPC urls; overrides `provider_urls` from the file.
pub const PROVIDER_URLS_ENV: &str = "PROVIDER_URLS";

/// Harness configuration (`w3f.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding one sub-directory per function.
    pub functions_dir: PathBuf,
    pub runtime: RuntimeMode,
    pub provider_urls: Vec<String>,
    /// Where instance storage is persisted between runs; in-memory when unset.
    pub storage_dir: Option<PathBuf>,
    pub limits: LimitOverrides,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            functions_dir: PathBuf::from("web3-functions"),
            runtime: RuntimeMode::Thread,
            provider_urls: Vec::new(),
            storage_dir: Some(PathBuf::from(".w3f/storage")),
            limits: LimitOverrides::default(),
        }
    }
}

impl HarnessConfig {
    /// Load config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let cfg: HarnessConfig = toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply a `PROVIDER_URLS` value, if any.
    pub fn with_provider_env(mut self, value: Option<String>) -> Self {
        if let Some(raw) = value {
            let urls = parse_urls_csv(&raw);
            if !urls.is_empty() {
                self.provider_urls = urls;
            }
        }
        self
    }
}

/// Parse a CSV list of urls into Vec<String>
pub fn parse_urls_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_toml_with_limits() {
        let cfg: HarnessConfig = toml::from_str(
            r#"
            functions_dir = "fns"
            runtime = "process"
            provider_urls = ["http://127.0.0.1:8545"]

            [limits]
            request_limit = 10
            timeout_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.functions_dir, PathBuf::from("fns"));
        assert_eq!(cfg.runtime, RuntimeMode::Process);
        assert_eq!(cfg.limits.request_limit, Some(10));
        assert_eq!(cfg.limits.timeout_ms, Some(2000));
        assert_eq!(cfg.limits.rpc_limit, None);
        assert_eq!(cfg.storage_dir, HarnessConfig::default().storage_dir);
    }

    #[test]
    fn env_overrides_provider_urls() {
        let cfg = HarnessConfig::default().with_provider_env(Some(" http://a:8545, ,http://b:8545".into()));
        assert_eq!(cfg.provider_urls, vec!["http://a:8545", "http://b:8545"]);
        let untouched = cfg.clone().with_provider_env(None);
        assert_eq!(untouched, cfg);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = HarnessConfig::load_or_default(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(cfg, HarnessConfig::default());

        fs::write(dir.path().join("bad.toml"), "runtime = 3").unwrap();
        assert!(HarnessConfig::load(dir.path().join("bad.toml")).is_err());
    }
}
