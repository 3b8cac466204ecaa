//! Build step: validate a function directory and resolve its compiled module.
//!
//! A function directory is `web3-functions/<name>/` holding a `schema.json` manifest and,
//! optionally, a `.env` file with the function's secrets. The module itself is compiled
//! into the binary and looked up by directory name in the [`FunctionCatalog`].

use crate::context::args::ArgType;
use crate::runtime::module::FunctionCatalog;
use crate::utils::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const SCHEMA_FILE: &str = "schema.json";
pub const SECRETS_FILE: &str = ".env";
/// Process env vars with this prefix are exposed as secrets, prefix stripped.
pub const SECRETS_ENV_PREFIX: &str = "SECRETS_";

const ALLOWED_MEMORY: [u32; 4] = [128, 256, 512, 1024];
const MAX_TIMEOUT_SECS: u64 = 30;

/// `schema.json` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSchema {
    pub web3_function_version: String,
    pub runtime: String,
    /// MB
    pub memory: u32,
    /// Seconds
    pub timeout: u64,
    #[serde(default)]
    pub user_args: BTreeMap<String, ArgType>,
}

impl Default for FunctionSchema {
    fn default() -> Self {
        Self {
            web3_function_version: "2.0.0".into(),
            runtime: "rust-1.0".into(),
            memory: 128,
            timeout: MAX_TIMEOUT_SECS,
            user_args: BTreeMap::new(),
        }
    }
}

impl FunctionSchema {
    pub fn validate(&self) -> Result<()> {
        let major = self
            .web3_function_version
            .split('.')
            .next()
            .and_then(|m| m.parse::<u64>().ok())
            .ok_or_else(|| {
                HarnessError::BuildFailed(format!("invalid web3FunctionVersion '{}'", self.web3_function_version))
            })?;
        if !(1..=2).contains(&major) {
            return Err(HarnessError::BuildFailed(format!(
                "unsupported web3FunctionVersion '{}'",
                self.web3_function_version
            )));
        }
        if self.runtime.trim().is_empty() {
            return Err(HarnessError::BuildFailed("runtime must not be empty".into()));
        }
        if !ALLOWED_MEMORY.contains(&self.memory) {
            return Err(HarnessError::BuildFailed(format!(
                "memory must be one of {ALLOWED_MEMORY:?}, got {}",
                self.memory
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            return Err(HarnessError::BuildFailed(format!(
                "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.timeout
            )));
        }
        Ok(())
    }
}

/// Output of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltFunction {
    pub name: String,
    pub path: PathBuf,
    pub schema: FunctionSchema,
    /// Hex SHA-256 over the directory's files.
    pub digest: String,
}

pub trait FunctionBuilder: Send + Sync {
    fn build(&self, path: &Path) -> Result<BuiltFunction>;
}

/// Builder for catalog-backed functions.
pub struct SchemaBuilder {
    catalog: Arc<FunctionCatalog>,
}

impl SchemaBuilder {
    pub fn new(catalog: Arc<FunctionCatalog>) -> Self {
        Self { catalog }
    }
}

impl FunctionBuilder for SchemaBuilder {
    fn build(&self, path: &Path) -> Result<BuiltFunction> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HarnessError::BuildFailed(format!("invalid function path {}", path.display())))?
            .to_string();

        let schema_path = path.join(SCHEMA_FILE);
        let raw = fs::read_to_string(&schema_path)
            .map_err(|e| HarnessError::BuildFailed(format!("cannot read {}: {e}", schema_path.display())))?;
        let schema: FunctionSchema = serde_json::from_str(&raw)
            .map_err(|e| HarnessError::BuildFailed(format!("malformed {}: {e}", schema_path.display())))?;
        schema.validate()?;

        if !self.catalog.contains(&name) {
            return Err(HarnessError::BuildFailed(format!("no compiled module named '{name}'")));
        }

        let digest = digest_dir(path).map_err(|e| HarnessError::BuildFailed(format!("cannot hash {}: {e}", path.display())))?;
        info!(function = %name, digest = %digest, "function built");
        Ok(BuiltFunction { name, path: path.to_path_buf(), schema, digest })
    }
}

/// SHA-256 over relative paths and contents, in sorted path order. Secrets files are skipped.
fn digest_dir(root: &Path) -> std::io::Result<String> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();
    let mut hasher = Sha256::new();
    for file in files {
        let rel = file.strip_prefix(root).unwrap_or(&file);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(&file)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.file_name().map_or(true, |name| name != SECRETS_FILE) {
            out.push(path);
        }
    }
    Ok(())
}

/// Secrets for a function: its `.env` file, overridden by `SECRETS_*` env vars.
pub fn load_secrets(function_dir: &Path) -> Result<HashMap<String, String>> {
    let mut secrets = HashMap::new();
    let env_file = function_dir.join(SECRETS_FILE);
    if env_file.exists() {
        let raw = fs::read_to_string(&env_file)?;
        secrets.extend(parse_dotenv(&raw));
        debug!(path = %env_file.display(), count = secrets.len(), "secrets loaded");
    }
    for (key, value) in std::env::vars() {
        if let Some(name) = key.strip_prefix(SECRETS_ENV_PREFIX) {
            if !name.is_empty() {
                secrets.insert(name.to_string(), value);
            }
        }
    }
    Ok(secrets)
}

/// `KEY=value` lines; blank lines and `#` comments skipped, surrounding quotes stripped.
pub fn parse_dotenv(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::module::Web3Function;
    use serde_json::json;
    use tempfile::TempDir;

    fn noop(_: &mut Web3Function) {}

    fn write_function(root: &TempDir, name: &str, schema: serde_json::Value) -> PathBuf {
        let dir = root.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SCHEMA_FILE), schema.to_string()).unwrap();
        dir
    }

    fn builder() -> SchemaBuilder {
        SchemaBuilder::new(Arc::new(FunctionCatalog::new().with("oracle", noop)))
    }

    fn schema() -> serde_json::Value {
        json!({
            "web3FunctionVersion": "2.0.0",
            "runtime": "rust-1.0",
            "memory": 128,
            "timeout": 30,
            "userArgs": {"oracle": "string", "currency": "string"}
        })
    }

    #[test]
    fn builds_valid_function() {
        let root = TempDir::new().unwrap();
        let dir = write_function(&root, "oracle", schema());
        let built = builder().build(&dir).unwrap();
        assert_eq!(built.name, "oracle");
        assert_eq!(built.schema.user_args["currency"], ArgType::String);
        assert_eq!(built.digest.len(), 64);

        // digest follows content, never secrets
        let again = builder().build(&dir).unwrap();
        assert_eq!(built.digest, again.digest);
        fs::write(dir.join(SECRETS_FILE), "COINGECKO_API=x").unwrap();
        assert_eq!(builder().build(&dir).unwrap().digest, built.digest);
        fs::write(dir.join("index.rs"), "// changed").unwrap();
        assert_ne!(builder().build(&dir).unwrap().digest, built.digest);
    }

    #[test]
    fn rejects_bad_manifests() {
        let root = TempDir::new().unwrap();
        let mut bad_memory = schema();
        bad_memory["memory"] = json!(100);
        let mut bad_timeout = schema();
        bad_timeout["timeout"] = json!(31);
        let mut bad_version = schema();
        bad_version["web3FunctionVersion"] = json!("3.0.0");

        for (i, s) in [bad_memory, bad_timeout, bad_version].into_iter().enumerate() {
            let dir = write_function(&root, "oracle", s);
            let err = builder().build(&dir).unwrap_err();
            assert!(matches!(err, HarnessError::BuildFailed(_)), "case {i}: {err}");
        }

        let missing = root.path().join("empty");
        fs::create_dir_all(&missing).unwrap();
        assert!(matches!(builder().build(&missing), Err(HarnessError::BuildFailed(_))));

        let dir = write_function(&root, "oracle", json!({"runtime": "rust-1.0"}));
        assert!(matches!(builder().build(&dir), Err(HarnessError::BuildFailed(_))));
    }

    #[test]
    fn rejects_unknown_module() {
        let root = TempDir::new().unwrap();
        let dir = write_function(&root, "not-compiled", schema());
        let err = builder().build(&dir).unwrap_err();
        assert!(err.to_string().contains("not-compiled"));
    }

    #[test]
    fn dotenv_parsing() {
        let parsed = parse_dotenv("# comment\n\nCOINGECKO_API=\"https://api.coingecko.com/api/v3\"\nexport KEY = 'v'\nbroken\n");
        assert_eq!(
            parsed,
            vec![
                ("COINGECKO_API".to_string(), "https://api.coingecko.com/api/v3".to_string()),
                ("KEY".to_string(), "v".to_string()),
            ]
        );
    }

    #[test]
    fn secrets_from_env_file() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(SECRETS_FILE), "API_KEY=abc\n").unwrap();
        let secrets = load_secrets(root.path()).unwrap();
        assert_eq!(secrets.get("API_KEY").map(String::as_str), Some("abc"));
    }
}
