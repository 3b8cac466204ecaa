use crate::runtime::limiter::ResourceLimiter;
use crate::utils::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only secrets capability. Lookups are case-sensitive; a missing key is `None`, never an error.
#[async_trait]
pub trait SecretsAccess: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Host-side secrets over a plain map. A delivered value counts as downloaded bytes.
pub struct HostSecrets {
    secrets: HashMap<String, String>,
    limiter: Arc<ResourceLimiter>,
}

impl HostSecrets {
    pub fn new(secrets: HashMap<String, String>, limiter: Arc<ResourceLimiter>) -> Self {
        Self { secrets, limiter }
    }
}

#[async_trait]
impl SecretsAccess for HostSecrets {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.limiter.check_deadline()?;
        match self.secrets.get(key) {
            Some(value) => {
                self.limiter.record_download(value.len() as u64)?;
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Secrets facade exposed on the execution context.
#[derive(Clone)]
pub struct Secrets {
    inner: Arc<dyn SecretsAccess>,
}

impl Secrets {
    pub fn new(inner: Arc<dyn SecretsAccess>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::builder::FunctionSchema;
    use crate::runtime::limiter::{LimitOverrides, RunLimits};

    #[tokio::test]
    async fn lookups_are_case_sensitive() {
        let limiter = Arc::new(ResourceLimiter::new(RunLimits::from_schema(
            &FunctionSchema::default(),
            &LimitOverrides::default(),
        )));
        let map = HashMap::from([("COINGECKO_API".to_string(), "https://api".to_string())]);
        let secrets = Secrets::new(Arc::new(HostSecrets::new(map, limiter.clone())));

        assert_eq!(secrets.get("COINGECKO_API").await.unwrap().as_deref(), Some("https://api"));
        assert_eq!(secrets.get("coingecko_api").await.unwrap(), None);
        assert_eq!(limiter.usage().download, "https://api".len() as u64);
    }
}
