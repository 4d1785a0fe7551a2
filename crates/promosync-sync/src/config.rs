use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use promosync_client::{BackoffPolicy, HttpClientConfig, RateLimit};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub base_url: String,
    /// Variable holding the pre-issued access token.
    pub token_env: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvironmentRegistry {
    pub environments: Vec<EnvironmentConfig>,
}

impl EnvironmentRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing environments")?;
        for (n, environment) in registry.environments.iter().enumerate() {
            if registry.environments[..n]
                .iter()
                .any(|earlier| earlier.name == environment.name)
            {
                bail!("environment `{}` is defined twice", environment.name);
            }
        }
        Ok(registry)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn get(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|environment| environment.name == name)
            .with_context(|| {
                let known = self
                    .environments
                    .iter()
                    .map(|environment| environment.name.as_str())
                    .collect::<Vec<_>>();
                format!("unknown environment `{name}` (known: {})", known.join(", "))
            })
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub config_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub page_size: u32,
    pub max_retries: usize,
    pub requests_per_minute: Option<u32>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            config_path: lookup("PROMOSYNC_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./promosync.yaml")),
            user_agent: lookup("PROMOSYNC_USER_AGENT")
                .unwrap_or_else(|| format!("promosync/{}", env!("CARGO_PKG_VERSION"))),
            http_timeout_secs: lookup("PROMOSYNC_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            page_size: lookup("PROMOSYNC_PAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            max_retries: lookup("PROMOSYNC_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            requests_per_minute: lookup("PROMOSYNC_REQUESTS_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .filter(|rpm| *rpm > 0),
        }
    }

    pub fn client_config(&self, base_url: &str, access_token: String) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            page_size: self.page_size,
            backoff: BackoffPolicy {
                max_retries: self.max_retries,
                ..Default::default()
            },
            rate_limit: self
                .requests_per_minute
                .map(|requests_per_minute| RateLimit { requests_per_minute }),
            ..HttpClientConfig::new(base_url, access_token)
        }
    }
}

/// Reads an environment's token from the variable it names.
pub fn resolve_token(
    environment: &EnvironmentConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    match lookup(&environment.token_env) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => bail!(
            "no access token for environment `{}`: set {}",
            environment.name,
            environment.token_env
        ),
    }
}
