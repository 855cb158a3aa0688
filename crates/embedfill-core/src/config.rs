use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::types::EmbeddingType;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Typed, validated view of the whole configuration.
    pub fn app(&self) -> anyhow::Result<AppConfig> {
        let app: AppConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))?;
        app.validate()?;
        Ok(app)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineSettings,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.pipeline.batch_size > 0, "pipeline.batch_size must be positive");
        anyhow::ensure!(self.pipeline.page_size > 0, "pipeline.page_size must be positive");
        anyhow::ensure!(self.embedding.max_retries >= 1, "embedding.max_retries must be at least 1");
        anyhow::ensure!(self.store.max_retries >= 1, "store.max_retries must be at least 1");
        anyhow::ensure!(self.embedding.dimensions > 0, "embedding.dimensions must be positive");
        anyhow::ensure!(self.embedding.max_text_chars > 0, "embedding.max_text_chars must be positive");
        for (name, secs) in [
            ("embedding.retry_delay_secs", self.embedding.retry_delay_secs),
            ("embedding.request_timeout_secs", self.embedding.request_timeout_secs),
            ("store.retry_delay_secs", self.store.retry_delay_secs),
        ] {
            anyhow::ensure!(secs.is_finite() && secs >= 0.0, "{} must be a non-negative number", name);
        }
        anyhow::ensure!(self.embedding.request_timeout_secs > 0.0, "embedding.request_timeout_secs must be positive");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub exponential_backoff: bool,
    /// Longer inputs are cut before they are sent.
    pub max_text_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 30.0,
            max_retries: 3,
            retry_delay_secs: 1.0,
            exponential_backoff: true,
            max_text_chars: 4000,
        }
    }
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, secs(self.retry_delay_secs), self.exponential_backoff)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub page_size: usize,
    pub pacing_interval_ms: u64,
    /// Maximum in-flight single-item calls during fallback; 0 means "chunk size".
    pub fallback_concurrency: usize,
    pub embedding_type: EmbeddingType,
    pub max_records: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            page_size: 1000,
            pacing_interval_ms: 500,
            fallback_concurrency: 0,
            embedding_type: EmbeddingType::Combined,
            max_records: None,
        }
    }
}

impl PipelineSettings {
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB location; `~` and `${VAR}` are expanded.
    pub uri: String,
    pub records_table: String,
    pub embeddings_table: String,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "./dev_data/lancedb".to_string(),
            records_table: "records".to_string(),
            embeddings_table: "embeddings".to_string(),
            max_retries: 2,
            retry_delay_secs: 0.5,
        }
    }
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, secs(self.retry_delay_secs), true)
    }

    pub fn resolved_uri(&self) -> PathBuf {
        expand_path(&self.uri)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
