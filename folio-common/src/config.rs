//! Configuration loading and resolution
//!
//! Configuration follows the usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FOLIO_CONFIG`)
//! 3. TOML config file in the platform config directory
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Schema identifiers and the content types that route to them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default = "default_book_schema")]
    pub book: String,
    #[serde(default = "default_contributor_schema")]
    pub contributor: String,
    #[serde(default = "default_book_content_type")]
    pub book_content_type: String,
    #[serde(default = "default_contributor_content_type")]
    pub contributor_content_type: String,
}

impl SchemaConfig {
    /// Map an inbound content type to the schema identifier it must carry.
    pub fn schema_for_content_type(&self, content_type: &str) -> Option<&str> {
        if content_type == self.book_content_type {
            Some(&self.book)
        } else if content_type == self.contributor_content_type {
            Some(&self.contributor)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// HTTP-side operation timeout in milliseconds.
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// First backoff interval for temporary failures, in milliseconds.
    #[serde(default = "default_initial_retry_ms")]
    pub initial_retry_interval_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Search backend target index.
    #[serde(default = "default_index_name")]
    pub name: String,
    /// Documents per chunk during full rebuilds.
    #[serde(default = "default_reindex_chunk")]
    pub reindex_chunk: usize,
    /// Base URL of the search backend. None selects the in-process backend.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Delay before a temporarily failed message is retried, in milliseconds.
    #[serde(default = "default_listener_retry_ms")]
    pub retry_interval_ms: u64,
    /// Per-message processing timeout, in milliseconds.
    #[serde(default = "default_actor_timeout_ms")]
    pub actor_timeout_ms: u64,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub error: ErrorConfig,
    #[serde(default)]
    pub distributor: DistributorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    #[serde(default = "default_input_queue")]
    pub queue: String,
    #[serde(default = "default_input_exchange")]
    pub exchange: String,
    #[serde(default = "default_exchange_type")]
    pub exchange_type: String,
    /// Content-type filters bound to the input queue.
    #[serde(default = "default_binding_arguments")]
    pub binding_arguments: Vec<String>,
    /// In-flight messages per consumer; also the worker count.
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorConfig {
    /// Dead-letter exchange for permanent failures.
    #[serde(default = "default_error_exchange")]
    pub exchange: String,
    #[serde(default = "default_error_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributorConfig {
    /// Downstream exchange notified after each successful ingest.
    #[serde(default = "default_distributor_exchange")]
    pub output_exchange: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Source stamp fields excluded from the history key. These vary across
    /// retransmits of the same payload and must not shift the key.
    #[serde(default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_http_listen")]
    pub listen: String,
}

fn default_book_schema() -> String {
    "book.v2".to_string()
}
fn default_contributor_schema() -> String {
    "contributor.v2".to_string()
}
fn default_book_content_type() -> String {
    "application/vnd.folio.book.v2+json".to_string()
}
fn default_contributor_content_type() -> String {
    "application/vnd.folio.contributor.v2+json".to_string()
}
fn default_api_timeout_ms() -> u64 {
    10_000
}
fn default_initial_retry_ms() -> u64 {
    500
}
fn default_max_retry_ms() -> u64 {
    30_000
}
fn default_index_name() -> String {
    "folio".to_string()
}
fn default_reindex_chunk() -> usize {
    100
}
fn default_listener_retry_ms() -> u64 {
    1_000
}
fn default_actor_timeout_ms() -> u64 {
    30_000
}
fn default_input_queue() -> String {
    "folio.metadata.input".to_string()
}
fn default_input_exchange() -> String {
    "metadata".to_string()
}
fn default_exchange_type() -> String {
    "headers".to_string()
}
fn default_binding_arguments() -> Vec<String> {
    vec![default_book_content_type(), default_contributor_content_type()]
}
fn default_prefetch() -> usize {
    8
}
fn default_error_exchange() -> String {
    "metadata.error".to_string()
}
fn default_error_message_timeout_ms() -> u64 {
    86_400_000
}
fn default_distributor_exchange() -> String {
    "metadata.distributed".to_string()
}
fn default_volatile_fields() -> Vec<String> {
    vec!["processedAt".to_string(), "system".to_string()]
}
fn default_database_path() -> PathBuf {
    PathBuf::from("folio.db")
}
fn default_http_listen() -> String {
    "127.0.0.1:5740".to_string()
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            book: default_book_schema(),
            contributor: default_contributor_schema(),
            book_content_type: default_book_content_type(),
            contributor_content_type: default_contributor_content_type(),
        }
    }
}
impl Default for ApiConfig {
    fn default() -> Self {
        Self { timeout_ms: default_api_timeout_ms() }
    }
}
impl Default for BusConfig {
    fn default() -> Self {
        Self {
            initial_retry_interval_ms: default_initial_retry_ms(),
            max_retry_interval_ms: default_max_retry_ms(),
        }
    }
}
impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            reindex_chunk: default_reindex_chunk(),
            base_url: None,
        }
    }
}
impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_listener_retry_ms(),
            actor_timeout_ms: default_actor_timeout_ms(),
            input: InputConfig::default(),
            error: ErrorConfig::default(),
            distributor: DistributorConfig::default(),
        }
    }
}
impl Default for InputConfig {
    fn default() -> Self {
        Self {
            queue: default_input_queue(),
            exchange: default_input_exchange(),
            exchange_type: default_exchange_type(),
            binding_arguments: default_binding_arguments(),
            prefetch: default_prefetch(),
        }
    }
}
impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            exchange: default_error_exchange(),
            message_timeout_ms: default_error_message_timeout_ms(),
        }
    }
}
impl Default for DistributorConfig {
    fn default() -> Self {
        Self { output_exchange: default_distributor_exchange() }
    }
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self { volatile_fields: default_volatile_fields() }
    }
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen: default_http_listen() }
    }
}

impl Config {
    /// Load configuration following the priority order in the module docs.
    pub fn load(cli_path: Option<&Path>) -> Result<Config> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var("FOLIO_CONFIG") {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = platform_config_file() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Config::default())
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.index.reindex_chunk == 0 {
            return Err(Error::Config("index.reindex_chunk must be positive".into()));
        }
        if self.listener.input.prefetch == 0 {
            return Err(Error::Config("listener.input.prefetch must be positive".into()));
        }
        if self.bus.initial_retry_interval_ms > self.bus.max_retry_interval_ms {
            return Err(Error::Config(
                "bus.initial_retry_interval_ms exceeds bus.max_retry_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Platform config file path, e.g. `~/.config/folio/config.toml` on Linux.
fn platform_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("folio").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_coherent() {
        let config = Config::default();
        assert_eq!(config.schema.book, "book.v2");
        assert_eq!(config.index.reindex_chunk, 100);
        assert_eq!(
            config.source.volatile_fields,
            vec!["processedAt".to_string(), "system".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn content_type_routing() {
        let schema = SchemaConfig::default();
        assert_eq!(
            schema.schema_for_content_type("application/vnd.folio.book.v2+json"),
            Some("book.v2")
        );
        assert_eq!(schema.schema_for_content_type("text/plain"), None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [schema]
            book = "book.v3"

            [index]
            reindex_chunk = 25
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.schema.book, "book.v3");
        assert_eq!(config.schema.contributor, "contributor.v2");
        assert_eq!(config.index.reindex_chunk, 25);
        assert_eq!(config.listener.input.prefetch, 8);
    }

    #[test]
    fn zero_chunk_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[index]\nreindex_chunk = 0\n").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
