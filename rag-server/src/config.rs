//! Server-process configuration: the network-facing and provider-facing
//! knobs that sit above [`rag_core::config::Config`]. Loaded from an
//! optional TOML file with `RAG_SERVER_*` environment overrides layered
//! on top, so a deployer can tune a running process without a rebuild.

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use rag_core::config::Config;
use rag_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::providers::HttpProviderConfig;

/// Database connection settings (`rag-storage-sql`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `libsql://...`, `file:...` or `:memory:`.
    pub url: String,
    /// Bearer token for remote `libsql://` connections; ignored otherwise.
    pub auth_token: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "file:rag.db".to_string(), auth_token: String::new() }
    }
}

/// L2 (shared/redb) cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L2StorageConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for L2StorageConfig {
    fn default() -> Self {
        Self { enabled: true, path: "rag-cache.redb".to_string() }
    }
}

/// Top-level process configuration: where to listen, how to reach
/// persistence and the L2 cache, how to reach the embedding/completion
/// providers, and every `rag-core` tunable from spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database: DatabaseConfig,
    pub l2_cache: L2StorageConfig,
    pub provider: HttpProviderConfigToml,
    pub core: Config,
}

/// `serde`-friendly mirror of [`HttpProviderConfig`] (which carries a
/// `Duration` that needs an explicit seconds field on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfigToml {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub completion_model: String,
    pub request_timeout_secs: u64,
}

impl Default for HttpProviderConfigToml {
    fn default() -> Self {
        let defaults = HttpProviderConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: defaults.api_key,
            embedding_model: defaults.embedding_model,
            embedding_dimension: defaults.embedding_dimension,
            completion_model: defaults.completion_model,
            request_timeout_secs: defaults.request_timeout.as_secs(),
        }
    }
}

impl From<HttpProviderConfigToml> for HttpProviderConfig {
    fn from(value: HttpProviderConfigToml) -> Self {
        Self {
            base_url: value.base_url,
            api_key: value.api_key,
            embedding_model: value.embedding_model,
            embedding_dimension: value.embedding_dimension,
            completion_model: value.completion_model,
            request_timeout: std::time::Duration::from_secs(value.request_timeout_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database: DatabaseConfig::default(),
            l2_cache: L2StorageConfig::default(),
            provider: HttpProviderConfigToml::default(),
            core: Config::from_env(),
        }
    }
}

impl ServerConfig {
    /// Load defaults, overlay an optional TOML file at `path` (if it
    /// exists), then apply `RAG_SERVER_*` / `RAG_*` environment overrides.
    /// Unreadable-but-present config files are a hard `Configuration`
    /// error rather than a silent fallback to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Configuration(format!("failed to read {}: {e}", path.as_ref().display())))?;
            toml::from_str(&raw).map_err(|e| Error::Configuration(format!("failed to parse {}: {e}", path.as_ref().display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("RAG_SERVER_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = env::var("RAG_SERVER_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("RAG_SERVER_DATABASE_TOKEN") {
            self.database.auth_token = v;
        }
        if let Ok(v) = env::var("RAG_SERVER_L2_CACHE_PATH") {
            self.l2_cache.path = v;
        }
        if let Ok(v) = env::var("RAG_SERVER_PROVIDER_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Ok(v) = env::var("RAG_SERVER_PROVIDER_API_KEY") {
            self.provider.api_key = v;
        }
        self.core.apply_env_overrides();
    }

    /// The address to bind the HTTP listener to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| Error::Configuration(format!("invalid listen_addr {}: {e}", self.listen_addr)))
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loadable_without_a_file() {
        let config = ServerConfig::load("/nonexistent/path/rag-server.toml").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn env_override_wins_over_file_default() {
        unsafe {
            env::set_var("RAG_SERVER_LISTEN_ADDR", "127.0.0.1:9090");
        }
        let config = ServerConfig::load("/nonexistent/path/rag-server.toml").unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9090");
        unsafe {
            env::remove_var("RAG_SERVER_LISTEN_ADDR");
        }
    }
}
