//! Process entry point: load configuration, connect to persistence and
//! the L2 cache, wire the external-collaborator providers, build the
//! `Core`, spawn housekeepers, and serve the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use rag_cache_redb::RedbCache;
use rag_server::config::ServerConfig;
use rag_server::core::Core;
use rag_server::http;
use rag_server::providers::{HttpCompletionProvider, HttpEmbeddingProvider, JwtIdentityProvider, SqlChapterStore};
use rag_storage_sql::SqlStorage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config_path = std::env::var("RAG_SERVER_CONFIG").unwrap_or_else(|_| "rag-server.toml".to_string());
    let config = ServerConfig::load(&config_path).context("failed to load server configuration")?;

    let storage = Arc::new(
        SqlStorage::connect(&config.database.url, &config.database.auth_token).await.context("failed to connect to persistence")?,
    );

    let l2: Option<Arc<dyn rag_core::cache::SharedCache>> = if config.l2_cache.enabled {
        let cache = RedbCache::open(&config.l2_cache.path).context("failed to open L2 cache")?;
        Some(Arc::new(cache))
    } else {
        None
    };

    let embeddings = Arc::new(HttpEmbeddingProvider::new(config.provider.clone().into()).context("failed to build embedding provider")?);
    let completions = Arc::new(HttpCompletionProvider::new(config.provider.clone().into()).context("failed to build completion provider")?);
    let chapters = Arc::new(SqlChapterStore::new(storage.clone()));
    let identity = Arc::new(JwtIdentityProvider::new());

    let core = Arc::new(Core::new(storage, chapters, embeddings, completions, identity, l2, config.core.clone()));

    let housekeeper_handles = rag_server::housekeeper::spawn(core.clone());

    let addr = config.socket_addr().context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "rag-server listening");

    let app = http::router(core);
    axum::serve(listener, app).await.context("server exited unexpectedly")?;

    for handle in housekeeper_handles {
        handle.abort();
    }
    Ok(())
}
