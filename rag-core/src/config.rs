//! Typed configuration for every tunable enumerated in the request path.
//!
//! Defaults live in `Default` impls, and `Config::from_env` layers `RAG_*`
//! environment variable overrides on top for deployment-time tuning
//! without a rebuild.

use std::env;
use std::time::Duration;

/// Budget strategy selection (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStrategy {
    /// Largest reductions, lowest quality floor.
    Aggressive,
    /// Default middle ground.
    Balanced,
    /// Smallest reductions, highest quality floor.
    Conservative,
    /// Picks aggressive/balanced/conservative per query complexity.
    Adaptive,
}

impl Default for BudgetStrategy {
    fn default() -> Self {
        Self::Adaptive
    }
}

/// L1 in-process cache eviction policy (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionStrategy {
    /// Least-recently-used.
    Lru,
    /// Least-frequently-used.
    Lfu,
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        Self::Lru
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub target: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target: 600,
            overlap: 150,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub top_k_initial: usize,
    pub top_k_final: usize,
    pub similarity_threshold: f32,
    pub mmr_lambda: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k_initial: 8,
            top_k_final: 3,
            similarity_threshold: 0.75,
            mmr_lambda: 0.7,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub default_strategy: BudgetStrategy,
    pub max_context_tokens: usize,
    pub max_response_tokens: usize,
    pub adaptive_aggressive_toggle: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_strategy: BudgetStrategy::default(),
            max_context_tokens: 1500,
            max_response_tokens: 400,
            adaptive_aggressive_toggle: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct L1CacheConfig {
    pub max_size_mb: usize,
    pub strategy: EvictionStrategy,
    pub enabled: bool,
}

impl Default for L1CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 50,
            strategy: EvictionStrategy::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct L2CacheConfig {
    pub enabled: bool,
}

impl Default for L2CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SemanticCacheConfig {
    pub enabled: bool,
    pub threshold: f32,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HotPathConfig {
    pub promotion_threshold: f32,
    pub ttl_multiplier: u32,
    pub promotion_access_count: u32,
}

impl Default for HotPathConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 0.7,
            ttl_multiplier: 2,
            promotion_access_count: 5,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1: L1CacheConfig,
    pub l2: L2CacheConfig,
    pub semantic: SemanticCacheConfig,
    pub hot_path: HotPathConfig,
    pub batched_invalidation_size: usize,
    pub batched_invalidation_debounce: Duration,
    pub grace_period: Duration,
    /// Mirrors `SecurityConfig::enforce_rls`: there is only one RLS
    /// switch (§6), so this isn't independently configurable from a TOML
    /// file — `Config::apply_env_overrides` keeps it in sync after every
    /// load so the cache facade can gate `readable_by` without reaching
    /// back into the top-level `Config`.
    #[serde(skip)]
    pub enforce_rls: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: L1CacheConfig::default(),
            l2: L2CacheConfig::default(),
            semantic: SemanticCacheConfig::default(),
            hot_path: HotPathConfig::default(),
            batched_invalidation_size: 50,
            batched_invalidation_debounce: Duration::from_secs(1),
            grace_period: Duration::from_secs(120),
            enforce_rls: true,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enforce_rls: bool,
    pub allow_cross_user_caching: bool,
    pub max_cacheable_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enforce_rls: true,
            allow_cross_user_caching: false,
            max_cacheable_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RateLimitCategoryConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub auth: RateLimitCategoryConfig,
    pub general: RateLimitCategoryConfig,
    pub upload: RateLimitCategoryConfig,
    pub chat: RateLimitCategoryConfig,
    pub auto_notes: RateLimitCategoryConfig,
    pub auth_failure_block_threshold: u32,
    pub auth_failure_block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: RateLimitCategoryConfig {
                max_requests: 5,
                window_ms: 15 * 60 * 1000,
            },
            general: RateLimitCategoryConfig {
                max_requests: 120,
                window_ms: 60 * 1000,
            },
            upload: RateLimitCategoryConfig {
                max_requests: 20,
                window_ms: 60 * 1000,
            },
            chat: RateLimitCategoryConfig {
                max_requests: 30,
                window_ms: 60 * 1000,
            },
            auto_notes: RateLimitCategoryConfig {
                max_requests: 10,
                window_ms: 60 * 1000,
            },
            auth_failure_block_threshold: 5,
            auth_failure_block_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Root configuration object, the single thing a process constructs at
/// startup and threads through every subsystem (§9: no lazy singletons).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub chunker: ChunkerConfig,
    pub retriever: RetrieverConfig,
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load defaults, then apply `RAG_*` environment variable overrides.
    ///
    /// Only the knobs most commonly tuned per-deployment are wired to
    /// environment variables; the rest are set via the TOML config file
    /// read by the server binary.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Layer `RAG_*` environment variable overrides onto an existing
    /// config (e.g. one already loaded from a TOML file), in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("RAG_BUDGET_STRATEGY") {
            self.budget.default_strategy = match v.to_lowercase().as_str() {
                "aggressive" => BudgetStrategy::Aggressive,
                "balanced" => BudgetStrategy::Balanced,
                "conservative" => BudgetStrategy::Conservative,
                _ => BudgetStrategy::Adaptive,
            };
        }

        if let Ok(v) = env::var("RAG_CACHE_L1_MAX_SIZE_MB") {
            if let Ok(parsed) = v.parse() {
                self.cache.l1.max_size_mb = parsed;
            }
        }

        if let Ok(v) = env::var("RAG_CACHE_L2_ENABLED") {
            self.cache.l2.enabled = parse_bool(&v, self.cache.l2.enabled);
        }

        if let Ok(v) = env::var("RAG_SECURITY_ENFORCE_RLS") {
            self.security.enforce_rls = parse_bool(&v, self.security.enforce_rls);
        }

        if let Ok(v) = env::var("RAG_SECURITY_ALLOW_CROSS_USER_CACHING") {
            self.security.allow_cross_user_caching =
                parse_bool(&v, self.security.allow_cross_user_caching);
        }

        // The cache facade only holds `CacheConfig`, not the full
        // `Config`; mirror the one RLS switch onto it unconditionally so
        // a TOML-set `security.enforce_rls` (with no env override at
        // all) still reaches `MultiLayerCache`.
        self.cache.enforce_rls = self.security.enforce_rls;
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_budget_floor() {
        let config = Config::default();
        assert!(config.budget.max_context_tokens >= 500);
        assert!(config.budget.max_response_tokens >= 150);
    }

    #[test]
    fn env_override_parses_strategy() {
        unsafe {
            env::set_var("RAG_BUDGET_STRATEGY", "aggressive");
        }
        let config = Config::from_env();
        assert_eq!(config.budget.default_strategy, BudgetStrategy::Aggressive);
        unsafe {
            env::remove_var("RAG_BUDGET_STRATEGY");
        }
    }

    #[test]
    fn cache_enforce_rls_mirrors_security_enforce_rls() {
        unsafe {
            env::set_var("RAG_SECURITY_ENFORCE_RLS", "false");
        }
        let config = Config::from_env();
        assert!(!config.security.enforce_rls);
        assert!(!config.cache.enforce_rls);
        unsafe {
            env::remove_var("RAG_SECURITY_ENFORCE_RLS");
        }
    }
}
