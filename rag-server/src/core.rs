//! The request-fulfillment orchestrator (§9 dependency graph): wires the
//! security façades in front of the RAG pipeline and the cache, in the
//! fixed order `Validator → RateLimiter → Auth → CacheFacade →
//! BudgetManager → Retriever → Completer → AuditSink`.
//!
//! `Core` owns every long-lived collaborator for the life of the process;
//! a request borrows it through an `Arc` rather than threading each
//! collaborator through call sites individually.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use rag_core::budget::{BudgetDecision, BudgetManager, QualityRollback};
use rag_core::cache::{CacheKeyGenerator, GetOptions, KeyRequest, MultiLayerCache, SetOptions};
use rag_core::chunk::Chunker;
use rag_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use rag_core::complete::{CompleterConfig, Completer};
use rag_core::config::Config;
use rag_core::embeddings::cache::EmbeddingCache;
use rag_core::enhance::{self, EnhancementArtifact};
use rag_core::error::{Error, Result};
use rag_core::persistence::PersistenceAdapter;
use rag_core::prompt::{PromptAssembler, PromptVariant};
use rag_core::providers::{ChapterStore, CompletionProvider, CompletionRequest, EmbeddingProvider, IdentityProvider};
use rag_core::retrieval::index::VectorIndex;
use rag_core::retrieval::mmr::RankedChunk;
use rag_core::retrieval::retriever::{Retriever, RetrieverConfig as RetrievalConfig};
use rag_core::retry::RetryPolicy;
use rag_core::security::audit::{AuditEntry, AuditEventType, AuditLogger};
use rag_core::types::{CacheEntryValue, CachePriority, CacheSecurityLevel, ChunkRef, ContentType, QualityMetrics, SecurityContext};
use rag_core::vectorstore::{BookShareContext, VectorStore};

use crate::protocol::{ChatRequest, Done, SourceRef, StreamEvent, Usage};
use crate::security::rate_limit::{Decision, RateLimitCategory, RateLimiter};
use crate::security::AuthFacade;

/// Request metadata that doesn't live on the wire body: caller IP,
/// user agent and bearer credential, attached by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
    pub bearer_token: Option<String>,
}

/// Cap on how many primary keys one semantic bucket retains as lookup
/// candidates before the oldest is evicted (§4.9 semantic layer, kept
/// bounded since the facade itself doesn't index by semantic key).
const SEMANTIC_INDEX_BUCKET_CAP: usize = 16;

pub struct Core {
    persistence: Arc<dyn PersistenceAdapter>,
    chapters: Arc<dyn ChapterStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    cache: Arc<MultiLayerCache>,
    rate_limiter: RateLimiter,
    auth: AuthFacade,
    budget: BudgetManager,
    chunker: Chunker,
    embedding_cache: EmbeddingCache,
    prompt_assembler: PromptAssembler,
    completer: Completer,
    audit: AuditLogger,
    config: Config,
    vector_indexes: RwLock<HashMap<Uuid, Arc<VectorIndex>>>,
    vector_store: RwLock<VectorStore>,
    semantic_index: RwLock<HashMap<String, Vec<String>>>,
    embed_breaker: CircuitBreaker,
    complete_breaker: CircuitBreaker,
    quality_rollback: QualityRollback,
}

impl Core {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: Arc<dyn PersistenceAdapter>,
        chapters: Arc<dyn ChapterStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        completions: Arc<dyn CompletionProvider>,
        identity: Arc<dyn IdentityProvider>,
        l2: Option<Arc<dyn rag_core::cache::SharedCache>>,
        config: Config,
    ) -> Self {
        let audit = AuditLogger::new(rag_core::security::audit::AuditConfig::from_env());
        let auth = AuthFacade::new(identity, persistence.clone(), audit.clone(), config.rate_limit.clone());
        Self {
            rate_limiter: RateLimiter::new(persistence.clone()),
            auth,
            budget: BudgetManager::new(config.budget.clone()),
            chunker: Chunker::new(&config.chunker),
            embedding_cache: EmbeddingCache::new(),
            prompt_assembler: PromptAssembler::default(),
            completer: Completer::new(completions, CompleterConfig::default()),
            cache: Arc::new(MultiLayerCache::new(config.cache.clone(), l2)),
            vector_indexes: RwLock::new(HashMap::new()),
            vector_store: RwLock::new(VectorStore::new()),
            semantic_index: RwLock::new(HashMap::new()),
            embed_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            complete_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            quality_rollback: QualityRollback::new(),
            persistence,
            chapters,
            embeddings,
            audit,
            config,
        }
    }

    #[must_use]
    pub fn cache(&self) -> Arc<MultiLayerCache> {
        self.cache.clone()
    }

    /// Minute-tick housekeeping (§5.a): drain the batched invalidation
    /// queue, purge expired L1 and embedding-cache entries, and purge
    /// rate-limit history older than the window any category cares about.
    pub async fn run_minute_housekeeping(&self) {
        let now = Utc::now();
        match self.cache.drain_batched_invalidations(now).await {
            Ok(count) if count > 0 => tracing::debug!(count, "drained batched cache invalidations"),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "batched invalidation drain failed"),
        }
        self.cache.purge_expired_l1(now);
        self.embedding_cache.purge_expired();

        let cutoff = now - chrono::Duration::hours(24);
        if let Err(err) = self.persistence.purge_all_rate_limit_entries(cutoff).await {
            tracing::warn!(%err, "rate-limit entry purge failed");
        }
    }

    /// Five-minute-tick housekeeping (§5.b/§5.c): evict stale vector-store
    /// embeddings and thin concept clusters. Hot-path promotion to L2
    /// already happens inline on every `get`/`set` (§4.9), so there is no
    /// separate recompute step to run here.
    pub async fn run_five_minute_housekeeping(&self) {
        let now = Utc::now();
        let removed = self.vector_store.write().evict_stale(now, chrono::Duration::days(7));
        if removed > 0 {
            tracing::debug!(removed, "evicted stale vector-store embeddings");
        }
    }

    /// Drive one chat request to completion, returning a stream of
    /// ordered events: `sources`, zero or more `token`s, `usage`, then
    /// `done` — or a single `error` in place of the rest (§6).
    pub fn handle_chat(self: &Arc<Self>, request: ChatRequest, meta: RequestMeta, endpoint: &'static str) -> BoxStream<'static, StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = core.run_pipeline(request, meta, endpoint, &tx).await {
                let body = crate::protocol::ErrorBody::from_error(&err, Uuid::new_v4(), Utc::now());
                let _ = tx.send(StreamEvent::Error(body));
            }
        });
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn run_pipeline(
        &self,
        request: ChatRequest,
        meta: RequestMeta,
        endpoint: &'static str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<()> {
        // 1. RateLimiter (§9: validation itself already ran in the HTTP
        // layer before this pipeline starts).
        let category_config = self.config.rate_limit.chat;
        match self
            .rate_limiter
            .check(RateLimitCategory::Chat, category_config, &meta.ip, &meta.ip, &meta.user_agent, endpoint)
            .await?
        {
            Decision::Allow { .. } => {}
            Decision::Deny { retry_after_secs } => return Err(Error::RateLimited { retry_after_secs }),
        }

        // 2. Auth.
        let ctx = self.auth.authenticate(meta.bearer_token.as_deref(), &meta.ip, endpoint).await?;

        // Book lookup + RLS gate.
        let book = self
            .persistence
            .get_book(request.book_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("book {}", request.book_id)))?;
        if self.config.security.enforce_rls && !book.readable_by(ctx.user_id) {
            self.audit.log(AuditEntry::new(AuditEventType::RlsViolationBlocked, &meta.ip, endpoint, Utc::now()));
            return Err(Error::Forbidden("you do not have access to this book".to_string()));
        }

        let selection_text = request.context.as_ref().map(|c| c.text.as_str());
        let security_level = if book.public { CacheSecurityLevel::Public } else { CacheSecurityLevel::Private };

        // 3. CacheFacade.
        let stable_payload = serde_json::json!({
            "book_id": request.book_id,
            "message": request.message,
            "intent": request.intent,
            "selection": selection_text,
        })
        .to_string();

        let key_request = KeyRequest {
            message: &request.message,
            selection: selection_text,
            chapter_idx: None,
            content_type: ContentType::Response,
            book_id: request.book_id,
            user_id: ctx.user_id,
            security_level,
            priority: CachePriority::Normal,
            stable_payload: &stable_payload,
            access_count: 0,
        };
        let key_result = CacheKeyGenerator::generate(&key_request);
        let now = Utc::now();

        if let Some(hit) = self.cache.get(&key_result.primary_key, &ctx, GetOptions::default(), now).await? {
            return self.emit_cached(tx, &hit.entry.value, key_result.strategy_label).await;
        }
        if let Some(entry) = self.semantic_candidate(&key_result, &ctx, now).await {
            return self.emit_cached(tx, &entry.value, key_result.strategy_label).await;
        }

        // 4. BudgetManager.
        let stats = self.cache.stats();
        let total = stats.l1_hits + stats.l2_hits + stats.semantic_hits + stats.misses;
        let recent_hit_rate = if total == 0 { 0.0 } else { (stats.l1_hits + stats.l2_hits + stats.semantic_hits) as f32 / total as f32 };
        let cache_hit_probability = BudgetManager::estimate_cache_hit_probability(recent_hit_rate, &request.message);
        let decision = self.budget.decide(&request.message, cache_hit_probability);

        // 5. Retriever.
        let index = self.book_index(request.book_id).await?;
        let retriever = Retriever::new(
            index,
            self.embeddings.clone(),
            RetrievalConfig { top_k_initial: self.config.retriever.top_k_initial, relevance_floor: self.config.retriever.similarity_threshold },
        );
        let chapter_idx = None;
        let candidates = self
            .embed_breaker
            .call(|| retriever.retrieve(request.book_id, chapter_idx, &request.message))
            .await?;

        // §4.6: the coordinated reduction only runs on `apply`/`monitor`;
        // a `skip` recommendation leaves the retrieved candidates as-is.
        let reduced = if decision.recommendation == rag_core::budget::Recommendation::Skip {
            candidates
        } else {
            self.budget.reduce_chunks(&decision, candidates, &request.message)
        };
        let sources: Vec<SourceRef> = reduced.iter().map(|c| SourceRef::new(c.chunk, c.similarity)).collect();
        let chunk_refs: Vec<ChunkRef> = reduced.iter().map(|c| c.chunk).collect();
        let _ = tx.send(StreamEvent::Sources(sources));

        // §8 boundary: zero chunks retrieved -> empty sources, no
        // fabricated answer. Still completes, with no grounding text.
        let ranked = if reduced.is_empty() {
            Vec::new()
        } else {
            rag_core::retrieval::mmr::select(reduced, &request.message, self.config.retriever.mmr_lambda, self.config.retriever.top_k_final)
        };

        // §4.8 Knowledge Enhancer: `enhance`-intent requests return a
        // structured JSON artifact instead of free-form prose, so they
        // branch off before prompt assembly rather than sharing it.
        if request.intent == Some(crate::protocol::Intent::Enhance) {
            return self
                .run_enhance(&request, selection_text, &ranked, &key_result, security_level, chunk_refs, &decision, &ctx, &book, now, &meta, endpoint, tx)
                .await;
        }

        let variant = match request.intent {
            Some(crate::protocol::Intent::Summarize) => PromptVariant::Verbose,
            _ => PromptVariant::Concise,
        };
        let assembled = self.prompt_assembler.assemble(variant, &request.message, selection_text, &ranked);

        // 6. Completer.
        let completion_request = CompletionRequest {
            model: "default".to_string(),
            system_prompt: assembled.system_prompt,
            user_prompt: assembled.user_prompt,
            max_response_tokens: decision.budget.response_tokens as u32,
            temperature: 0.7,
        };

        let (token_tx, mut token_rx) = mpsc::unbounded_channel::<String>();
        let completer = &self.completer;
        let forward = async {
            while let Some(token) = token_rx.recv().await {
                let _ = tx.send(StreamEvent::Token(token));
            }
        };
        let complete = self.complete_breaker.call(|| completer.complete_streaming(completion_request, Some(&token_tx)));
        let (outcome, ()) = tokio::join!(complete, forward);
        let outcome = outcome?;

        // Cache the result before emitting usage/done, per the fixed
        // pipeline order (CacheFacade writes are part of fulfilling this
        // request, not a side effect after it's closed).
        let entry_value = CacheEntryValue {
            answer: outcome.text.clone(),
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            sources: chunk_refs,
            confidence: Some(decision.quality_impact),
            kind: "response".to_string(),
        };
        self.cache
            .set(key_result.primary_key.clone(), entry_value, SetOptions { content_type: ContentType::Response, security_level, user_id: ctx.user_id, ..SetOptions::default() }, now)
            .await?;
        self.register_semantic(&key_result.semantic_key, &key_result.primary_key);
        self.remember_embedding(&request, &book, &ctx, now).await;

        let quality_score = 1.0 - decision.quality_impact;
        self.observe_quality(quality_score, now);

        let usage = Usage {
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            total_tokens: outcome.prompt_tokens + outcome.completion_tokens,
            cost_usd: 0.0,
            model_used: self.embeddings.model_name().to_string(),
            cached: false,
            budget_strategy: format!("{:?}", decision.resolved_strategy).to_lowercase(),
            estimated_savings: (decision.context_reduction_ratio + decision.response_reduction_ratio) / 2.0 * 100.0,
            quality_score,
            optimization_applied: matches!(decision.recommendation, rag_core::budget::Recommendation::Apply | rag_core::budget::Recommendation::Monitor),
        };
        let _ = tx.send(StreamEvent::Usage(usage));
        let _ = tx.send(StreamEvent::Done(Done { completed_at: Utc::now(), cached: false }));

        let mut completed = AuditEntry::new(AuditEventType::RequestCompleted, &meta.ip, endpoint, Utc::now());
        if let Some(user_id) = ctx.user_id {
            completed = completed.with_user(user_id);
        }
        self.persistence.insert_audit_event(completed.clone().into_row()).await?;
        self.audit.log(completed);

        Ok(())
    }

    /// §4.8 Knowledge Enhancer path: classify the selection, ask the
    /// completer for a JSON artifact, validate and score it, and
    /// regenerate once with a smaller fallback prompt if the first
    /// attempt falls below the quality floor or doesn't parse/validate.
    #[allow(clippy::too_many_arguments)]
    async fn run_enhance(
        &self,
        request: &ChatRequest,
        selection_text: Option<&str>,
        ranked: &[RankedChunk],
        key_result: &rag_core::types::CacheKeyResult,
        security_level: CacheSecurityLevel,
        chunk_refs: Vec<ChunkRef>,
        decision: &BudgetDecision,
        ctx: &SecurityContext,
        book: &rag_core::types::Book,
        now: chrono::DateTime<Utc>,
        meta: &RequestMeta,
        endpoint: &'static str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<()> {
        let selection = selection_text.unwrap_or(&request.message);
        let kind = enhance::classify(selection);
        let prompt = enhance::build_prompt(kind, selection, ranked);

        let primary_request = CompletionRequest {
            model: "default".to_string(),
            system_prompt: prompt.system_prompt,
            user_prompt: prompt.user_prompt,
            max_response_tokens: decision.budget.response_tokens as u32,
            temperature: 0.2,
        };
        let completer = &self.completer;
        let mut outcome = self.complete_breaker.call(|| completer.complete(primary_request)).await?;
        let mut artifact = parse_artifact(&outcome.text);
        let mut metrics = artifact.as_ref().map(|a| enhance::quality_of(a, selection));

        let needs_retry = match &metrics {
            Some(m) => enhance::needs_fallback(m),
            None => true,
        };
        if needs_retry {
            let fallback = enhance::build_fallback_prompt(selection);
            let fallback_request = CompletionRequest {
                model: "default".to_string(),
                system_prompt: fallback.system_prompt,
                user_prompt: fallback.user_prompt,
                max_response_tokens: decision.budget.response_tokens as u32,
                temperature: 0.2,
            };
            let completer = &self.completer;
            let fallback_outcome = self.complete_breaker.call(|| completer.complete(fallback_request)).await?;
            if let Some(fallback_artifact) = parse_artifact(&fallback_outcome.text) {
                metrics = Some(enhance::quality_of(&fallback_artifact, selection));
                artifact = Some(fallback_artifact);
                outcome = fallback_outcome;
            }
        }

        let artifact = artifact.unwrap_or_default();
        let metrics = metrics.unwrap_or(QualityMetrics { relevance: 0.0, diversity: 0.0, completeness: 0.0, coherence: 0.0 });
        let artifact_json = serde_json::to_string(&artifact)?;

        let entry_value = CacheEntryValue {
            answer: artifact_json.clone(),
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            sources: chunk_refs,
            confidence: Some(metrics.overall()),
            kind: "enhancement".to_string(),
        };
        self.cache
            .set(
                key_result.primary_key.clone(),
                entry_value,
                SetOptions { content_type: ContentType::Analysis, security_level, user_id: ctx.user_id, ..SetOptions::default() },
                now,
            )
            .await?;
        self.register_semantic(&key_result.semantic_key, &key_result.primary_key);
        self.remember_embedding(request, book, ctx, now).await;
        self.observe_quality(metrics.overall(), now);

        let _ = tx.send(StreamEvent::Token(artifact_json));
        let usage = Usage {
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            total_tokens: outcome.prompt_tokens + outcome.completion_tokens,
            cost_usd: 0.0,
            model_used: self.embeddings.model_name().to_string(),
            cached: false,
            budget_strategy: format!("{:?}", decision.resolved_strategy).to_lowercase(),
            estimated_savings: (decision.context_reduction_ratio + decision.response_reduction_ratio) / 2.0 * 100.0,
            quality_score: metrics.overall(),
            optimization_applied: matches!(decision.recommendation, rag_core::budget::Recommendation::Apply | rag_core::budget::Recommendation::Monitor),
        };
        let _ = tx.send(StreamEvent::Usage(usage));
        let _ = tx.send(StreamEvent::Done(Done { completed_at: Utc::now(), cached: false }));

        let mut completed = AuditEntry::new(AuditEventType::RequestCompleted, &meta.ip, endpoint, Utc::now());
        if let Some(user_id) = ctx.user_id {
            completed = completed.with_user(user_id);
        }
        self.persistence.insert_audit_event(completed.clone().into_row()).await?;
        self.audit.log(completed);

        Ok(())
    }

    async fn emit_cached(&self, tx: &mpsc::UnboundedSender<StreamEvent>, value: &CacheEntryValue, strategy_label: String) -> Result<()> {
        let sources: Vec<SourceRef> = value.sources.iter().map(|c| SourceRef::new(*c, value.confidence.unwrap_or(1.0))).collect();
        let _ = tx.send(StreamEvent::Sources(sources));
        let _ = tx.send(StreamEvent::Token(value.answer.clone()));
        let usage = Usage {
            prompt_tokens: value.prompt_tokens,
            completion_tokens: value.completion_tokens,
            total_tokens: value.prompt_tokens + value.completion_tokens,
            cost_usd: 0.0,
            model_used: self.embeddings.model_name().to_string(),
            cached: true,
            budget_strategy: strategy_label,
            estimated_savings: 100.0,
            quality_score: value.confidence.unwrap_or(1.0),
            optimization_applied: false,
        };
        let _ = tx.send(StreamEvent::Usage(usage));
        let _ = tx.send(StreamEvent::Done(Done { completed_at: Utc::now(), cached: true }));
        Ok(())
    }

    async fn semantic_candidate(&self, key_result: &rag_core::types::CacheKeyResult, ctx: &SecurityContext, now: chrono::DateTime<Utc>) -> Option<rag_core::types::StoredEntry> {
        let candidate_keys: Vec<String> = self.semantic_index.read().get(&key_result.semantic_key).cloned().unwrap_or_default();
        let mut candidates = Vec::new();
        for key in &candidate_keys {
            if let Ok(Some(hit)) = self.cache.get(key, ctx, GetOptions::default(), now).await {
                candidates.push(hit.entry);
            }
        }
        self.cache.get_semantic(&key_result.semantic_key, &key_result.primary_key, &candidates, ctx).await
    }

    fn register_semantic(&self, semantic_key: &str, primary_key: &str) {
        let mut index = self.semantic_index.write();
        let bucket = index.entry(semantic_key.to_string()).or_default();
        if !bucket.contains(&primary_key.to_string()) {
            bucket.push(primary_key.to_string());
            if bucket.len() > SEMANTIC_INDEX_BUCKET_CAP {
                bucket.remove(0);
            }
        }
    }

    /// Lazily build (or return an already-built) vector index for a book
    /// from its persisted chapter embeddings, embedding and chunking
    /// on the fly for any chapter that hasn't been embedded yet.
    async fn book_index(&self, book_id: Uuid) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.vector_indexes.read().get(&book_id).cloned() {
            return Ok(index);
        }

        let dimension = self.embeddings.dimension();
        let mut index = VectorIndex::new(dimension);

        let persisted = self.persistence.get_chapter_embeddings(book_id).await?;
        if !persisted.is_empty() {
            for row in persisted {
                let chunk = ChunkRef { book_id: row.book_id, chapter_idx: row.chapter_idx, start: row.start, end: row.end };
                index.insert(chunk, row.content, row.vector)?;
            }
        } else {
            for chapter in self.chapters.chapters(book_id).await? {
                for chunk in self.chunker.chunk(book_id, chapter.idx, &chapter.text) {
                    let text = chapter.text[chunk.start..chunk.end].to_string();
                    let vector = self.embed_with_cache(&text).await?;
                    self.persistence
                        .insert_chapter_embedding(rag_core::persistence::ChapterEmbeddingRow {
                            id: Uuid::new_v4(),
                            book_id,
                            chapter_idx: chapter.idx,
                            start: chunk.start,
                            end: chunk.end,
                            vector: vector.clone(),
                            content: text.clone(),
                        })
                        .await?;
                    index.insert(chunk, text, vector)?;
                }
            }
        }

        let index = Arc::new(index);
        self.vector_indexes.write().insert(book_id, index.clone());
        Ok(index)
    }

    async fn embed_with_cache(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.embedding_cache.get(text) {
            return Ok(vector);
        }
        let mut retry = RetryPolicy::new();
        let embeddings = self.embeddings.clone();
        let breaker = &self.embed_breaker;
        let text_owned = text.to_string();
        let vector = retry
            .execute(|| {
                let text_owned = text_owned.clone();
                let embeddings = embeddings.clone();
                async move { breaker.call(|| async { embeddings.embed_text(&text_owned).await }).await }
            })
            .await?;
        self.embedding_cache.put(text, vector.clone());
        Ok(vector)
    }

    /// Record one answer's quality into the rolling rollback tracker
    /// (§8 scenario 6). If this measurement trips the rollback, purge
    /// cache entries below the quality floor and audit the event;
    /// predictive precomputation (`self.predictive_enabled`) then reports
    /// disabled until the cooldown elapses.
    fn observe_quality(&self, quality: f32, now: chrono::DateTime<Utc>) {
        if self.quality_rollback.record(quality, now) {
            let purged = self.cache.purge_low_quality(rag_core::budget::QualityRollback::purge_floor());
            tracing::warn!(purged, "quality rollback tripped: predictive precomputation disabled for 1h");
            self.audit.log(AuditEntry::new(AuditEventType::QualityRollbackTripped, "internal", "housekeeping", now));
        }
    }

    /// `true` if predictive precomputation (§4.10) is currently permitted;
    /// `false` while a quality rollback cooldown (§8 scenario 6) is active.
    #[must_use]
    pub fn predictive_enabled(&self, now: chrono::DateTime<Utc>) -> bool {
        self.quality_rollback.predictive_enabled(now)
    }

    /// Fold the query embedding into the auxiliary cross-user vector
    /// store (§4.10). Purely additive bookkeeping for future predictive
    /// matches; never gates or blocks the primary request path.
    async fn remember_embedding(&self, request: &ChatRequest, book: &rag_core::types::Book, ctx: &SecurityContext, now: chrono::DateTime<Utc>) {
        let Some(user_id) = ctx.user_id else { return };
        let Ok(vector) = self.embeddings.embed_text(&request.message).await else { return };
        let share_ctx = BookShareContext { public: book.public };
        let fingerprint = CacheKeyGenerator::generate(&KeyRequest {
            message: &request.message,
            selection: request.context.as_ref().map(|c| c.text.as_str()),
            chapter_idx: None,
            content_type: ContentType::Response,
            book_id: request.book_id,
            user_id: None,
            security_level: CacheSecurityLevel::Public,
            priority: CachePriority::Normal,
            stable_payload: "",
            access_count: 0,
        })
        .semantic_key;
        let _ = self.vector_store.write().store_embedding(user_id, share_ctx, fingerprint, vector, request.message.clone(), request.book_id, now);
    }
}

/// Parse a completion's raw text as an [`EnhancementArtifact`], accepting
/// it only if it also satisfies [`enhance::validate`]'s per-category caps
/// and required fields.
fn parse_artifact(text: &str) -> Option<EnhancementArtifact> {
    let artifact: EnhancementArtifact = serde_json::from_str(text.trim()).ok()?;
    enhance::validate(&artifact).ok()?;
    Some(artifact)
}
