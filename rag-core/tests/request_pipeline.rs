//! End-to-end exercise of the retrieval -> budget -> prompt -> completion
//! path with fake providers, matching the cold-miss and budget-applies
//! scenarios of the request-fulfillment design.

use std::sync::Arc;

use chrono::Utc;
use rag_core::budget::BudgetManager;
use rag_core::cache::{CacheKeyGenerator, GetOptions, KeyRequest, MultiLayerCache, SetOptions};
use rag_core::chunk::Chunker;
use rag_core::complete::Completer;
use rag_core::config::Config;
use rag_core::prompt::{PromptAssembler, PromptVariant};
use rag_core::providers::{CompletionRequest, EmbeddingProvider};
use rag_core::retrieval::mmr::{self, DEFAULT_K_FINAL, DEFAULT_LAMBDA};
use rag_core::retrieval::{Retriever, RetrieverConfig, VectorIndex};
use rag_core::types::{CacheEntryValue, CachePriority, CacheSecurityLevel, SecurityContext};
use rag_test_utils::{FakeCompletionProvider, FakeEmbeddingProvider};
use uuid::Uuid;

const CHAPTER_TEXT: &str = "The old lighthouse keeper climbed the spiral stairs every evening. \
    He had kept the light burning for forty years, through storms and calm alike. \
    His daughter worried about him living alone on the rocky point. \
    She visited every weekend, bringing supplies and news from the mainland. \
    The lighthouse had saved countless ships from the jagged rocks below.";

#[tokio::test]
async fn cold_query_retrieves_budgets_and_completes() {
    let config = Config::default();
    let book_id = Uuid::new_v4();
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new(32));

    let chunker = Chunker::new(&config.chunker);
    let refs = chunker.chunk(book_id, 0, CHAPTER_TEXT);
    assert!(!refs.is_empty());

    let mut index = VectorIndex::new(embeddings.dimension());
    for chunk in &refs {
        let text = &CHAPTER_TEXT[chunk.start..chunk.end];
        let vector = embeddings.embed_text(text).await.unwrap();
        index.insert(*chunk, text.to_string(), vector).unwrap();
    }

    let retriever = Retriever::new(Arc::new(index), embeddings.clone(), RetrieverConfig::default());
    let candidates = retriever.retrieve(book_id, Some(0), "Who keeps the lighthouse running?").await.unwrap();
    assert!(!candidates.is_empty());

    let manager = BudgetManager::new(config.budget.clone());
    let decision = manager.decide("Who keeps the lighthouse running?", 0.1);
    let reduced = manager.reduce_chunks(&decision, candidates, "Who keeps the lighthouse running?");
    assert!(!reduced.is_empty());
    let ranked = mmr::select(reduced, "Who keeps the lighthouse running?", DEFAULT_LAMBDA, DEFAULT_K_FINAL);

    let assembler = PromptAssembler::default();
    let assembled = assembler.assemble(PromptVariant::Concise, "Who keeps the lighthouse running?", Some("the lighthouse"), &ranked);
    assert!(assembled.user_prompt.contains("lighthouse"));

    let completer = Completer::new(Arc::new(FakeCompletionProvider::default()), Default::default());
    let outcome = completer
        .complete(CompletionRequest {
            model: "fake".into(),
            system_prompt: assembled.system_prompt,
            user_prompt: assembled.user_prompt,
            max_response_tokens: 400,
            temperature: 0.3,
        })
        .await
        .unwrap();
    assert!(!outcome.text.is_empty());
    assert!(outcome.completion_tokens > 0);
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let config = Config::default();
    let cache = MultiLayerCache::new(config.cache.clone(), None);
    let ctx = SecurityContext::anonymous("127.0.0.1", "/ask");

    let key_request = KeyRequest {
        message: "summarize chapter one",
        selection: None,
        chapter_idx: Some(0),
        content_type: rag_core::types::ContentType::Response,
        book_id: Uuid::new_v4(),
        user_id: None,
        security_level: CacheSecurityLevel::Public,
        priority: CachePriority::Normal,
        stable_payload: "summarize chapter one|0",
        access_count: 0,
    };
    let key = CacheKeyGenerator::generate(&key_request);

    let now = Utc::now();
    let value = CacheEntryValue {
        answer: "A lighthouse keeper tends the light.".into(),
        prompt_tokens: 120,
        completion_tokens: 20,
        sources: vec![],
        confidence: Some(0.9),
        kind: "ask".into(),
    };
    cache
        .set(
            key.primary_key.clone(),
            value,
            SetOptions { content_type: rag_core::types::ContentType::Response, ..Default::default() },
            now,
        )
        .await
        .unwrap();

    let hit = cache.get(&key.primary_key, &ctx, GetOptions::default(), now).await.unwrap();
    assert!(hit.is_some());
    assert!(hit.unwrap().fresh);
}
