use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rag_core::cache::{CacheKeyGenerator, KeyRequest};
use rag_core::chunk::Chunker;
use rag_core::config::ChunkerConfig;
use rag_core::embeddings::similarity::cosine_similarity;
use rag_core::types::{CachePriority, CacheSecurityLevel, ContentType};
use uuid::Uuid;

const CHAPTER_TEXT: &str = include_str!("../tests/request_pipeline.rs");

fn bench_chunker(c: &mut Criterion) {
    let chunker = Chunker::new(&ChunkerConfig::default());
    let book_id = Uuid::new_v4();
    c.bench_function("chunk_large_chapter", |b| {
        b.iter(|| chunker.chunk(black_box(book_id), black_box(0), black_box(CHAPTER_TEXT)));
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();
    c.bench_function("cosine_similarity_256d", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)));
    });
}

fn bench_cache_key_generation(c: &mut Criterion) {
    let book_id = Uuid::new_v4();
    c.bench_function("cache_key_generate", |b| {
        b.iter(|| {
            CacheKeyGenerator::generate(&KeyRequest {
                message: "what is the significance of the lighthouse in chapter three",
                selection: None,
                chapter_idx: Some(3),
                content_type: ContentType::Response,
                book_id,
                user_id: None,
                security_level: CacheSecurityLevel::Public,
                priority: CachePriority::Normal,
                stable_payload: "what is the significance of the lighthouse in chapter three|3",
                access_count: 0,
            })
        });
    });
}

criterion_group!(benches, bench_chunker, bench_cosine_similarity, bench_cache_key_generation);
criterion_main!(benches);
