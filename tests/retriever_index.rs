// tests/retriever_index.rs
//
// Vector retrieval over an on-disk index built with the local hashing
// embedder: ranking, bounds, determinism and the catalog fallback.

use std::path::Path;
use std::sync::Arc;

use quote_recommender::quote::{Origin, Quote};
use quote_recommender::retriever::{
    build_index, HashingEmbedder, ReadinessState, ResourceManager, VectorRetriever,
};

fn corpus() -> Vec<Quote> {
    vec![
        Quote::new("Hope is the light that survives the darkness", "A", "hope"),
        Quote::new("Success comes from effort and patience", "B", "success"),
        Quote::new("Joy lives in small everyday moments", "C", "happiness"),
        Quote::new("Failure is the first step toward success", "D", "success"),
        Quote::new("Rest is part of the journey", "E", "general"),
    ]
}

fn write_dataset(path: &Path, quotes: &[Quote]) {
    let lines: Vec<String> = quotes
        .iter()
        .map(|q| {
            serde_json::json!({ "quote": q.text, "author": q.author, "category": q.category })
                .to_string()
        })
        .collect();
    std::fs::write(path, lines.join("\n")).expect("write dataset");
}

async fn ready_retriever(dir: &Path) -> VectorRetriever {
    let embedder = Arc::new(HashingEmbedder::new(128));
    let quotes = corpus();
    let index = build_index(embedder.as_ref(), &quotes).await.expect("build index");
    let index_path = dir.join("quotes_index.json");
    let dataset_path = dir.join("quotes.jsonl");
    index.save(&index_path).expect("save index");
    write_dataset(&dataset_path, &quotes);

    let resources = Arc::new(ResourceManager::new(index_path, dataset_path, embedder));
    assert_eq!(resources.load_now().await, ReadinessState::Ready);
    VectorRetriever::new(resources)
}

#[tokio::test]
async fn exact_text_ranks_first_with_unit_similarity() {
    let dir = tempfile::tempdir().unwrap();
    let r = ready_retriever(dir.path()).await;

    let set = r.retrieve("Joy lives in small everyday moments", 3).await;
    assert_eq!(set.origin(), Origin::Embedding);
    assert_eq!(set.len(), 3);
    let top = set.current().unwrap();
    assert_eq!(top.quote.author, "C");
    assert!((top.similarity - 1.0).abs() < 1e-4, "got {}", top.similarity);
}

#[tokio::test]
async fn scores_are_non_increasing_and_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let r = ready_retriever(dir.path()).await;

    let a = r.retrieve("effort brings success", 5).await;
    let b = r.retrieve("effort brings success", 5).await;
    assert_eq!(a, b);
    let sims: Vec<f32> = a.quotes().iter().map(|q| q.similarity).collect();
    assert!(sims.windows(2).all(|w| w[0] >= w[1]), "{sims:?}");
    assert!(sims.iter().all(|s| (-1.0001..=1.0001).contains(s)));
}

#[tokio::test]
async fn k_larger_than_corpus_returns_everything() {
    let dir = tempfile::tempdir().unwrap();
    let r = ready_retriever(dir.path()).await;
    let set = r.retrieve("anything at all", 50).await;
    assert_eq!(set.len(), corpus().len());
}

#[tokio::test]
async fn empty_query_uses_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let r = ready_retriever(dir.path()).await;
    let set = r.retrieve("   ", 3).await;
    assert_eq!(set.origin(), Origin::Catalog);
    assert_eq!(set.len(), 3);
}

#[tokio::test]
async fn missing_artifacts_fall_back_to_catalog() {
    let resources = Arc::new(ResourceManager::new(
        "/nonexistent/index.json".into(),
        "/nonexistent/quotes.jsonl".into(),
        Arc::new(HashingEmbedder::new(64)),
    ));
    assert_eq!(resources.load_now().await, ReadinessState::Failed);
    let r = VectorRetriever::new(resources);

    let set = r.retrieve("임베딩 테스트", 3).await;
    assert_eq!(set.origin(), Origin::Catalog);
    assert_eq!(set.len(), 3);
    assert_eq!(set.current().unwrap().quote.author, "랄프 왈도 에머슨");
}

#[tokio::test]
async fn dimension_mismatch_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let quotes = corpus();
    let index = build_index(&HashingEmbedder::new(32), &quotes).await.unwrap();
    let index_path = dir.path().join("i.json");
    let dataset_path = dir.path().join("q.jsonl");
    index.save(&index_path).unwrap();
    write_dataset(&dataset_path, &quotes);

    // Query embedder disagrees with the stored dimension.
    let resources = Arc::new(ResourceManager::new(
        index_path,
        dataset_path,
        Arc::new(HashingEmbedder::new(64)),
    ));
    assert_eq!(resources.load_now().await, ReadinessState::Ready);
    let set = VectorRetriever::new(resources).retrieve("hope", 2).await;
    assert_eq!(set.origin(), Origin::Catalog);
}
