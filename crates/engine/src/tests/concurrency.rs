//! Concurrency tests for the index: searches snapshot whole documents,
//! and writers only exclude each other per document.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use crate::{ChunkMetadata, DocumentRecord, EmbeddingIndex, IndexEntry};

const DIMS: usize = 4;

fn unit(direction: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[direction % DIMS] = 1.0;
    v
}

fn record(id: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        source_path: None,
        format: "text".to_string(),
        title: None,
        content_hash: String::new(),
        ingested_at: Utc::now(),
        chunk_count: 0,
        byte_count: 0,
    }
}

fn entry(document_id: &str, seq: u32, tag: &str) -> IndexEntry {
    IndexEntry {
        chunk_id: format!("{}:{}#{}", tag, document_id, seq),
        document_id: document_id.to_string(),
        seq,
        start: (seq as usize) * 100,
        end: (seq as usize + 1) * 100,
        overlap: 0,
        text: format!("{} chunk {}", tag, seq),
        embedding: unit(seq as usize),
        metadata: ChunkMetadata::default(),
    }
}

fn entries(document_id: &str, count: u32, tag: &str) -> Vec<IndexEntry> {
    (0..count).map(|seq| entry(document_id, seq, tag)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_stays_complete_while_other_document_churns() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(EmbeddingIndex::open(&dir.path().join("index.sqlite3"), DIMS).unwrap());

    index
        .replace_document(record("keep.md"), entries("keep.md", 4, "keep"))
        .await
        .unwrap();
    index
        .replace_document(record("churn.md"), entries("churn.md", 4, "churn"))
        .await
        .unwrap();

    let churner = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for _ in 0..30 {
                index.delete("churn.md").await.unwrap();
                index
                    .replace_document(record("churn.md"), entries("churn.md", 4, "churn"))
                    .await
                    .unwrap();
            }
        })
    };

    let query = vec![1.0; DIMS];
    for _ in 0..200 {
        let hits = index.search(&query, 10, Some("keep")).await.unwrap();
        assert_eq!(hits.len(), 4, "scoped search must always see the full document");
        assert!(hits.iter().all(|hit| hit.document_id == "keep.md"));
        tokio::task::yield_now().await;
    }

    churner.await.unwrap();
    assert!(index
        .catalog()
        .await
        .iter()
        .any(|doc| doc.document_id == "keep.md"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_never_sees_half_replaced_document() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(EmbeddingIndex::open(&dir.path().join("index.sqlite3"), DIMS).unwrap());

    // Two versions of the same document with different sizes and markers.
    index
        .replace_document(record("pets.md"), entries("pets.md", 3, "alpha"))
        .await
        .unwrap();

    let writer = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for round in 0..30u32 {
                let (count, tag) = if round % 2 == 0 { (5, "beta") } else { (3, "alpha") };
                index
                    .replace_document(record("pets.md"), entries("pets.md", count, tag))
                    .await
                    .unwrap();
            }
        })
    };

    let query = vec![1.0; DIMS];
    for _ in 0..200 {
        let hits = index.search(&query, 10, None).await.unwrap();
        let tags: Vec<&str> = hits
            .iter()
            .map(|hit| hit.text.split_whitespace().next().unwrap())
            .collect();
        assert!(
            tags.iter().all(|tag| *tag == tags[0]),
            "one search must never mix document versions: {:?}",
            tags
        );
        match tags[0] {
            "alpha" => assert_eq!(hits.len(), 3),
            "beta" => assert_eq!(hits.len(), 5),
            other => panic!("unexpected marker {:?}", other),
        }
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_to_distinct_documents_run_in_parallel() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(EmbeddingIndex::open(&dir.path().join("index.sqlite3"), DIMS).unwrap());

    let left = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for _ in 0..20 {
                index
                    .replace_document(record("left.md"), entries("left.md", 4, "left"))
                    .await
                    .unwrap();
            }
        })
    };
    let right = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for _ in 0..20 {
                index
                    .replace_document(record("right.md"), entries("right.md", 4, "right"))
                    .await
                    .unwrap();
            }
        })
    };
    left.await.unwrap();
    right.await.unwrap();

    let stats = index.stats().await;
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 8);

    let catalog = index.catalog().await;
    assert!(catalog.iter().all(|doc| doc.chunk_count == 4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_to_one_document_all_land() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.sqlite3");
    let index = Arc::new(EmbeddingIndex::open(&path, DIMS).unwrap());

    let low = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for seq in 0..20u32 {
                index.upsert(entry("shared.md", seq, "v1")).await.unwrap();
            }
        })
    };
    let high = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for seq in 20..40u32 {
                index.upsert(entry("shared.md", seq, "v1")).await.unwrap();
            }
        })
    };
    low.await.unwrap();
    high.await.unwrap();

    let stats = index.stats().await;
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 40, "interleaved upserts must not lose entries");

    // Every write also reached the database.
    drop(index);
    let reopened = EmbeddingIndex::open(&path, DIMS).unwrap();
    assert_eq!(reopened.stats().await.chunks, 40);
}
