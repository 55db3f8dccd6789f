//! End-to-end tests over a real engine: tempdir corpus, SQLite index,
//! hash embeddings, and a scripted LLM stub.

use std::sync::Arc;

use tempfile::tempdir;

use crate::tests::support::{open_engine, write_corpus, StubClient};
use crate::{ExtractOptions, IngestOptions, QueryOptions, NO_INFORMATION_TEXT};
use quarry_core::AppError;

fn no_extract() -> IngestOptions {
    IngestOptions {
        extract: ExtractOptions::none(),
        ..IngestOptions::default()
    }
}

#[tokio::test]
async fn test_ingest_chunks_long_document_into_three() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    std::fs::write(corpus.path().join("manual.txt"), "a".repeat(1200)).unwrap();

    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));
    let report = engine.ingest(corpus.path(), no_extract()).await.unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.documents_skipped, 0);
    assert_eq!(report.chunks_created, 3, "1200 chars at 512/128 split into 3");
    assert!(report.failures.is_empty());

    let stats = engine.stats().await;
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.dimensions, 384);

    let catalog = engine.catalog().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].document_id, "manual.txt");
    assert_eq!(catalog[0].chunk_count, 3);
}

#[tokio::test]
async fn test_reingest_unchanged_documents_skips() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));
    let first = engine.ingest(corpus.path(), no_extract()).await.unwrap();
    assert_eq!(first.documents_processed, 2);

    let second = engine.ingest(corpus.path(), no_extract()).await.unwrap();
    assert_eq!(second.documents_processed, 0);
    assert_eq!(second.documents_skipped, 2);
    assert_eq!(second.chunks_created, 0);
}

#[tokio::test]
async fn test_reingest_changed_document_replaces_chunks() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    let path = corpus.path().join("policy.txt");
    std::fs::write(&path, "b".repeat(300)).unwrap();

    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));
    engine.ingest(corpus.path(), no_extract()).await.unwrap();
    assert_eq!(engine.stats().await.chunks, 1);

    std::fs::write(&path, "c".repeat(700)).unwrap();
    let report = engine.ingest(corpus.path(), no_extract()).await.unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.documents_skipped, 0);
    let stats = engine.stats().await;
    assert_eq!(stats.documents, 1, "same document id, not a new one");
    assert_eq!(stats.chunks, 2, "old chunks replaced, not appended to");
}

#[tokio::test]
async fn test_extraction_failures_reported_but_chunks_indexed() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    std::fs::write(corpus.path().join("policy.txt"), "d".repeat(300)).unwrap();

    let client = Arc::new(StubClient::with_rules(vec![(
        "Give a short descriptive title",
        Err("model overloaded".to_string()),
    )]));
    let engine = open_engine(data.path(), client);

    let options = IngestOptions {
        extract: ExtractOptions {
            title: true,
            summary: false,
            keywords: false,
            qa: false,
        },
        ..IngestOptions::default()
    };
    let report = engine.ingest(corpus.path(), options).await.unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.chunks_created, 1);
    assert_eq!(report.extraction_failures, 1);
    assert!(report.failures.is_empty(), "extraction failure is contained");
    assert_eq!(engine.stats().await.chunks, 1);
}

#[tokio::test]
async fn test_query_rejects_empty_question() {
    let data = tempdir().unwrap();
    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));

    let result = engine.query("   ", QueryOptions::default()).await;
    assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn test_two_document_question_is_split_scoped_and_merged() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let plan = r#"[
        {"question": "What does the Delta policy say about pets in the cabin?", "scope": "delta.md"},
        {"question": "What does the United policy say about pets in the cabin?", "scope": "united.md"}
    ]"#;
    let merged = "Delta permits small pets in approved carriers for a one-way fee, \
                  while United charges 125 dollars each way with the pet kept under the seat.";
    let client = Arc::new(StubClient::with_rules(vec![
        ("Split the question below", Ok(plan.to_string())),
        (
            "household birds",
            Ok("Delta permits small pets in the cabin in an approved carrier for a one-way fee."
                .to_string()),
        ),
        (
            "hard-sided or soft-sided",
            Ok("United charges a fee each way and requires the pet to stay under the seat."
                .to_string()),
        ),
        ("Combine the partial answers", Ok(merged.to_string())),
    ]));
    let engine = open_engine(data.path(), client);
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let answer = engine
        .query(
            "How do the Delta and United cabin pet policies differ?",
            QueryOptions::default(),
        )
        .await
        .unwrap();

    assert!(!answer.unanswerable);
    assert_eq!(answer.text, merged);
    assert_eq!(answer.sub_answers.len(), 2);
    assert_eq!(answer.sub_answers[0].question.ordinal, 0);
    assert_eq!(answer.sub_answers[1].question.ordinal, 1);
    assert_eq!(
        answer.sub_answers[0].question.scope.as_deref(),
        Some("delta.md")
    );
    assert!(!answer.sub_answers[0].failed);
    assert!(!answer.sub_answers[1].failed);

    // Scoped retrieval keeps each sub-answer's provenance inside its own document.
    assert!(!answer.sub_answers[0].sources.is_empty());
    assert!(answer.sub_answers[0]
        .sources
        .iter()
        .all(|source| source.document_id == "delta.md"));
    assert!(answer.sub_answers[1]
        .sources
        .iter()
        .all(|source| source.document_id == "united.md"));

    let sources = answer.sources();
    assert_eq!(sources.first().unwrap().document_id, "delta.md");
    assert_eq!(sources.last().unwrap().document_id, "united.md");
    assert!(answer.duration_secs > 0.0);
}

#[tokio::test]
async fn test_empty_decomposition_falls_back_to_whole_question() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let client = Arc::new(StubClient::with_rules(vec![
        ("Split the question below", Ok("[]".to_string())),
        (
            "Answer the question using",
            Ok("Cats ride in an approved carrier.".to_string()),
        ),
    ]));
    let engine = open_engine(data.path(), Arc::clone(&client));
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let question = "What do the policies say about cats?";
    let answer = engine.query(question, QueryOptions::default()).await.unwrap();

    assert!(!answer.unanswerable);
    assert_eq!(answer.sub_answers.len(), 1);
    assert_eq!(answer.sub_answers[0].question.text, question);
    assert_eq!(answer.sub_answers[0].question.ordinal, 0);
    assert_eq!(answer.text, "Cats ride in an approved carrier.");
    assert!(
        !client
            .prompts()
            .iter()
            .any(|prompt| prompt.contains("Combine the partial answers")),
        "a single sub-answer is promoted without a synthesis call"
    );
}

#[tokio::test]
async fn test_malformed_decomposition_falls_back_to_whole_question() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let client = Arc::new(StubClient::with_rules(vec![
        (
            "Split the question below",
            Ok("I would rather describe my reasoning in prose.".to_string()),
        ),
        (
            "Answer the question using",
            Ok("Dogs are allowed in the cabin.".to_string()),
        ),
    ]));
    let engine = open_engine(data.path(), client);
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let answer = engine
        .query("Are dogs allowed in the cabin?", QueryOptions::default())
        .await
        .unwrap();

    assert!(!answer.unanswerable);
    assert_eq!(answer.sub_answers.len(), 1);
    assert!(answer.sub_answers[0].question.scope.is_none());
    assert_eq!(answer.text, "Dogs are allowed in the cabin.");
}

#[tokio::test]
async fn test_no_decompose_option_skips_planning_call() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let client = Arc::new(StubClient::with_rules(vec![(
        "Answer the question using",
        Ok("One pet per carrier.".to_string()),
    )]));
    let engine = open_engine(data.path(), Arc::clone(&client));
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let options = QueryOptions {
        decompose: false,
        ..QueryOptions::default()
    };
    let answer = engine
        .query("How many pets fit in one carrier?", options)
        .await
        .unwrap();

    assert_eq!(answer.sub_answers.len(), 1);
    assert_eq!(answer.text, "One pet per carrier.");
    assert!(
        !client
            .prompts()
            .iter()
            .any(|prompt| prompt.contains("Split the question below")),
        "planning must not be consulted when decomposition is off"
    );
}

#[tokio::test]
async fn test_scope_matching_nothing_makes_answer_unanswerable() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let plan = r#"[{"question": "What does the Alaska policy say?", "scope": "alaska.md"}]"#;
    let client = Arc::new(StubClient::with_rules(vec![(
        "Split the question below",
        Ok(plan.to_string()),
    )]));
    let engine = open_engine(data.path(), client);
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let answer = engine
        .query("What does the Alaska policy say?", QueryOptions::default())
        .await
        .unwrap();

    assert!(answer.unanswerable);
    assert_eq!(answer.text, NO_INFORMATION_TEXT);
    assert_eq!(answer.sub_answers.len(), 1);
    assert!(answer.sub_answers[0].failed);
    assert!(answer.sub_answers[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("No relevant content"));
    assert!(answer.sources().is_empty());
}

#[tokio::test]
async fn test_all_answer_calls_failing_makes_answer_unanswerable() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let plan = r#"[
        {"question": "What does Delta allow?", "scope": "delta.md"},
        {"question": "What does United allow?", "scope": "united.md"}
    ]"#;
    let client = Arc::new(StubClient::with_rules(vec![
        ("Split the question below", Ok(plan.to_string())),
        ("Answer the question using", Err("model exploded".to_string())),
    ]));
    let engine = open_engine(data.path(), client);
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let answer = engine
        .query("Compare the two pet policies", QueryOptions::default())
        .await
        .unwrap();

    assert!(answer.unanswerable);
    assert_eq!(answer.text, NO_INFORMATION_TEXT);
    assert_eq!(answer.sub_answers.len(), 2);
    assert!(answer.sub_answers.iter().all(|sub| sub.failed));
    assert!(answer.sub_answers.iter().all(|sub| sub
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("model exploded")));
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));
    engine.ingest(corpus.path(), no_extract()).await.unwrap();
    let chunks_before = engine.stats().await.chunks;
    drop(engine);

    let client = Arc::new(StubClient::with_rules(vec![(
        "Answer the question using",
        Ok("Yes, in an approved carrier.".to_string()),
    )]));
    let reopened = open_engine(data.path(), client);

    let stats = reopened.stats().await;
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, chunks_before);

    let options = QueryOptions {
        decompose: false,
        ..QueryOptions::default()
    };
    let answer = reopened
        .query("Can cats travel in the cabin?", options)
        .await
        .unwrap();
    assert!(!answer.unanswerable);
    assert!(!answer.sub_answers[0].sources.is_empty());
}

#[tokio::test]
async fn test_purge_removes_document_and_is_idempotent() {
    let corpus = tempdir().unwrap();
    let data = tempdir().unwrap();
    write_corpus(corpus.path());

    let engine = open_engine(data.path(), Arc::new(StubClient::failing("no calls expected")));
    engine.ingest(corpus.path(), no_extract()).await.unwrap();

    let removed = engine.purge("delta.md").await.unwrap();
    assert!(removed > 0);
    assert_eq!(engine.purge("delta.md").await.unwrap(), 0);

    let catalog = engine.catalog().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].document_id, "united.md");
}
