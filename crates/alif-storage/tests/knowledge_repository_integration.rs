//! Integration tests for `SqliteKnowledgeRepository` against a real on-disk
//! database file (via `tempfile`), rather than `sqlite::memory:`. Exercises
//! `init_knowledge_db`'s migration/version-check path and persistence across
//! repository instances sharing the same file.

use alif_core::{
    CreditType, KnowledgeRecord, KnowledgeRecordSnapshot, KnowledgeRepository, LemmaId, Rating,
    ReviewLog, ReviewLogId, SchedulerKind, Sentence, SentenceId, SentenceSource, WordSource,
};
use alif_storage::{init_knowledge_db, SqliteKnowledgeRepository};
use chrono::Utc;

fn sample_sentence() -> Sentence {
    Sentence {
        id: SentenceId(0),
        text_diacritized: "هَذَا كِتَابٌ".to_string(),
        translation_en: "This is a book".to_string(),
        tokens: vec![],
        active: true,
        times_shown: 0,
        target_words: vec![LemmaId(1)],
        source: SentenceSource::CourseImport,
        page_number: None,
        audio_ref: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn sentence_round_trips_through_a_real_db_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("knowledge.db");
    let pool = init_knowledge_db(db_path.to_str().unwrap()).await.unwrap();
    let repo = SqliteKnowledgeRepository::new(pool);

    let inserted_id = repo.insert_sentence(&sample_sentence()).await.unwrap();
    let fetched = repo.get_sentence(inserted_id).await.unwrap().unwrap();
    assert_eq!(fetched.text_diacritized, "هَذَا كِتَابٌ");
    assert_eq!(fetched.times_shown, 0);

    let mut updated = fetched.clone();
    updated.times_shown = 3;
    repo.update_sentence(&updated).await.unwrap();
    let refetched = repo.get_sentence(inserted_id).await.unwrap().unwrap();
    assert_eq!(refetched.times_shown, 3);
}

#[tokio::test]
async fn data_persists_across_repository_instances_on_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("knowledge.db");

    let first_pool = init_knowledge_db(db_path.to_str().unwrap()).await.unwrap();
    let first_repo = SqliteKnowledgeRepository::new(first_pool);
    let sentence_id = first_repo.insert_sentence(&sample_sentence()).await.unwrap();
    drop(first_repo);

    let second_pool = init_knowledge_db(db_path.to_str().unwrap()).await.unwrap();
    let second_repo = SqliteKnowledgeRepository::new(second_pool);
    let fetched = second_repo.get_sentence(sentence_id).await.unwrap();
    assert!(fetched.is_some(), "sentence written by one connection is visible to another opened later");
}

#[tokio::test]
async fn append_review_is_idempotent_on_duplicate_client_review_id() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("knowledge.db");
    let pool = init_knowledge_db(db_path.to_str().unwrap()).await.unwrap();
    let repo = SqliteKnowledgeRepository::new(pool);

    let mut record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::CourseImport);
    record.state = alif_core::WordState::Acquiring;
    record.acquisition_box = Some(alif_core::AcquisitionBox::Box1);
    repo.upsert_record(&record).await.unwrap();

    let snapshot: KnowledgeRecordSnapshot = (&record).into();
    let mut updated = record.clone();
    updated.times_seen = 1;
    updated.times_correct = 1;

    let log = ReviewLog {
        id: ReviewLogId(0),
        lemma: LemmaId(1),
        rating: Rating::Good,
        kind: SchedulerKind::Acquisition,
        pre_review_snapshot: snapshot,
        session_id: "sess-1".to_string(),
        client_review_id: "dup-review-1".to_string(),
        reviewed_at: Utc::now(),
        credit_type: CreditType::Target,
    };

    let first_write = repo.append_review(&log, &updated).await.unwrap();
    assert!(first_write);

    let second_write = repo.append_review(&log, &updated).await.unwrap();
    assert!(!second_write, "duplicate client_review_id must be a no-op, per §4.2/§8");

    let current = repo.get_record(LemmaId(1)).await.unwrap().unwrap();
    assert_eq!(current.times_seen, 1, "duplicate submission did not double-apply the update");
}
