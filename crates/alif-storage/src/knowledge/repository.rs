use std::collections::HashMap;

use alif_core::{
    ComprehensibilityClass, KnowledgeRecord, KnowledgeRepository, LemmaId, ReviewLog, ReviewLogId,
    Sentence, SentenceId, SentenceToken, VariantDecision, VariantVerdict,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::models::{
    record_params, review_log_params, sentence_source_params, to_millis_pub, KnowledgeRecordRow,
    ReviewLogRow, SentenceRow, SentenceTokenRow, VariantDecisionRow,
};
use crate::error::StorageError;

/// Backs the durable per-user state in `knowledge.db` (§3, §4.2): knowledge
/// records, review logs, sentences, and the variant-decision cache. One
/// writer, one commit per user-facing operation, mirroring the teacher's
/// `SqliteUserRepository`.
pub struct SqliteKnowledgeRepository {
    pool: SqlitePool,
}

impl SqliteKnowledgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_sentence_tokens(&self, id: SentenceId) -> anyhow::Result<Vec<SentenceToken>> {
        let rows: Vec<SentenceTokenRow> = sqlx::query_as(
            "SELECT sentence_id, position, surface, lemma_id FROM sentence_tokens
             WHERE sentence_id = ? ORDER BY position ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SentenceToken {
                position: r.position as u16,
                surface: r.surface,
                lemma: r.lemma_id.map(LemmaId),
            })
            .collect())
    }

    async fn load_sentence_targets(&self, id: SentenceId) -> anyhow::Result<Vec<LemmaId>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT lemma_id FROM sentence_targets WHERE sentence_id = ?")
                .bind(id.0)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(l,)| LemmaId(l)).collect())
    }

    async fn hydrate_sentence(&self, row: SentenceRow) -> anyhow::Result<Sentence> {
        let id = SentenceId(row.id);
        let tokens = self.load_sentence_tokens(id).await?;
        let target_words = self.load_sentence_targets(id).await?;
        Ok(Sentence {
            id,
            text_diacritized: row.text_diacritized,
            translation_en: row.translation_en,
            tokens,
            active: row.active != 0,
            times_shown: row.times_shown as u32,
            target_words,
            source: super::models::parse_sentence_source_str(&row.source)?,
            page_number: row.page_number.map(|p| p as u32),
            audio_ref: row.audio_ref,
            created_at: super::models::from_millis_pub(row.created_at),
        })
    }

    async fn hydrate_sentences(&self, rows: Vec<SentenceRow>) -> anyhow::Result<Vec<Sentence>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.hydrate_sentence(row).await?);
        }
        Ok(out)
    }

    async fn write_record_tx(
        tx: &mut Transaction<'_, Sqlite>,
        record: &KnowledgeRecord,
    ) -> anyhow::Result<()> {
        let p = record_params(record)?;
        sqlx::query(
            "INSERT INTO knowledge_records
                (lemma_id, state, acquisition_box, acquisition_next_due, acquisition_started_at,
                 graduated_at, fsrs_stability, fsrs_difficulty, fsrs_last_retrievability,
                 fsrs_due_at, times_seen, times_correct, leech_count, leech_suspended_at,
                 last_review_at, variant_stats, source)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(lemma_id) DO UPDATE SET
                state = excluded.state,
                acquisition_box = excluded.acquisition_box,
                acquisition_next_due = excluded.acquisition_next_due,
                acquisition_started_at = excluded.acquisition_started_at,
                graduated_at = excluded.graduated_at,
                fsrs_stability = excluded.fsrs_stability,
                fsrs_difficulty = excluded.fsrs_difficulty,
                fsrs_last_retrievability = excluded.fsrs_last_retrievability,
                fsrs_due_at = excluded.fsrs_due_at,
                times_seen = excluded.times_seen,
                times_correct = excluded.times_correct,
                leech_count = excluded.leech_count,
                leech_suspended_at = excluded.leech_suspended_at,
                last_review_at = excluded.last_review_at,
                variant_stats = excluded.variant_stats,
                source = excluded.source",
        )
        .bind(p.lemma_id)
        .bind(p.state)
        .bind(p.acquisition_box)
        .bind(p.acquisition_next_due)
        .bind(p.acquisition_started_at)
        .bind(p.graduated_at)
        .bind(p.fsrs_stability)
        .bind(p.fsrs_difficulty)
        .bind(p.fsrs_last_retrievability)
        .bind(p.fsrs_due_at)
        .bind(p.times_seen)
        .bind(p.times_correct)
        .bind(p.leech_count)
        .bind(p.leech_suspended_at)
        .bind(p.last_review_at)
        .bind(&p.variant_stats)
        .bind(p.source)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

const RECORD_COLUMNS: &str = "lemma_id, state, acquisition_box, acquisition_next_due,
    acquisition_started_at, graduated_at, fsrs_stability, fsrs_difficulty,
    fsrs_last_retrievability, fsrs_due_at, times_seen, times_correct, leech_count,
    leech_suspended_at, last_review_at, variant_stats, source";

#[async_trait]
impl KnowledgeRepository for SqliteKnowledgeRepository {
    async fn get_record(&self, lemma: LemmaId) -> anyhow::Result<Option<KnowledgeRecord>> {
        let row: Option<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records WHERE lemma_id = ?"
        ))
        .bind(lemma.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(KnowledgeRecordRow::into_domain).transpose().map_err(Into::into)
    }

    async fn upsert_record(&self, record: &KnowledgeRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_record_tx(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn due_acquiring(&self, now: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let rows: Vec<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records
             WHERE state = 'acquiring' AND acquisition_next_due <= ?
             ORDER BY acquisition_next_due ASC LIMIT ?"
        ))
        .bind(to_millis_pub(now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(KnowledgeRecordRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn due_fsrs(
        &self,
        now: DateTime<Utc>,
        near_due_window: std::time::Duration,
        limit: u32,
    ) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let window_ms = near_due_window.as_millis() as i64;
        let horizon = to_millis_pub(now) + window_ms;
        let rows: Vec<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records
             WHERE state IN ('learning', 'known', 'lapsed') AND fsrs_due_at <= ?
             ORDER BY fsrs_due_at ASC LIMIT ?"
        ))
        .bind(horizon)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(KnowledgeRecordRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn lowest_stability_fsrs(&self, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let rows: Vec<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records
             WHERE state IN ('learning', 'known', 'lapsed') AND fsrs_stability IS NOT NULL
             ORDER BY fsrs_stability ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(KnowledgeRecordRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn get_records(&self, lemmas: &[LemmaId]) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let mut out = Vec::with_capacity(lemmas.len());
        for lemma in lemmas {
            if let Some(record) = self.get_record(*lemma).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// §4.2/§4.6 step 4: "known-enough" if consolidated (FSRS state with
    /// stability clearing a recency-independent bar, or `known`); "still-new"
    /// if acquiring; "unknown" if no record or still `encountered`.
    async fn classify_comprehensibility(
        &self,
        lemmas: &[LemmaId],
    ) -> anyhow::Result<HashMap<LemmaId, ComprehensibilityClass>> {
        let mut out = HashMap::new();
        for lemma in lemmas {
            let class = match self.get_record(*lemma).await? {
                None => ComprehensibilityClass::Unknown,
                Some(r) => match r.state {
                    alif_core::WordState::Encountered => ComprehensibilityClass::Unknown,
                    alif_core::WordState::Acquiring => ComprehensibilityClass::StillNew,
                    alif_core::WordState::Learning => {
                        if r.fsrs_card.as_ref().map(|c| c.stability).unwrap_or(0.0) >= 8.0 {
                            ComprehensibilityClass::KnownEnough
                        } else {
                            ComprehensibilityClass::StillNew
                        }
                    }
                    alif_core::WordState::Known => ComprehensibilityClass::KnownEnough,
                    alif_core::WordState::Lapsed | alif_core::WordState::Suspended => {
                        ComprehensibilityClass::StillNew
                    }
                },
            };
            out.insert(*lemma, class);
        }
        Ok(out)
    }

    async fn encountered_candidates(&self, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let rows: Vec<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records
             WHERE state = 'encountered'
             ORDER BY
                CASE source
                    WHEN 'book_import' THEN 0
                    WHEN 'story_import' THEN 1
                    WHEN 'course_import' THEN 2
                    WHEN 'frequency_list' THEN 3
                    ELSE 4
                END ASC,
                lemma_id ASC
             LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(KnowledgeRecordRow::into_domain).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn recent_accuracy(&self, since: DateTime<Utc>) -> anyhow::Result<f64> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN rating != 'again' THEN 1 ELSE 0 END), 0)
             FROM review_logs WHERE reviewed_at >= ?",
        )
        .bind(to_millis_pub(since))
        .fetch_one(&self.pool)
        .await?;
        let (total, correct) = row;
        if total == 0 {
            return Ok(1.0);
        }
        Ok(correct as f64 / total as f64)
    }

    async fn append_review(
        &self,
        log: &ReviewLog,
        updated_record: &KnowledgeRecord,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM review_logs WHERE client_review_id = ?")
                .bind(&log.client_review_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            tx.rollback().await?;
            return Ok(false);
        }

        let (lemma_id, rating, kind, snapshot, session_id, client_review_id, reviewed_at, credit) =
            review_log_params(log)?;
        sqlx::query(
            "INSERT INTO review_logs
                (lemma_id, rating, kind, pre_review_snapshot, session_id, client_review_id,
                 reviewed_at, credit_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(lemma_id)
        .bind(rating)
        .bind(kind)
        .bind(&snapshot)
        .bind(session_id)
        .bind(client_review_id)
        .bind(reviewed_at)
        .bind(credit)
        .execute(&mut *tx)
        .await?;

        Self::write_record_tx(&mut tx, updated_record).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn last_review_for_session(
        &self,
        lemma: LemmaId,
        session_prefix: &str,
    ) -> anyhow::Result<Option<ReviewLog>> {
        let row: Option<ReviewLogRow> = sqlx::query_as(
            "SELECT id, lemma_id, rating, kind, pre_review_snapshot, session_id,
                    client_review_id, reviewed_at, credit_type
             FROM review_logs
             WHERE lemma_id = ? AND session_id LIKE ? || '%'
             ORDER BY reviewed_at DESC, id DESC LIMIT 1",
        )
        .bind(lemma.0)
        .bind(session_prefix)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReviewLogRow::into_domain).transpose().map_err(Into::into)
    }

    async fn undo_review(&self, log_id: ReviewLogId, restored: &KnowledgeRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_record_tx(&mut tx, restored).await?;
        sqlx::query("DELETE FROM review_logs WHERE id = ?")
            .bind(log_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_sentence(&self, id: SentenceId) -> anyhow::Result<Option<Sentence>> {
        let row: Option<SentenceRow> = sqlx::query_as(
            "SELECT id, text_diacritized, translation_en, active, times_shown, source,
                    page_number, audio_ref, created_at
             FROM sentences WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => Ok(Some(self.hydrate_sentence(r).await?)),
            None => Ok(None),
        }
    }

    async fn insert_sentence(&self, sentence: &Sentence) -> anyhow::Result<SentenceId> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO sentences
                (text_diacritized, translation_en, active, times_shown, source, page_number,
                 audio_ref, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&sentence.text_diacritized)
        .bind(&sentence.translation_en)
        .bind(sentence.active as i64)
        .bind(sentence.times_shown as i64)
        .bind(sentence_source_params(sentence.source))
        .bind(sentence.page_number.map(|p| p as i64))
        .bind(&sentence.audio_ref)
        .bind(to_millis_pub(sentence.created_at))
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for token in &sentence.tokens {
            sqlx::query(
                "INSERT INTO sentence_tokens (sentence_id, position, surface, lemma_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(token.position as i64)
            .bind(&token.surface)
            .bind(token.lemma.map(|l| l.0))
            .execute(&mut *tx)
            .await?;
        }

        for target in &sentence.target_words {
            sqlx::query("INSERT INTO sentence_targets (sentence_id, lemma_id) VALUES (?, ?)")
                .bind(id)
                .bind(target.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(SentenceId(id))
    }

    async fn update_sentence(&self, sentence: &Sentence) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE sentences SET
                text_diacritized = ?, translation_en = ?, active = ?, times_shown = ?,
                source = ?, page_number = ?, audio_ref = ?
             WHERE id = ?",
        )
        .bind(&sentence.text_diacritized)
        .bind(&sentence.translation_en)
        .bind(sentence.active as i64)
        .bind(sentence.times_shown as i64)
        .bind(sentence_source_params(sentence.source))
        .bind(sentence.page_number.map(|p| p as i64))
        .bind(&sentence.audio_ref)
        .bind(sentence.id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sentence_tokens WHERE sentence_id = ?")
            .bind(sentence.id.0)
            .execute(&mut *tx)
            .await?;
        for token in &sentence.tokens {
            sqlx::query(
                "INSERT INTO sentence_tokens (sentence_id, position, surface, lemma_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(sentence.id.0)
            .bind(token.position as i64)
            .bind(&token.surface)
            .bind(token.lemma.map(|l| l.0))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn retire_sentence(&self, id: SentenceId) -> anyhow::Result<()> {
        sqlx::query("UPDATE sentences SET active = 0 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_sentences_covering(&self, lemmas: &[LemmaId]) -> anyhow::Result<Vec<Sentence>> {
        if lemmas.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = std::iter::repeat("?").take(lemmas.len()).collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT DISTINCT s.id, s.text_diacritized, s.translation_en, s.active, s.times_shown,
                    s.source, s.page_number, s.audio_ref, s.created_at
             FROM sentences s
             WHERE s.active = 1 AND s.id IN (
                SELECT sentence_id FROM sentence_targets WHERE lemma_id IN ({placeholders})
                UNION
                SELECT sentence_id FROM sentence_tokens WHERE lemma_id IN ({placeholders})
             )"
        );
        let mut q = sqlx::query_as::<_, SentenceRow>(&query);
        for lemma in lemmas {
            q = q.bind(lemma.0);
        }
        for lemma in lemmas {
            q = q.bind(lemma.0);
        }
        let rows = q.fetch_all(&self.pool).await?;
        self.hydrate_sentences(rows).await
    }

    async fn active_sentence_counts_by_target(&self) -> anyhow::Result<HashMap<LemmaId, u32>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT t.lemma_id, COUNT(*) FROM sentence_targets t
             JOIN sentences s ON s.id = t.sentence_id
             WHERE s.active = 1
             GROUP BY t.lemma_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(l, c)| (LemmaId(l), c as u32)).collect())
    }

    async fn active_sentence_count(&self) -> anyhow::Result<u32> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sentences WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn retirement_candidates(&self, limit: u32) -> anyhow::Result<Vec<Sentence>> {
        let rows: Vec<SentenceRow> = sqlx::query_as(
            "SELECT id, text_diacritized, translation_en, active, times_shown, source,
                    page_number, audio_ref, created_at
             FROM sentences
             WHERE active = 1
             ORDER BY
                CASE WHEN times_shown = 0 THEN 0 ELSE 1 END ASC,
                times_shown ASC,
                created_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_sentences(rows).await
    }

    async fn get_variant_decision(
        &self,
        lemma_a: LemmaId,
        lemma_b: LemmaId,
    ) -> anyhow::Result<Option<VariantVerdict>> {
        let row: Option<VariantDecisionRow> = sqlx::query_as(
            "SELECT lemma_a, lemma_b, verdict, decided_at FROM variant_decisions
             WHERE lemma_a = ? AND lemma_b = ?",
        )
        .bind(lemma_a.0)
        .bind(lemma_b.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.verdict()).transpose().map_err(Into::into)
    }

    async fn cache_variant_decision(&self, decision: &VariantDecision) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO variant_decisions (lemma_a, lemma_b, verdict, decided_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(lemma_a, lemma_b) DO NOTHING",
        )
        .bind(decision.lemma_a.0)
        .bind(decision.lemma_b.0)
        .bind(super::models::verdict_str(decision.verdict))
        .bind(to_millis_pub(decision.decided_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.1 `mark_variants`, knowledge-side half: merges each variant's
    /// observational counters into the canonical record and retires any
    /// FSRS card it held, in one transaction. The `canonical_lemma` pointer
    /// itself is lexicon.db state, flipped separately by the caller.
    async fn apply_variant_merge(&self, canonical: LemmaId, variants: &[LemmaId]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let canonical_row: Option<KnowledgeRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM knowledge_records WHERE lemma_id = ?"
        ))
        .bind(canonical.0)
        .fetch_optional(&mut *tx)
        .await?;
        let mut canonical_record = match canonical_row {
            Some(r) => r.into_domain().map_err(|e| anyhow::anyhow!(e.to_string()))?,
            None => {
                tx.rollback().await?;
                return Err(StorageError::InvalidRow(format!(
                    "no knowledge record for canonical lemma {canonical}"
                ))
                .into());
            }
        };

        for variant in variants {
            let variant_row: Option<KnowledgeRecordRow> = sqlx::query_as(&format!(
                "SELECT {RECORD_COLUMNS} FROM knowledge_records WHERE lemma_id = ?"
            ))
            .bind(variant.0)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = variant_row {
                let mut variant_record =
                    row.into_domain().map_err(|e| anyhow::anyhow!(e.to_string()))?;
                for (form, count) in variant_record.variant_stats.surface_form_counts.drain() {
                    *canonical_record
                        .variant_stats
                        .surface_form_counts
                        .entry(form)
                        .or_insert(0) += count;
                }
                variant_record.fsrs_card = None;
                variant_record.fsrs_due_at = None;
                Self::write_record_tx(&mut tx, &variant_record).await?;
            }
        }

        Self::write_record_tx(&mut tx, &canonical_record).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alif_core::{
        CreditType, KnowledgeRecordSnapshot, Rating, SchedulerKind, SentenceSource, WordSource,
        WordState,
    };
    use chrono::TimeZone;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations_knowledge").run(&pool).await.unwrap();
        pool
    }

    fn sample_review_log(lemma: LemmaId, client_review_id: &str) -> ReviewLog {
        ReviewLog {
            id: ReviewLogId(0),
            lemma,
            rating: Rating::Good,
            kind: SchedulerKind::Acquisition,
            pre_review_snapshot: KnowledgeRecordSnapshot {
                state: WordState::Acquiring,
                acquisition_box: Some(alif_core::AcquisitionBox::Box1),
                acquisition_next_due: None,
                acquisition_started_at: None,
                graduated_at: None,
                fsrs_card: None,
                fsrs_due_at: None,
                times_seen: 0,
                times_correct: 0,
                leech_count: 0,
                leech_suspended_at: None,
                last_review_at: None,
            },
            session_id: "sess1-abc".to_string(),
            client_review_id: client_review_id.to_string(),
            reviewed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            credit_type: CreditType::Target,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_record_round_trips() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);
        let record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::BookImport);
        repo.upsert_record(&record).await.unwrap();

        let fetched = repo.get_record(LemmaId(1)).await.unwrap().unwrap();
        assert_eq!(fetched.state, WordState::Encountered);
        assert_eq!(fetched.source, WordSource::BookImport);
    }

    #[tokio::test]
    async fn append_review_is_idempotent_on_client_review_id() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);
        let record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::BookImport);
        repo.upsert_record(&record).await.unwrap();

        let log = sample_review_log(LemmaId(1), "sess1-abc:1");
        let mut updated = record.clone();
        updated.times_seen = 1;
        updated.times_correct = 1;

        let first = repo.append_review(&log, &updated).await.unwrap();
        assert!(first);

        let second = repo.append_review(&log, &updated).await.unwrap();
        assert!(!second);

        let fetched = repo.get_record(LemmaId(1)).await.unwrap().unwrap();
        assert_eq!(fetched.times_seen, 1);
    }

    #[tokio::test]
    async fn undo_review_restores_record_and_deletes_log() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);
        let record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::BookImport);
        repo.upsert_record(&record).await.unwrap();

        let log = sample_review_log(LemmaId(1), "sess1-abc:1");
        let mut updated = record.clone();
        updated.times_seen = 1;
        updated.times_correct = 1;
        repo.append_review(&log, &updated).await.unwrap();

        let found_log = repo
            .last_review_for_session(LemmaId(1), "sess1-abc")
            .await
            .unwrap()
            .unwrap();

        repo.undo_review(found_log.id, &record).await.unwrap();

        let fetched = repo.get_record(LemmaId(1)).await.unwrap().unwrap();
        assert_eq!(fetched.times_seen, 0);
        let gone = repo
            .last_review_for_session(LemmaId(1), "sess1-abc")
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn classify_comprehensibility_buckets_by_state() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);

        let mut known = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::BookImport);
        known.state = WordState::Known;
        repo.upsert_record(&known).await.unwrap();

        let acquiring = {
            let mut r = KnowledgeRecord::new_encountered(LemmaId(2), WordSource::BookImport);
            r.state = WordState::Acquiring;
            r.acquisition_box = Some(alif_core::AcquisitionBox::Box1);
            r
        };
        repo.upsert_record(&acquiring).await.unwrap();

        let classes = repo
            .classify_comprehensibility(&[LemmaId(1), LemmaId(2), LemmaId(3)])
            .await
            .unwrap();
        assert_eq!(classes[&LemmaId(1)], ComprehensibilityClass::KnownEnough);
        assert_eq!(classes[&LemmaId(2)], ComprehensibilityClass::StillNew);
        assert_eq!(classes[&LemmaId(3)], ComprehensibilityClass::Unknown);
    }

    #[tokio::test]
    async fn insert_and_fetch_sentence_round_trips_tokens_and_targets() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);

        let sentence = Sentence {
            id: SentenceId(0),
            text_diacritized: "كَتَبَ الوَلَدُ".to_string(),
            translation_en: "The boy wrote".to_string(),
            tokens: vec![
                SentenceToken {
                    position: 0,
                    surface: "كتب".to_string(),
                    lemma: Some(LemmaId(1)),
                },
                SentenceToken {
                    position: 1,
                    surface: "الولد".to_string(),
                    lemma: Some(LemmaId(2)),
                },
            ],
            active: true,
            times_shown: 0,
            target_words: vec![LemmaId(1)],
            source: SentenceSource::LlmGenerated,
            page_number: None,
            audio_ref: None,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };

        let id = repo.insert_sentence(&sentence).await.unwrap();
        let fetched = repo.get_sentence(id).await.unwrap().unwrap();
        assert_eq!(fetched.tokens.len(), 2);
        assert_eq!(fetched.target_words, vec![LemmaId(1)]);

        let covering = repo.active_sentences_covering(&[LemmaId(2)]).await.unwrap();
        assert_eq!(covering.len(), 1);
        assert_eq!(covering[0].id, id);
    }

    #[tokio::test]
    async fn apply_variant_merge_merges_stats_and_retires_variant_card() {
        let pool = setup().await;
        let repo = SqliteKnowledgeRepository::new(pool);

        let mut canonical = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::BookImport);
        canonical.variant_stats.surface_form_counts.insert("كتب".to_string(), 3);
        repo.upsert_record(&canonical).await.unwrap();

        let mut variant = KnowledgeRecord::new_encountered(LemmaId(2), WordSource::BookImport);
        variant.variant_stats.surface_form_counts.insert("كاتب".to_string(), 2);
        repo.upsert_record(&variant).await.unwrap();

        repo.apply_variant_merge(LemmaId(1), &[LemmaId(2)]).await.unwrap();

        let merged = repo.get_record(LemmaId(1)).await.unwrap().unwrap();
        assert_eq!(merged.variant_stats.surface_form_counts["كاتب"], 2);
        assert_eq!(merged.variant_stats.surface_form_counts["كتب"], 3);

        let retired = repo.get_record(LemmaId(2)).await.unwrap().unwrap();
        assert!(retired.fsrs_card.is_none());
    }
}
