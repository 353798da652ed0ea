use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ComprehensibilityClass, KnowledgeRecord, LemmaId, ReviewLog, Sentence, SentenceId,
    VariantDecision, VariantVerdict,
};

/// The durable, transactional per-user state: knowledge records, review
/// logs, sentences, and the variant-decision cache (§3, §4.2). Backed by
/// `knowledge.db` in `alif-storage`. All writes go through a single
/// transaction per user-facing operation (§4.2), so methods that mutate more
/// than one row are exposed here as single atomic operations rather than
/// left to the caller to sequence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn get_record(&self, lemma: LemmaId) -> anyhow::Result<Option<KnowledgeRecord>>;

    async fn upsert_record(&self, record: &KnowledgeRecord) -> anyhow::Result<()>;

    /// Due acquiring records at time `now` (§4.2, §4.6 step 1).
    async fn due_acquiring(&self, now: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>>;

    /// Due or near-due FSRS records at time `now`, restricted to the focus
    /// cohort by the caller (§4.2, §4.6 steps 1-2).
    async fn due_fsrs(
        &self,
        now: DateTime<Utc>,
        near_due_window: std::time::Duration,
        limit: u32,
    ) -> anyhow::Result<Vec<KnowledgeRecord>>;

    /// Lowest-stability FSRS records not yet due, used to fill out the focus
    /// cohort (§4.6 step 2).
    async fn lowest_stability_fsrs(&self, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>>;

    /// Bounded fan-out for a cohort of lemma ids (§4.2 "Record fan-out for a
    /// cohort").
    async fn get_records(&self, lemmas: &[LemmaId]) -> anyhow::Result<Vec<KnowledgeRecord>>;

    /// Classifies each of `lemmas` as known-enough / still-new / unknown for
    /// the comprehensibility gate (§4.2, §4.6 step 4).
    async fn classify_comprehensibility(
        &self,
        lemmas: &[LemmaId],
    ) -> anyhow::Result<std::collections::HashMap<LemmaId, ComprehensibilityClass>>;

    /// Records whose state is `encountered`, ordered for auto-introduction
    /// selection (provenance tier, then frequency rank) (§4.7).
    async fn encountered_candidates(&self, limit: u32) -> anyhow::Result<Vec<KnowledgeRecord>>;

    /// Recent accuracy α over the reviews logged since `since` (§4.7: "recent
    /// accuracy computed over the last N reviews, e.g. 2 days").
    async fn recent_accuracy(&self, since: DateTime<Utc>) -> anyhow::Result<f64>;

    /// Appends a review log and applies the accompanying record update in
    /// one transaction. Returns `Ok(false)` without writing anything if
    /// `client_review_id` has already been seen — the idempotency contract
    /// of §4.2/§8.
    async fn append_review(
        &self,
        log: &ReviewLog,
        updated_record: &KnowledgeRecord,
    ) -> anyhow::Result<bool>;

    /// Looks up the most recent review log entry for `lemma` whose
    /// `client_review_id` carries the given session prefix (§4.4
    /// `undo_last`).
    async fn last_review_for_session(
        &self,
        lemma: LemmaId,
        session_prefix: &str,
    ) -> anyhow::Result<Option<ReviewLog>>;

    /// Restores `record` from a prior snapshot and deletes `log_id` in one
    /// transaction (§4.4 `undo_last`, §8 undo law).
    async fn undo_review(&self, log_id: crate::domain::ReviewLogId, restored: &KnowledgeRecord) -> anyhow::Result<()>;

    async fn get_sentence(&self, id: SentenceId) -> anyhow::Result<Option<Sentence>>;

    async fn insert_sentence(&self, sentence: &Sentence) -> anyhow::Result<SentenceId>;

    async fn update_sentence(&self, sentence: &Sentence) -> anyhow::Result<()>;

    async fn retire_sentence(&self, id: SentenceId) -> anyhow::Result<()>;

    /// Active sentences whose targets or scaffold intersect `lemmas` (§4.6
    /// step 3).
    async fn active_sentences_covering(&self, lemmas: &[LemmaId]) -> anyhow::Result<Vec<Sentence>>;

    /// Count of active sentences per target word, for backfill (§4.5 step 3)
    /// and cap enforcement (§4.5 step 2).
    async fn active_sentence_counts_by_target(
        &self,
    ) -> anyhow::Result<std::collections::HashMap<LemmaId, u32>>;

    async fn active_sentence_count(&self) -> anyhow::Result<u32>;

    /// Candidates for retirement ordered never-shown-stale first, then
    /// shown-stale, then oldest (§4.5 step 2).
    async fn retirement_candidates(&self, limit: u32) -> anyhow::Result<Vec<Sentence>>;

    async fn get_variant_decision(
        &self,
        lemma_a: LemmaId,
        lemma_b: LemmaId,
    ) -> anyhow::Result<Option<VariantVerdict>>;

    async fn cache_variant_decision(&self, decision: &VariantDecision) -> anyhow::Result<()>;

    /// Merges each variant's observational counters into `canonical`'s
    /// `variant_stats` and retires any FSRS card the variant held, in one
    /// transaction (§4.1 `mark_variants`). The `canonical_lemma` pointer
    /// itself lives on `Lemma` in the lexicon store and is flipped by the
    /// caller via `LexiconRepository::update_lemma` — this method only
    /// touches knowledge-side state.
    async fn apply_variant_merge(
        &self,
        canonical: LemmaId,
        variants: &[LemmaId],
    ) -> anyhow::Result<()>;
}
