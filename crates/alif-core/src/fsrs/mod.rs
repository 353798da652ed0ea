//! Forgetting-curve scheduler (§4.4): FSRS-6 for graduated words.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fsrs::{MemoryState as FsrsMemoryState, FSRS};
use tracing::instrument;

use crate::config::{FsrsConfig, SchedulerConfig};
use crate::domain::{
    CreditType, DomainError, FsrsCard, KnowledgeRecord, KnowledgeRecordSnapshot, LemmaId, Rating,
    ReviewLog, ReviewLogId, SchedulerKind, WordState,
};
use crate::leech;
use crate::ports::KnowledgeRepository;

/// Seeds a fresh FSRS card for graduation, per §4.3: "Graduation seeds an
/// FSRS card with a Good-rating initial review at graduation time." Returns
/// the card alongside the engine-computed interval (in days) for that
/// initial Good review, so the caller can derive a due date consistent with
/// the seeded stability/difficulty rather than hardcoding one.
pub fn seed_card(config: &FsrsConfig) -> (FsrsCard, u32) {
    let engine = build_engine(config);
    let next = engine
        .next_states(None, config.desired_retention as f32, 0)
        .expect("fsrs::next_states with no prior state should not fail");
    let good = next.good;
    let card = FsrsCard {
        stability: good.memory.stability as f64,
        difficulty: good.memory.difficulty as f64,
        last_retrievability: config.desired_retention,
    };
    (card, good.interval.max(0) as u32)
}

fn build_engine(config: &FsrsConfig) -> FSRS {
    let params: Vec<f32> = config.parameters.clone().unwrap_or_default();
    FSRS::new(Some(&params)).expect("FSRS parameter vector must be valid")
}

/// Outcome of one FSRS review, before persistence.
#[derive(Debug, Clone)]
pub struct FsrsOutcome {
    pub record: KnowledgeRecord,
    pub became_leech: bool,
}

pub struct FsrsScheduler {
    knowledge: Arc<dyn KnowledgeRepository>,
    config: SchedulerConfig,
}

impl FsrsScheduler {
    pub fn new(knowledge: Arc<dyn KnowledgeRepository>, config: SchedulerConfig) -> Self {
        Self { knowledge, config }
    }

    /// Pure FSRS advance: given a card, a rating, and elapsed days, returns
    /// the next card state and due date. Mirrors the teacher's
    /// `LearningService::update_fsrs_state` cast-to-f32 pattern.
    pub fn advance_card(
        card: &FsrsCard,
        rating: Rating,
        elapsed_days: u32,
        now: DateTime<Utc>,
        config: &FsrsConfig,
    ) -> (FsrsCard, DateTime<Utc>) {
        let engine = build_engine(config);
        let memory = FsrsMemoryState {
            stability: card.stability as f32,
            difficulty: card.difficulty as f32,
        };
        let next = engine
            .next_states(Some(memory), config.desired_retention as f32, elapsed_days)
            .expect("fsrs::next_states should not fail for a valid prior card");

        let selected = match rating {
            Rating::Again => next.again,
            Rating::Hard => next.hard,
            Rating::Good => next.good,
            Rating::Easy => next.easy,
        };

        let due_at = now + ChronoDuration::days(selected.interval.max(0) as i64);
        let new_card = FsrsCard {
            stability: selected.memory.stability as f64,
            difficulty: selected.memory.difficulty as f64,
            last_retrievability: config.desired_retention,
        };
        (new_card, due_at)
    }

    /// Derives the post-review `WordState` from rating and stability, per
    /// §3's learning/known/lapsed trio (implementers' policy: `Again` always
    /// lapses; otherwise known once stability clears a consolidation bar,
    /// else learning).
    fn derive_state(rating: Rating, stability: f64) -> WordState {
        if rating == Rating::Again {
            WordState::Lapsed
        } else if stability >= 30.0 {
            WordState::Known
        } else {
            WordState::Learning
        }
    }

    /// §4.4 `submit_review`: snapshots, advances the card, updates counters,
    /// updates state, runs leech detection — one transaction.
    #[instrument(skip(self), fields(lemma = %lemma))]
    pub async fn submit_review(
        &self,
        lemma: LemmaId,
        rating: Rating,
        now: DateTime<Utc>,
        session_id: &str,
        client_review_id: &str,
        credit_type: CreditType,
    ) -> anyhow::Result<FsrsOutcome> {
        let record = self
            .knowledge
            .get_record(lemma)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no knowledge record for {lemma}"))?;
        let card = record
            .fsrs_card
            .clone()
            .ok_or(DomainError::NoFsrsCard(lemma))?;

        let snapshot: KnowledgeRecordSnapshot = (&record).into();
        let elapsed_days = record
            .last_review_at
            .map(|last| (now - last).num_days().max(0) as u32)
            .unwrap_or(0);

        let (new_card, due_at) = Self::advance_card(&card, rating, elapsed_days, now, &self.config.fsrs);

        let mut updated = record.clone();
        updated.fsrs_card = Some(new_card.clone());
        updated.fsrs_due_at = Some(due_at);
        updated.times_seen += 1;
        if rating.is_correct() {
            updated.times_correct += 1;
        }
        updated.last_review_at = Some(now);
        updated.state = Self::derive_state(rating, new_card.stability);

        let became_leech = leech::check_leech(&mut updated, &self.config.leech, now);

        let log = ReviewLog {
            id: ReviewLogId(0),
            lemma,
            rating,
            kind: SchedulerKind::Fsrs,
            pre_review_snapshot: snapshot,
            session_id: session_id.to_string(),
            client_review_id: client_review_id.to_string(),
            reviewed_at: now,
            credit_type,
        };

        let wrote = self.knowledge.append_review(&log, &updated).await?;
        if !wrote {
            tracing::debug!(lemma = %lemma, "duplicate client_review_id, idempotent no-op");
            return Ok(FsrsOutcome {
                record,
                became_leech: false,
            });
        }

        Ok(FsrsOutcome {
            record: updated,
            became_leech,
        })
    }

    /// `undo_last` (§4.4): restores the most recent review log entry
    /// matching `session_prefix`, deletes the entry. Idempotent if no
    /// matching log (§8 undo law).
    #[instrument(skip(self), fields(lemma = %lemma))]
    pub async fn undo_last(&self, lemma: LemmaId, session_prefix: &str) -> anyhow::Result<bool> {
        let Some(log) = self
            .knowledge
            .last_review_for_session(lemma, session_prefix)
            .await?
        else {
            return Ok(false);
        };
        let current = self
            .knowledge
            .get_record(lemma)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no knowledge record for {lemma}"))?;

        let restored = restore_from_snapshot(current, &log.pre_review_snapshot);
        self.knowledge.undo_review(log.id, &restored).await?;
        Ok(true)
    }
}

/// Applies a snapshot's scheduling fields onto the current record, leaving
/// non-snapshotted fields (variant_stats, source) untouched — the undo law
/// (§8) only guarantees bit-exact restoration of the scheduling state.
fn restore_from_snapshot(mut current: KnowledgeRecord, snapshot: &KnowledgeRecordSnapshot) -> KnowledgeRecord {
    current.state = snapshot.state;
    current.acquisition_box = snapshot.acquisition_box;
    current.acquisition_next_due = snapshot.acquisition_next_due;
    current.acquisition_started_at = snapshot.acquisition_started_at;
    current.graduated_at = snapshot.graduated_at;
    current.fsrs_card = snapshot.fsrs_card.clone();
    current.fsrs_due_at = snapshot.fsrs_due_at;
    current.times_seen = snapshot.times_seen;
    current.times_correct = snapshot.times_correct;
    current.leech_count = snapshot.leech_count;
    current.leech_suspended_at = snapshot.leech_suspended_at;
    current.last_review_at = snapshot.last_review_at;
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockKnowledgeRepository;

    fn sample_log(lemma: LemmaId) -> ReviewLog {
        ReviewLog {
            id: ReviewLogId(7),
            lemma,
            rating: Rating::Good,
            kind: SchedulerKind::Fsrs,
            pre_review_snapshot: KnowledgeRecordSnapshot {
                state: WordState::Learning,
                acquisition_box: None,
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
            session_id: "sess-1".to_string(),
            client_review_id: "sess-1-review-1".to_string(),
            reviewed_at: Utc::now(),
            credit_type: CreditType::Target,
        }
    }

    /// §8 undo law: undoing a second time, once the log entry is gone, is a
    /// no-op rather than an error or a repeated mutation.
    #[tokio::test]
    async fn undo_last_is_idempotent_once_the_log_entry_is_consumed() {
        let mut knowledge = MockKnowledgeRepository::new();
        let mut call = 0;
        knowledge.expect_last_review_for_session().returning(move |lemma, _| {
            call += 1;
            if call == 1 {
                Ok(Some(sample_log(lemma)))
            } else {
                Ok(None)
            }
        });
        knowledge
            .expect_get_record()
            .returning(|lemma| Ok(Some(KnowledgeRecord::new_encountered(lemma, crate::domain::WordSource::CourseImport))));
        knowledge.expect_undo_review().returning(|_, _| Ok(()));

        let scheduler = FsrsScheduler::new(Arc::new(knowledge), SchedulerConfig::default());

        let first = scheduler.undo_last(LemmaId(1), "sess-1").await.unwrap();
        assert!(first, "first undo restores the logged state");

        let second = scheduler.undo_last(LemmaId(1), "sess-1").await.unwrap();
        assert!(!second, "second undo finds no matching log and is a no-op");
    }

    #[test]
    fn seed_card_uses_desired_retention_as_initial_retrievability() {
        let config = FsrsConfig::default();
        let (card, _interval) = seed_card(&config);
        assert_eq!(card.last_retrievability, config.desired_retention);
        assert!(card.stability > 0.0);
    }

    #[test]
    fn again_rating_derives_lapsed_state() {
        assert_eq!(FsrsScheduler::derive_state(Rating::Again, 50.0), WordState::Lapsed);
    }

    #[test]
    fn high_stability_good_rating_derives_known_state() {
        assert_eq!(FsrsScheduler::derive_state(Rating::Good, 45.0), WordState::Known);
    }

    #[test]
    fn low_stability_good_rating_derives_learning_state() {
        assert_eq!(FsrsScheduler::derive_state(Rating::Good, 5.0), WordState::Learning);
    }
}
