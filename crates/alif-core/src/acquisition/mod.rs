//! Leitner-style 3-box acquisition scheduler (§4.3): the deterministic
//! pre-SRS phase that precedes FSRS graduation.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::instrument;

use crate::config::SchedulerConfig;
use crate::domain::{
    AcquisitionBox, CreditType, DomainError, DomainResult, KnowledgeRecord,
    KnowledgeRecordSnapshot, LemmaId, Rating, ReviewLog, ReviewLogId, SchedulerKind, WordState,
};
use crate::leech;
use crate::ports::KnowledgeRepository;

/// Outcome of one acquisition review, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionOutcome {
    pub record: KnowledgeRecord,
    pub graduated: bool,
    pub became_leech: bool,
}

pub struct AcquisitionScheduler {
    knowledge: Arc<dyn KnowledgeRepository>,
    config: SchedulerConfig,
}

impl AcquisitionScheduler {
    pub fn new(knowledge: Arc<dyn KnowledgeRepository>, config: SchedulerConfig) -> Self {
        Self { knowledge, config }
    }

    /// Places an encountered word into acquisition box 1 (§4.7 "flip the
    /// record to acquiring, box 1, with next_due = now").
    pub fn begin_acquisition(&self, mut record: KnowledgeRecord, now: DateTime<Utc>) -> KnowledgeRecord {
        record.state = WordState::Acquiring;
        record.acquisition_box = Some(AcquisitionBox::Box1);
        record.acquisition_next_due = Some(now);
        record.acquisition_started_at = Some(now);
        record
    }

    /// Pure state transition per the §4.3 table. Does not touch persistence;
    /// `submit_review` wraps this with the transactional append.
    pub fn apply_rating(
        record: &KnowledgeRecord,
        rating: Rating,
        now: DateTime<Utc>,
        config: &SchedulerConfig,
    ) -> DomainResult<(KnowledgeRecord, bool)> {
        let mut r = record.clone();
        let box_ = r
            .acquisition_box
            .ok_or_else(|| DomainError::NotAcquiring(r.lemma))?;

        r.times_seen += 1;
        if rating.is_correct() {
            r.times_correct += 1;
        }
        r.last_review_at = Some(now);

        let is_due = r.acquisition_next_due.map(|d| now >= d).unwrap_or(true);
        let mut graduated = false;

        match (box_, rating.is_passing()) {
            (AcquisitionBox::Box1, true) => {
                r.acquisition_box = Some(AcquisitionBox::Box2);
                r.acquisition_next_due = Some(now + config.acquisition.box1_interval_chrono());
            }
            (AcquisitionBox::Box1, false) => {
                r.acquisition_next_due = Some(now + config.acquisition.box1_interval_chrono());
            }
            (AcquisitionBox::Box2, true) => {
                if is_due {
                    r.acquisition_box = Some(AcquisitionBox::Box3);
                    r.acquisition_next_due = Some(now + config.acquisition.box2_interval_chrono());
                }
                // not due: exposure credit already recorded above, box unchanged.
            }
            (AcquisitionBox::Box2, false) => {
                r.acquisition_box = Some(AcquisitionBox::Box1);
                r.acquisition_next_due = Some(now + config.acquisition.box1_interval_chrono());
            }
            (AcquisitionBox::Box3, true) => {
                let calendar_days_ok = r
                    .acquisition_started_at
                    .map(|started| distinct_calendar_days(started, now) >= config.acquisition.min_calendar_days_before_graduation)
                    .unwrap_or(false);
                if is_due && calendar_days_ok {
                    graduated = true;
                    r.state = WordState::Learning;
                    r.acquisition_box = None;
                    r.acquisition_next_due = None;
                    r.graduated_at = Some(now);
                    // FSRS card seeded by the caller (needs the FSRS scheduler);
                    // here we only mark the transition, leaving fsrs_card to be
                    // filled by AcquisitionScheduler::submit_review.
                }
                // due-but-guard-failed, or not due: next_due is unchanged
                // (§4.3 table row 3), only counters advance above.
            }
            (AcquisitionBox::Box3, false) => {
                r.acquisition_box = Some(AcquisitionBox::Box1);
                r.acquisition_next_due = Some(now + config.acquisition.box1_interval_chrono());
            }
        }

        Ok((r, graduated))
    }

    /// Submits one acquisition review: applies the box-transition table,
    /// runs the leech check, seeds an FSRS card with an initial Good review
    /// on graduation (§4.3: "Graduation seeds an FSRS card with a
    /// Good-rating initial review at graduation time"), and appends the
    /// review log — all in one repository-level transaction.
    #[instrument(skip(self), fields(lemma = %lemma))]
    pub async fn submit_review(
        &self,
        lemma: LemmaId,
        rating: Rating,
        now: DateTime<Utc>,
        session_id: &str,
        client_review_id: &str,
        credit_type: CreditType,
    ) -> anyhow::Result<AcquisitionOutcome> {
        let record = self
            .knowledge
            .get_record(lemma)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no knowledge record for {lemma}"))?;
        if record.state != WordState::Acquiring {
            return Err(DomainError::NotAcquiring(lemma).into());
        }

        let snapshot: KnowledgeRecordSnapshot = (&record).into();
        let (mut updated, graduated) = Self::apply_rating(&record, rating, now, &self.config)?;

        if graduated {
            let (card, interval_days) = crate::fsrs::seed_card(&self.config.fsrs);
            updated.fsrs_card = Some(card);
            updated.fsrs_due_at = Some(now + ChronoDuration::days(interval_days as i64));
        }

        let became_leech = leech::check_leech(&mut updated, &self.config.leech, now);

        let log = ReviewLog {
            id: ReviewLogId(0),
            lemma,
            rating,
            kind: SchedulerKind::Acquisition,
            pre_review_snapshot: snapshot,
            session_id: session_id.to_string(),
            client_review_id: client_review_id.to_string(),
            reviewed_at: now,
            credit_type,
        };

        let wrote = self.knowledge.append_review(&log, &updated).await?;
        if !wrote {
            tracing::debug!(lemma = %lemma, "duplicate client_review_id, idempotent no-op");
            return Ok(AcquisitionOutcome {
                record,
                graduated: false,
                became_leech: false,
            });
        }

        Ok(AcquisitionOutcome {
            record: updated,
            graduated,
            became_leech,
        })
    }
}

fn distinct_calendar_days(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    (end.date_naive() - start.date_naive()).num_days().unsigned_abs() as u32 + 1
}

impl crate::config::AcquisitionConfig {
    fn box1_interval_chrono(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.box1_interval).unwrap_or(ChronoDuration::hours(4))
    }
    fn box2_interval_chrono(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.box2_interval).unwrap_or(ChronoDuration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WordSource;
    use rstest::rstest;

    fn record_in_box(box_: AcquisitionBox, started_at: DateTime<Utc>) -> KnowledgeRecord {
        let mut r = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::CourseImport);
        r.state = WordState::Acquiring;
        r.acquisition_box = Some(box_);
        r.acquisition_started_at = Some(started_at);
        r.acquisition_next_due = Some(started_at);
        r
    }

    #[rstest]
    #[case(Rating::Good, AcquisitionBox::Box2)]
    #[case(Rating::Easy, AcquisitionBox::Box2)]
    fn box1_passing_rating_advances_to_box2(#[case] rating: Rating, #[case] expected: AcquisitionBox) {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let r = record_in_box(AcquisitionBox::Box1, now);
        let (updated, graduated) = AcquisitionScheduler::apply_rating(&r, rating, now, &config).unwrap();
        assert_eq!(updated.acquisition_box, Some(expected));
        assert!(!graduated);
    }

    #[test]
    fn box1_again_stays_in_box1() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let r = record_in_box(AcquisitionBox::Box1, now);
        let (updated, _) = AcquisitionScheduler::apply_rating(&r, Rating::Again, now, &config).unwrap();
        assert_eq!(updated.acquisition_box, Some(AcquisitionBox::Box1));
    }

    #[test]
    fn box2_good_not_due_stays_in_box2() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let mut r = record_in_box(AcquisitionBox::Box2, now - ChronoDuration::hours(1));
        r.acquisition_next_due = Some(now + ChronoDuration::hours(1)); // not due yet
        let (updated, _) = AcquisitionScheduler::apply_rating(&r, Rating::Good, now, &config).unwrap();
        assert_eq!(updated.acquisition_box, Some(AcquisitionBox::Box2));
        assert_eq!(updated.times_seen, 1, "exposure credit still recorded");
    }

    #[test]
    fn box2_good_due_advances_to_box3() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let r = record_in_box(AcquisitionBox::Box2, now - ChronoDuration::days(1));
        let (updated, _) = AcquisitionScheduler::apply_rating(&r, Rating::Good, now, &config).unwrap();
        assert_eq!(updated.acquisition_box, Some(AcquisitionBox::Box3));
    }

    #[test]
    fn box3_cannot_graduate_same_calendar_day() {
        // §8 scenario 1: single-day cramming is impossible.
        let config = SchedulerConfig::default();
        let start = Utc::now();
        let mut r = record_in_box(AcquisitionBox::Box3, start);
        r.acquisition_next_due = Some(start); // due immediately, six reviews same day

        let mut current = r;
        for _ in 0..6 {
            let now = start + ChronoDuration::hours(1);
            let (updated, graduated) =
                AcquisitionScheduler::apply_rating(&current, Rating::Good, now, &config).unwrap();
            assert!(!graduated, "must not graduate within the same calendar day");
            current = updated;
        }
        assert_eq!(current.acquisition_box, Some(AcquisitionBox::Box3));
        assert!(current.fsrs_card.is_none());
    }

    #[test]
    fn box3_guard_failure_leaves_next_due_unchanged() {
        // §4.3 table row 3: due-but-guard-failed is a counters-only update;
        // next_due must not be reset to another box3 interval.
        let config = SchedulerConfig::default();
        let start = Utc::now();
        let mut r = record_in_box(AcquisitionBox::Box3, start);
        let original_due = start;
        r.acquisition_next_due = Some(original_due);

        let now = start + ChronoDuration::hours(1);
        let (updated, graduated) =
            AcquisitionScheduler::apply_rating(&r, Rating::Good, now, &config).unwrap();
        assert!(!graduated);
        assert_eq!(updated.acquisition_next_due, Some(original_due));
    }

    #[test]
    fn box3_graduates_after_guard_satisfied() {
        let config = SchedulerConfig::default();
        let start = Utc::now();
        let mut r = record_in_box(AcquisitionBox::Box3, start);
        r.acquisition_next_due = Some(start + ChronoDuration::days(1));

        let later = start + ChronoDuration::days(2);
        let (updated, graduated) = AcquisitionScheduler::apply_rating(&r, Rating::Good, later, &config).unwrap();
        assert!(graduated);
        assert_eq!(updated.state, WordState::Learning);
        assert!(updated.acquisition_box.is_none());
    }

    #[test]
    fn box3_again_resets_to_box1() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let r = record_in_box(AcquisitionBox::Box3, now - ChronoDuration::days(3));
        let (updated, graduated) = AcquisitionScheduler::apply_rating(&r, Rating::Again, now, &config).unwrap();
        assert!(!graduated);
        assert_eq!(updated.acquisition_box, Some(AcquisitionBox::Box1));
    }
}
