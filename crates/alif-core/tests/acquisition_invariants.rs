//! Property tests for the §8 invariants: acquisition state/box/card
//! consistency and the box3 due-but-guard-failed transition. Grounded in
//! `acquisition::mod::tests`'s table-driven unit tests, generalized across
//! the input space with `proptest`.

use alif_core::{
    AcquisitionBox, AcquisitionScheduler, KnowledgeRecord, LemmaId, Rating, SchedulerConfig,
    WordSource, WordState,
};
use chrono::{Duration, Utc};
use proptest::prelude::*;

fn box_strategy() -> impl Strategy<Value = AcquisitionBox> {
    prop_oneof![
        Just(AcquisitionBox::Box1),
        Just(AcquisitionBox::Box2),
        Just(AcquisitionBox::Box3),
    ]
}

fn rating_strategy() -> impl Strategy<Value = Rating> {
    prop_oneof![
        Just(Rating::Again),
        Just(Rating::Hard),
        Just(Rating::Good),
        Just(Rating::Easy),
    ]
}

proptest! {
    /// Every review applies exposure credit exactly once, and graduation (when
    /// it happens) only ever transitions box3 under a passing rating, leaving
    /// the record in a consistent state/box pairing.
    #[test]
    fn apply_rating_keeps_state_and_box_consistent(
        box_ in box_strategy(),
        rating in rating_strategy(),
        started_days_ago in 0i64..10,
        due_offset_hours in -72i64..72,
    ) {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let started = now - Duration::days(started_days_ago);

        let mut record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::CourseImport);
        record.state = WordState::Acquiring;
        record.acquisition_box = Some(box_);
        record.acquisition_started_at = Some(started);
        record.acquisition_next_due = Some(now + Duration::hours(due_offset_hours));

        let (updated, graduated) =
            AcquisitionScheduler::apply_rating(&record, rating, now, &config).unwrap();

        prop_assert_eq!(updated.times_seen, record.times_seen + 1);
        let expected_correct = record.times_correct + u32::from(rating.is_correct());
        prop_assert_eq!(updated.times_correct, expected_correct);

        if graduated {
            prop_assert_eq!(box_, AcquisitionBox::Box3);
            prop_assert!(rating.is_passing());
            prop_assert_eq!(updated.state, WordState::Learning);
            prop_assert!(updated.acquisition_box.is_none());
            prop_assert_eq!(updated.graduated_at, Some(now));
        } else {
            prop_assert_eq!(updated.state, WordState::Acquiring);
            prop_assert!(updated.acquisition_box.is_some());
            prop_assert!(updated.graduated_at.is_none());
        }
    }

    /// §4.3 transition table row 3: a due box3 review that fails the
    /// calendar-day guard (or isn't due yet) must leave `acquisition_next_due`
    /// untouched — only box1/box2 transitions and box3's actual graduation
    /// are allowed to move it.
    #[test]
    fn box3_same_day_guard_failure_leaves_next_due_unchanged(rating in rating_strategy()) {
        prop_assume!(rating.is_passing());

        let config = SchedulerConfig::default();
        let now = Utc::now();
        let original_due = now - Duration::minutes(1);

        let mut record = KnowledgeRecord::new_encountered(LemmaId(1), WordSource::CourseImport);
        record.state = WordState::Acquiring;
        record.acquisition_box = Some(AcquisitionBox::Box3);
        record.acquisition_started_at = Some(now); // same calendar day as `now`
        record.acquisition_next_due = Some(original_due);

        let (updated, graduated) =
            AcquisitionScheduler::apply_rating(&record, rating, now, &config).unwrap();

        prop_assert!(!graduated, "single calendar day can never satisfy the graduation guard");
        prop_assert_eq!(updated.acquisition_next_due, Some(original_due));
    }
}
