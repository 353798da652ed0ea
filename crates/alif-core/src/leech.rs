use chrono::{DateTime, Utc};

use crate::config::LeechConfig;
use crate::domain::{KnowledgeRecord, WordState};

/// Shared leech-detection logic (§4.4), run after both acquisition and FSRS
/// reviews. Pure function over the record; callers persist the result.
///
/// §4.4: "a word becomes a leech when times_seen >= threshold_reviews and
/// accuracy < threshold_accuracy... suspended for a graduated cooldown by
/// leech_count."
pub fn check_leech(record: &mut KnowledgeRecord, config: &LeechConfig, now: DateTime<Utc>) -> bool {
    if record.state == WordState::Suspended {
        return false;
    }
    if record.times_seen < config.threshold_reviews {
        return false;
    }
    if record.accuracy() >= config.threshold_accuracy {
        return false;
    }

    record.leech_count += 1;
    record.leech_suspended_at = Some(now);
    record.state = WordState::Suspended;
    true
}

/// Reintroduces a leech-suspended record to acquisition box 1 once its
/// cooldown has elapsed (§4.4: "after cooldown expires, the word is
/// reintroduced to acquisition box 1; its prior counters are preserved").
/// Called by the pipeline or session build when it encounters a suspended
/// record whose cooldown window has passed.
pub fn maybe_release_from_cooldown(
    record: &mut KnowledgeRecord,
    config: &LeechConfig,
    now: DateTime<Utc>,
) -> bool {
    let Some(suspended_at) = record.leech_suspended_at else {
        return false;
    };
    if record.state != WordState::Suspended {
        return false;
    }
    let cooldown_days = config.cooldown_for(record.leech_count);
    let release_at = suspended_at + chrono::Duration::days(cooldown_days as i64);
    if now < release_at {
        return false;
    }

    record.state = WordState::Acquiring;
    record.acquisition_box = Some(crate::domain::AcquisitionBox::Box1);
    record.acquisition_next_due = Some(now);
    record.acquisition_started_at = Some(now);
    record.leech_suspended_at = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WordSource;

    fn record_with(times_seen: u32, times_correct: u32) -> KnowledgeRecord {
        let mut r = KnowledgeRecord::new_encountered(crate::domain::LemmaId(1), WordSource::CourseImport);
        r.times_seen = times_seen;
        r.times_correct = times_correct;
        r.state = WordState::Acquiring;
        r.acquisition_box = Some(crate::domain::AcquisitionBox::Box2);
        r
    }

    #[test]
    fn fires_at_exactly_threshold_with_low_accuracy() {
        let config = LeechConfig::default();
        let now = Utc::now();
        let mut r = record_with(5, 2); // 40% accuracy
        assert!(check_leech(&mut r, &config, now));
        assert_eq!(r.leech_count, 1);
        assert_eq!(r.state, WordState::Suspended);
        assert_eq!(r.leech_suspended_at, Some(now));
    }

    #[test]
    fn does_not_fire_above_accuracy_threshold() {
        let config = LeechConfig::default();
        let now = Utc::now();
        let mut r = record_with(5, 3); // 60% accuracy
        assert!(!check_leech(&mut r, &config, now));
        assert_eq!(r.state, WordState::Acquiring);
    }

    #[test]
    fn does_not_fire_below_review_threshold() {
        let config = LeechConfig::default();
        let now = Utc::now();
        let mut r = record_with(4, 0);
        assert!(!check_leech(&mut r, &config, now));
    }

    #[test]
    fn cooldown_escalates_by_leech_count() {
        let config = LeechConfig::default();
        assert_eq!(config.cooldown_for(1), 3);
        assert_eq!(config.cooldown_for(2), 7);
        assert_eq!(config.cooldown_for(3), 14);
        assert_eq!(config.cooldown_for(4), 14);
    }

    #[test]
    fn releases_only_after_cooldown_elapses_and_preserves_counters() {
        let config = LeechConfig::default();
        let now = Utc::now();
        let mut r = record_with(5, 2);
        check_leech(&mut r, &config, now);
        assert!(!maybe_release_from_cooldown(&mut r, &config, now + chrono::Duration::days(2)));
        assert!(maybe_release_from_cooldown(&mut r, &config, now + chrono::Duration::days(3)));
        assert_eq!(r.state, WordState::Acquiring);
        assert_eq!(r.acquisition_box, Some(crate::domain::AcquisitionBox::Box1));
        assert_eq!(r.times_seen, 5, "prior counters preserved, not zeroed");
        assert_eq!(r.times_correct, 2);
    }
}
