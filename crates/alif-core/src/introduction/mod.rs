//! Auto-Introduction Controller (§4.7): accuracy-throttled, capacity-bounded
//! admission controller that promotes encountered words into acquisition.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::acquisition::AcquisitionScheduler;
use crate::config::SchedulerConfig;
use crate::domain::{KnowledgeRecord, WordCategory, WordSource, WordState};
use crate::ports::knowledge_repository::KnowledgeRepository;
use crate::ports::LexiconRepository;

/// Visible staging of the admission decision, mirroring the teacher's
/// explicit multi-stage clamp report so the reasoning is inspectable rather
/// than folded into one opaque number.
#[derive(Debug, Clone, Copy)]
pub struct IntroductionAllowance {
    pub raw_demand: u32,
    pub after_accuracy_throttle: u32,
    pub after_per_session_cap: u32,
    pub after_box1_soft_cap: u32,
}

pub struct AutoIntroController {
    knowledge: Arc<dyn KnowledgeRepository>,
    lexicon: Arc<dyn LexiconRepository>,
    acquisition: Arc<AcquisitionScheduler>,
    config: SchedulerConfig,
}

impl AutoIntroController {
    pub fn new(
        knowledge: Arc<dyn KnowledgeRepository>,
        lexicon: Arc<dyn LexiconRepository>,
        acquisition: Arc<AcquisitionScheduler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            knowledge,
            lexicon,
            acquisition,
            config,
        }
    }

    /// §4.7: `slots_needed = target_session_size - due_review_count`,
    /// already computed by the caller and passed as `demand`. Applies the
    /// accuracy throttle, per-session cap, and box-1 soft cap, in that
    /// order, then selects and introduces candidates.
    #[instrument(skip(self))]
    pub async fn introduce(&self, demand: u32, now: DateTime<Utc>) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let allowance = self.compute_allowance(demand).await?;
        if allowance.after_box1_soft_cap == 0 {
            return Ok(vec![]);
        }

        let candidates = self
            .select_candidates(allowance.after_box1_soft_cap, now)
            .await?;

        let mut introduced = Vec::new();
        for mut record in candidates {
            record = self.acquisition.begin_acquisition(record, now);
            self.knowledge.upsert_record(&record).await?;
            introduced.push(record);
        }
        Ok(introduced)
    }

    /// Computes the staged allowance without mutating anything — useful for
    /// diagnostics and tests, mirroring the teacher's `compute_allowance`.
    pub async fn compute_allowance(&self, demand: u32) -> anyhow::Result<IntroductionAllowance> {
        let since = Utc::now() - self.config.auto_intro.recent_accuracy_window_chrono();
        let accuracy = self.knowledge.recent_accuracy(since).await?;
        let accuracy_slots = self.config.auto_intro.slots_for_accuracy(accuracy);
        let after_accuracy_throttle = demand.min(accuracy_slots);

        let after_per_session_cap = after_accuracy_throttle.min(self.config.auto_intro.per_session_cap);

        let box1_occupancy = self.box1_occupancy().await?;
        let box1_room = self
            .config
            .auto_intro
            .box1_soft_cap
            .saturating_sub(box1_occupancy);
        let after_box1_soft_cap = after_per_session_cap.min(box1_room);

        Ok(IntroductionAllowance {
            raw_demand: demand,
            after_accuracy_throttle,
            after_per_session_cap,
            after_box1_soft_cap,
        })
    }

    async fn box1_occupancy(&self) -> anyhow::Result<u32> {
        let due = self
            .knowledge
            .due_acquiring(Utc::now(), u32::MAX)
            .await?;
        Ok(due
            .iter()
            .filter(|r| r.acquisition_box == Some(crate::domain::AcquisitionBox::Box1))
            .count() as u32)
    }

    /// §4.7 selection: strict tier order by provenance, frequency rank and
    /// root-family familiarity as tiebreakers. Proper names and onomatopoeia
    /// are never auto-introduced. Words whose root has a freshly-failed
    /// sibling are skipped.
    async fn select_candidates(&self, limit: u32, now: DateTime<Utc>) -> anyhow::Result<Vec<KnowledgeRecord>> {
        let pool = self.knowledge.encountered_candidates(limit * 4).await?;

        let mut with_lemma = Vec::new();
        for record in pool {
            if let Some(lemma) = self.lexicon.get_lemma(record.lemma).await? {
                with_lemma.push((record, lemma));
            }
        }
        // `encountered_candidates` already orders by provenance tier; break
        // ties within each tier by frequency rank, unranked lemmas last.
        with_lemma.sort_by(|(a_record, a_lemma), (b_record, b_lemma)| {
            tier_rank(a_record.source).cmp(&tier_rank(b_record.source)).then(
                a_lemma
                    .frequency_rank
                    .unwrap_or(u32::MAX)
                    .cmp(&b_lemma.frequency_rank.unwrap_or(u32::MAX)),
            )
        });

        let mut selected = Vec::new();
        let mut skipped_roots: HashSet<_> = HashSet::new();

        for (record, lemma) in with_lemma {
            if selected.len() >= limit as usize {
                break;
            }
            if matches!(lemma.category, WordCategory::ProperName | WordCategory::Onomatopoeia) {
                continue;
            }
            if let Some(root) = lemma.root {
                if skipped_roots.contains(&root) {
                    continue;
                }
                if self.has_freshly_failed_sibling(root, now).await? {
                    skipped_roots.insert(root);
                    continue;
                }
            }
            selected.push(record);
        }
        Ok(selected)
    }

    /// "Words whose root has a freshly-failed sibling (lapsed within a
    /// short window) are skipped to avoid interference" (§4.7).
    async fn has_freshly_failed_sibling(
        &self,
        root: crate::domain::RootId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let siblings = self.lexicon.find_lemmas_by_root(root).await?;
        let window = chrono::Duration::days(3);
        for sibling in siblings {
            if let Some(record) = self.knowledge.get_record(sibling.id).await? {
                if record.state == WordState::Lapsed {
                    if let Some(last) = record.last_review_at {
                        if now - last <= window {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Provenance tier ordering, mirroring the `source` CASE expression in
/// `encountered_candidates`'s SQL (§4.7: book > story > course > frequency
/// list > everything else).
fn tier_rank(source: WordSource) -> u8 {
    match source {
        WordSource::BookImport => 0,
        WordSource::StoryImport => 1,
        WordSource::CourseImport => 2,
        WordSource::FrequencyList => 3,
        WordSource::SentenceGeneration => 4,
    }
}

/// Pure accuracy-band lookup, exposed standalone for table-driven tests
/// (§8: "An auto-intro call at accuracy 0.69 returns zero slots; at 0.71
/// returns up to 4.").
pub fn accuracy_from_counts(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 1.0;
    }
    correct as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoIntroConfig;
    use crate::domain::{KnowledgeRecord, Lemma, LemmaId, PartOfSpeech, WordCategory};
    use crate::testing::{MockKnowledgeRepository, MockLexiconRepository};
    use rstest::rstest;

    fn lemma_with_rank(id: i64, frequency_rank: Option<u32>) -> Lemma {
        Lemma {
            id: LemmaId(id),
            bare: format!("lemma{id}"),
            diacritized: None,
            pos: PartOfSpeech::Noun,
            root: None,
            gloss: String::new(),
            frequency_rank,
            cefr_band: None,
            category: WordCategory::Standard,
            inflected_forms: Default::default(),
            canonical_lemma: None,
        }
    }

    #[tokio::test]
    async fn select_candidates_breaks_ties_by_frequency_rank_within_tier() {
        let mut knowledge = MockKnowledgeRepository::new();
        knowledge.expect_encountered_candidates().returning(|_| {
            Ok(vec![
                KnowledgeRecord::new_encountered(LemmaId(1), WordSource::CourseImport),
                KnowledgeRecord::new_encountered(LemmaId(2), WordSource::CourseImport),
            ])
        });

        let mut lexicon = MockLexiconRepository::new();
        lexicon.expect_get_lemma().returning(|id| {
            let rank = if id == LemmaId(1) { Some(500) } else { Some(10) };
            Ok(Some(lemma_with_rank(id.0, rank)))
        });

        let acquisition = Arc::new(AcquisitionScheduler::new(
            Arc::new(MockKnowledgeRepository::new()),
            SchedulerConfig::default(),
        ));
        let controller = AutoIntroController::new(
            Arc::new(knowledge),
            Arc::new(lexicon),
            acquisition,
            SchedulerConfig::default(),
        );

        let selected = controller.select_candidates(10, Utc::now()).await.unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].lemma, LemmaId(2), "lower frequency rank sorts first within a tier");
        assert_eq!(selected[1].lemma, LemmaId(1));
    }

    #[rstest]
    #[case(0.69, 0)]
    #[case(0.70, 4)]
    #[case(0.71, 4)]
    #[case(0.85, 7)]
    #[case(0.92, 10)]
    #[case(0.99, 10)]
    fn accuracy_bands_match_spec_table(#[case] accuracy: f64, #[case] expected_slots: u32) {
        let config = AutoIntroConfig::default();
        assert_eq!(config.slots_for_accuracy(accuracy), expected_slots);
    }

    #[test]
    fn accuracy_from_counts_is_correct_over_total() {
        assert_eq!(accuracy_from_counts(2, 5), 0.4);
        assert_eq!(accuracy_from_counts(0, 0), 1.0);
    }
}
