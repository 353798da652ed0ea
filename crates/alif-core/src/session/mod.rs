//! Session Builder (§4.6): the top-level orchestrator producing an ordered,
//! bounded session list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, instrument};

use crate::config::SchedulerConfig;
use crate::domain::{
    ComprehensibilityClass, CreditType, KnowledgeRecord, LemmaId, Rating, Sentence, SentenceId,
    Session, SessionItem, SentenceReviewSubmission,
};
use crate::fsrs::FsrsScheduler;
use crate::introduction::AutoIntroController;
use crate::material::MaterialManager;
use crate::ports::knowledge_repository::KnowledgeRepository;
use crate::ports::LexiconRepository;

/// One scored candidate sentence during greedy set-cover selection.
#[derive(Debug, Clone)]
struct ScoredCandidate {
    sentence: Sentence,
    score: f64,
}

pub struct SessionBuilder {
    knowledge: Arc<dyn KnowledgeRepository>,
    lexicon: Arc<dyn LexiconRepository>,
    material: Arc<MaterialManager>,
    introducer: Arc<AutoIntroController>,
    fsrs: Arc<FsrsScheduler>,
    config: SchedulerConfig,
}

impl SessionBuilder {
    pub fn new(
        knowledge: Arc<dyn KnowledgeRepository>,
        lexicon: Arc<dyn LexiconRepository>,
        material: Arc<MaterialManager>,
        introducer: Arc<AutoIntroController>,
        fsrs: Arc<FsrsScheduler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            knowledge,
            lexicon,
            material,
            introducer,
            fsrs,
            config,
        }
    }

    /// Resolves a token's lemma to the lemma it should actually be credited
    /// to: itself if it's not a variant, or its `canonical_lemma` if it is
    /// (§4.1, §4.4 "Variant redirection", §8 "no reviews are ever attributed
    /// to [a variant] directly"). Returns `(effective_lemma, was_variant)`.
    async fn resolve_credit_lemma(&self, lemma: LemmaId) -> anyhow::Result<(LemmaId, bool)> {
        resolve_credit_lemma(self.lexicon.as_ref(), lemma).await
    }

    /// Folds a variant's surface form into the canonical record's
    /// `variant_stats` (§3, §8 Scenario 3: "V's surface form appears in
    /// C.variant_stats"). Observational only — does not touch scheduling
    /// state.
    async fn redirect_variant_surface_stats(&self, canonical: LemmaId, surface: &str) -> anyhow::Result<()> {
        redirect_variant_surface_stats(self.knowledge.as_ref(), canonical, surface).await
    }

    /// §4.6: builds one session, bounded by `[min_session_size,
    /// max_session_size]`.
    #[instrument(skip(self))]
    pub async fn build_session(&self, now: DateTime<Utc>, session_id: &str) -> anyhow::Result<Session> {
        // Step 1: gather due.
        let due_acquiring = self
            .knowledge
            .due_acquiring(now, self.config.session.max_session_size * 4)
            .await?;
        let near_due_window = ChronoDuration::hours(2).to_std().unwrap_or_default();
        let mut due_fsrs = self
            .knowledge
            .due_fsrs(now, near_due_window, self.config.session.focus_cohort_cap)
            .await?;

        // Step 2: focus cohort — acquiring words always included, remaining
        // slots filled by lowest-stability FSRS-due.
        let cohort_remaining = (self.config.session.focus_cohort_cap as usize)
            .saturating_sub(due_acquiring.len());
        if due_fsrs.len() > cohort_remaining {
            due_fsrs.truncate(cohort_remaining);
        } else if due_fsrs.len() < cohort_remaining {
            let fillers = self
                .knowledge
                .lowest_stability_fsrs((cohort_remaining - due_fsrs.len()) as u32)
                .await?;
            due_fsrs.extend(fillers);
        }

        let mut due_lemmas: HashSet<LemmaId> = due_acquiring.iter().map(|r| r.lemma).collect();
        due_lemmas.extend(due_fsrs.iter().map(|r| r.lemma));

        let mut items = self
            .select_sentences(&due_lemmas, now, self.config.session.max_session_size)
            .await?;

        // Step 7: acquisition repetition.
        self.ensure_acquisition_repetition(&due_acquiring, &mut items, now)
            .await?;

        // Step 8: fill.
        if items.len() < self.config.session.min_session_size as usize {
            self.fill_session(&mut items, now, session_id).await?;
        }

        // Step 9: easy-bookend ordering.
        let ordered = order_bookend(items);

        self.record_times_shown(&ordered).await?;

        Ok(Session {
            id: session_id.to_string(),
            items: ordered,
            created_at: now,
        })
    }

    /// Bumps `times_shown` on every sentence actually served in a built
    /// session, persisting it so later scoring (§4.6 scaffold freshness and
    /// diversity terms) and retirement priority (§4.5 never-shown-stale
    /// first) see the exposure.
    async fn record_times_shown(&self, items: &[SessionItem]) -> anyhow::Result<()> {
        record_times_shown(self.knowledge.as_ref(), items).await
    }

    /// Steps 3-6: candidate sentences → comprehensibility gate → score →
    /// greedy set cover.
    async fn select_sentences(
        &self,
        due_lemmas: &HashSet<LemmaId>,
        _now: DateTime<Utc>,
        session_size: u32,
    ) -> anyhow::Result<Vec<SessionItem>> {
        let due_vec: Vec<LemmaId> = due_lemmas.iter().copied().collect();
        let candidates = self.knowledge.active_sentences_covering(&due_vec).await?;

        let mut remaining_due: HashSet<LemmaId> = due_lemmas.clone();
        let mut claimed: HashMap<SentenceId, bool> = HashMap::new();
        let mut items = Vec::new();

        let mut pool = candidates;
        while !remaining_due.is_empty() && items.len() < session_size as usize && !pool.is_empty() {
            let mut scored = Vec::new();
            for sentence in &pool {
                if claimed.contains_key(&sentence.id) {
                    continue;
                }
                if !self.passes_comprehensibility_gate(sentence).await? {
                    continue;
                }
                let coverage = sentence
                    .target_words
                    .iter()
                    .chain(sentence.scaffold_lemmas().iter())
                    .filter(|l| remaining_due.contains(l))
                    .count();
                if coverage == 0 {
                    continue;
                }
                let score = score_sentence(sentence, coverage);
                scored.push(ScoredCandidate {
                    sentence: sentence.clone(),
                    score,
                });
            }

            let Some(best) = scored
                .into_iter()
                .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            else {
                break;
            };

            let covered: Vec<LemmaId> = best
                .sentence
                .target_words
                .iter()
                .chain(best.sentence.scaffold_lemmas().iter())
                .filter(|l| remaining_due.contains(l))
                .copied()
                .collect();
            for lemma in &covered {
                remaining_due.remove(lemma);
            }
            claimed.insert(best.sentence.id, true);

            items.push(SessionItem {
                sentence: best.sentence.id,
                target_words: best.sentence.target_words.clone(),
                scaffold_words: best.sentence.scaffold_lemmas(),
                is_acquisition_repetition: false,
            });
        }

        Ok(items)
    }

    /// Step 4: comprehensibility gate. §9 open question: the spec chose
    /// "only scaffold" for the denominator; kept switchable via config.
    async fn passes_comprehensibility_gate(&self, sentence: &Sentence) -> anyhow::Result<bool> {
        let denom_lemmas: Vec<LemmaId> = if self.config.session.comprehensibility_counts_target_word {
            sentence.tokens.iter().filter_map(|t| t.lemma).collect()
        } else {
            sentence.scaffold_lemmas()
        };
        if denom_lemmas.is_empty() {
            return Ok(true);
        }
        let classes = self
            .knowledge
            .classify_comprehensibility(&denom_lemmas)
            .await?;
        let consolidated = classes
            .values()
            .filter(|c| **c == ComprehensibilityClass::KnownEnough)
            .count();
        let fraction = consolidated as f64 / denom_lemmas.len() as f64;
        Ok(fraction >= self.config.session.comprehensibility_fraction)
    }

    /// Step 7: ensures every acquiring word in the session reaches
    /// `min_exposures`, expanding via additional sentences containing it.
    async fn ensure_acquisition_repetition(
        &self,
        due_acquiring: &[KnowledgeRecord],
        items: &mut Vec<SessionItem>,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        for record in due_acquiring {
            let current_exposures = items
                .iter()
                .filter(|i| i.target_words.contains(&record.lemma) || i.scaffold_words.contains(&record.lemma))
                .count();
            if current_exposures >= self.config.session.min_acquisition_exposures as usize {
                continue;
            }
            let needed = self.config.session.min_acquisition_exposures as usize - current_exposures;
            let already_used: HashSet<SentenceId> = items.iter().map(|i| i.sentence).collect();

            let more = self
                .knowledge
                .active_sentences_covering(&[record.lemma])
                .await?;
            let mut added = 0;
            for sentence in more {
                if added >= needed {
                    break;
                }
                if already_used.contains(&sentence.id) {
                    continue;
                }
                items.push(SessionItem {
                    sentence: sentence.id,
                    target_words: sentence.target_words.clone(),
                    scaffold_words: sentence.scaffold_lemmas(),
                    is_acquisition_repetition: true,
                });
                added += 1;
            }
        }
        Ok(())
    }

    /// Step 8: fill mode — run the auto-introducer with relaxed caps, retry
    /// sentence selection, and fall back to JIT generation. If no
    /// obligations remain, returns without padding the session.
    async fn fill_session(
        &self,
        items: &mut Vec<SessionItem>,
        now: DateTime<Utc>,
        _session_id: &str,
    ) -> anyhow::Result<()> {
        let slots_needed = self.config.session.min_session_size as usize - items.len();
        let introduced = self.introducer.introduce(slots_needed as u32, now).await?;
        if introduced.is_empty() {
            info!("no auto-introductions available, returning shorter session");
            return Ok(());
        }

        let new_due: HashSet<LemmaId> = introduced.iter().map(|r| r.lemma).collect();
        let mut fresh_items = self
            .select_sentences(&new_due, now, slots_needed as u32)
            .await?;
        items.append(&mut fresh_items);

        let mut budget = self.config.material.jit_generation_budget_per_session;
        for lemma in new_due {
            if items.len() >= self.config.session.min_session_size as usize || budget == 0 {
                break;
            }
            if let Some(sentence_id) = self.material.generate_jit(lemma).await? {
                if let Some(sentence) = self.knowledge.get_sentence(sentence_id).await? {
                    items.push(SessionItem {
                        sentence: sentence.id,
                        target_words: sentence.target_words.clone(),
                        scaffold_words: sentence.scaffold_lemmas(),
                        is_acquisition_repetition: false,
                    });
                }
            }
            budget -= 1;
        }
        Ok(())
    }

    /// Applies a sentence-level review submission (§4.6 "Review credit on
    /// submission"): per content token, routes credit to the acquisition or
    /// FSRS scheduler, deduplicated per lemma per sentence, idempotent by
    /// client review id. Tokens whose lemma is a variant redirect to their
    /// canonical (§4.4, §8 Scenario 3): the review is attributed to the
    /// canonical, never the variant, and the variant's surface form is
    /// folded into the canonical's `variant_stats`.
    #[instrument(skip(self, acquisition))]
    pub async fn submit_sentence_review(
        &self,
        acquisition: &crate::acquisition::AcquisitionScheduler,
        submission: &SentenceReviewSubmission,
        sentence: &Sentence,
    ) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for token in &sentence.tokens {
            let Some(raw_lemma) = token.lemma else { continue };
            let (lemma, was_variant) = self.resolve_credit_lemma(raw_lemma).await?;
            if !seen.insert(lemma) {
                continue; // dedup: a lemma appearing twice is reviewed once.
            }

            let rating = if submission.missed_words.contains(&raw_lemma) || submission.missed_words.contains(&lemma) {
                Rating::Again
            } else {
                submission.comprehension.default_word_rating()
            };
            let credit_type = if was_variant {
                CreditType::VariantRedirect
            } else if sentence.target_words.contains(&lemma) {
                CreditType::Target
            } else {
                CreditType::Scaffold
            };

            if was_variant {
                self.redirect_variant_surface_stats(lemma, &token.surface).await?;
            }

            let record = self.knowledge.get_record(lemma).await?;
            let Some(record) = record else { continue };

            if record.acquisition_box.is_some() {
                acquisition
                    .submit_review(
                        lemma,
                        rating,
                        submission.submitted_at,
                        &submission.session_id,
                        &submission.client_review_id,
                        credit_type,
                    )
                    .await?;
            } else if record.fsrs_card.is_some() {
                self.fsrs
                    .submit_review(
                        lemma,
                        rating,
                        submission.submitted_at,
                        &submission.session_id,
                        &submission.client_review_id,
                        credit_type,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Background refresh trigger (§4.6): if elapsed time since the
    /// previous reviewed card exceeds the staleness threshold, the caller
    /// should invalidate any cached session and call `build_session` again.
    pub fn is_session_stale(&self, last_card_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let threshold = ChronoDuration::from_std(self.config.session.background_refresh_staleness)
            .unwrap_or(ChronoDuration::minutes(15));
        now - last_card_at > threshold
    }
}

/// Resolves a lemma to the one it should be credited to: itself if it isn't
/// a variant, its `canonical_lemma` otherwise (§4.1, §4.4, §8 Scenario 3).
async fn resolve_credit_lemma(
    lexicon: &dyn LexiconRepository,
    lemma: LemmaId,
) -> anyhow::Result<(LemmaId, bool)> {
    match lexicon.get_lemma(lemma).await? {
        Some(l) if l.is_variant() => {
            let canonical = l.canonical_lemma.expect("is_variant implies canonical_lemma is set");
            Ok((canonical, true))
        }
        _ => Ok((lemma, false)),
    }
}

/// Folds a variant's surface form into the canonical record's
/// `variant_stats` (§3, §8 Scenario 3: "V's surface form appears in
/// C.variant_stats"). Observational only — does not touch scheduling state.
async fn redirect_variant_surface_stats(
    knowledge: &dyn KnowledgeRepository,
    canonical: LemmaId,
    surface: &str,
) -> anyhow::Result<()> {
    let Some(mut record) = knowledge.get_record(canonical).await? else {
        return Ok(());
    };
    *record
        .variant_stats
        .surface_form_counts
        .entry(surface.to_string())
        .or_insert(0) += 1;
    knowledge.upsert_record(&record).await
}

/// Bumps and persists `times_shown` for every sentence served in a built
/// session (§4.5, §4.6): the scaffold-freshness/diversity score terms and
/// the never-shown-stale-first retirement priority both read this field.
async fn record_times_shown(
    knowledge: &dyn KnowledgeRepository,
    items: &[SessionItem],
) -> anyhow::Result<()> {
    for item in items {
        let Some(mut sentence) = knowledge.get_sentence(item.sentence).await? else {
            continue;
        };
        sentence.times_shown += 1;
        knowledge.update_sentence(&sentence).await?;
    }
    Ok(())
}

/// §4.6 step 5 scoring: `coverage^1.5 * due_quality * grammar_fit * diversity
/// * scaffold_freshness * source_bonus`. `due_quality` and `grammar_fit` are
/// taken as 1.0 placeholders pending richer per-sentence signals; the pool
/// already filters for grammar via the quality-audit stage (§4.5 step 4).
fn score_sentence(sentence: &Sentence, coverage: usize) -> f64 {
    let coverage_term = (coverage as f64).powf(1.5);
    let diversity = 1.0 / (1.0 + sentence.times_shown as f64);
    let scaffold_freshness = scaffold_freshness(sentence);
    let source_bonus = sentence.source.source_bonus();
    coverage_term * diversity * scaffold_freshness * source_bonus
}

/// Geometric mean of `min(1, 8 / scaffold_times_seen)` floored at 0.3
/// (§4.6 step 5). `times_shown` on the sentence stands in for per-scaffold
/// exposure counts, since individual scaffold exposure is tracked on the
/// knowledge record, not duplicated on the sentence.
fn scaffold_freshness(sentence: &Sentence) -> f64 {
    let n = sentence.scaffold_lemmas().len();
    if n == 0 {
        return 1.0;
    }
    let per_word = (8.0 / (sentence.times_shown as f64 + 1.0)).min(1.0);
    per_word.max(0.3)
}

/// §4.6 step 9: easy-bookend ordering — easier reviews first and last,
/// harder acquiring exposures in the middle, stable interleaving within
/// each bookend.
fn order_bookend(items: Vec<SessionItem>) -> Vec<SessionItem> {
    let (hard, easy): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|i| i.is_acquisition_repetition);

    let split = easy.len() / 2;
    let (warm_up, recency) = easy.split_at(split);
    let mut ordered = Vec::new();
    ordered.extend_from_slice(warm_up);
    ordered.extend(hard);
    ordered.extend_from_slice(recency);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lemma, PartOfSpeech, SentenceSource, WordCategory, WordSource};
    use crate::testing::{MockKnowledgeRepository, MockLexiconRepository};

    fn bare_lemma(id: i64, canonical_lemma: Option<LemmaId>) -> Lemma {
        Lemma {
            id: LemmaId(id),
            bare: format!("lemma{id}"),
            diacritized: None,
            pos: PartOfSpeech::Noun,
            root: None,
            gloss: String::new(),
            frequency_rank: None,
            cefr_band: None,
            category: WordCategory::Standard,
            inflected_forms: Default::default(),
            canonical_lemma,
        }
    }

    fn bare_sentence(id: i64, targets: Vec<LemmaId>, times_shown: u32) -> Sentence {
        Sentence {
            id: SentenceId(id),
            text_diacritized: "نص".into(),
            translation_en: "text".into(),
            tokens: vec![],
            active: true,
            times_shown,
            target_words: targets,
            source: SentenceSource::LlmGenerated,
            page_number: None,
            audio_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scoring_prefers_higher_coverage() {
        let s1 = bare_sentence(1, vec![LemmaId(1), LemmaId(2)], 0);
        let s2 = bare_sentence(2, vec![LemmaId(1)], 0);
        assert!(score_sentence(&s1, 2) > score_sentence(&s2, 1));
    }

    #[test]
    fn scoring_prefers_less_shown_sentences() {
        let fresh = bare_sentence(1, vec![LemmaId(1)], 0);
        let stale = bare_sentence(2, vec![LemmaId(1)], 10);
        assert!(score_sentence(&fresh, 1) > score_sentence(&stale, 1));
    }

    #[test]
    fn bookend_ordering_places_repetitions_in_the_middle() {
        let items = vec![
            SessionItem { sentence: SentenceId(1), target_words: vec![], scaffold_words: vec![], is_acquisition_repetition: false },
            SessionItem { sentence: SentenceId(2), target_words: vec![], scaffold_words: vec![], is_acquisition_repetition: true },
            SessionItem { sentence: SentenceId(3), target_words: vec![], scaffold_words: vec![], is_acquisition_repetition: false },
        ];
        let ordered = order_bookend(items);
        assert!(ordered[1].is_acquisition_repetition);
    }

    #[tokio::test]
    async fn resolve_credit_lemma_passes_through_non_variant() {
        let mut lexicon = MockLexiconRepository::new();
        lexicon
            .expect_get_lemma()
            .returning(|id| Ok(Some(bare_lemma(id.0, None))));

        let (effective, was_variant) = resolve_credit_lemma(&lexicon, LemmaId(1)).await.unwrap();
        assert_eq!(effective, LemmaId(1));
        assert!(!was_variant);
    }

    #[tokio::test]
    async fn resolve_credit_lemma_redirects_variant_to_canonical() {
        let mut lexicon = MockLexiconRepository::new();
        lexicon
            .expect_get_lemma()
            .returning(|id| Ok(Some(bare_lemma(id.0, Some(LemmaId(100))))));

        let (effective, was_variant) = resolve_credit_lemma(&lexicon, LemmaId(2)).await.unwrap();
        assert_eq!(effective, LemmaId(100));
        assert!(was_variant);
    }

    #[tokio::test]
    async fn redirect_variant_surface_stats_increments_canonical_record() {
        let mut knowledge = MockKnowledgeRepository::new();
        knowledge.expect_get_record().returning(|lemma| {
            Ok(Some(KnowledgeRecord::new_encountered(
                lemma,
                WordSource::CourseImport,
            )))
        });
        knowledge
            .expect_upsert_record()
            .withf(|record| record.variant_stats.surface_form_counts.get("كتب") == Some(&1))
            .returning(|_| Ok(()));

        redirect_variant_surface_stats(&knowledge, LemmaId(100), "كتب")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_times_shown_increments_and_persists() {
        let mut knowledge = MockKnowledgeRepository::new();
        knowledge
            .expect_get_sentence()
            .returning(|id| Ok(Some(bare_sentence(id.0, vec![], 3))));
        knowledge
            .expect_update_sentence()
            .withf(|sentence| sentence.times_shown == 4)
            .returning(|_| Ok(()));

        let items = vec![SessionItem {
            sentence: SentenceId(1),
            target_words: vec![],
            scaffold_words: vec![],
            is_acquisition_repetition: false,
        }];
        record_times_shown(&knowledge, &items).await.unwrap();
    }
}
