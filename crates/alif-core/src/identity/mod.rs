//! Identity Resolver (§4.1): normalizes surface Arabic tokens to a canonical
//! lemma identifier, so all downstream logic references one lemma per
//! learning unit.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::domain::{LemmaId, VariantStats, VariantVerdict};
use crate::ports::{LexiconRepository, MorphologicalAnalyzer, VariantOracle};
use crate::ports::knowledge_repository::KnowledgeRepository;

/// A small, ordered set of recognized proclitics/enclitics, tried one at a
/// time in priority order (§4.1 step d). Definite article first (most
/// common), then conjunctions, then prepositions, then pronominal suffixes.
const PROCLITICS: &[&str] = &["ال", "و", "ف", "ب", "ل", "ك"];
const ENCLITIC_PRONOUNS: &[&str] = &["ه", "ها", "هم", "هن", "ك", "كم", "كن", "ني", "نا"];

/// Alef/hamza variants normalized only for comparison (§4.1 policy: "the
/// stored lemma keeps the original").
fn normalize_for_comparison(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'أ' | 'إ' | 'آ' => 'ا',
            'ؤ' => 'و',
            'ئ' => 'ي',
            'ة' => 'ه',
            other => other,
        })
        .collect()
}

/// Strips leading/trailing punctuation and single-character abbreviations
/// (§4.1 step a). Returns `None` if the remainder is too short.
fn strip_punctuation(surface: &str) -> Option<String> {
    let trimmed: String = surface
        .trim_matches(|c: char| !c.is_alphabetic())
        .to_string();
    if trimmed.chars().count() < 2 {
        return None;
    }
    Some(trimmed)
}

pub struct IdentityResolver {
    lexicon: Arc<dyn LexiconRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    variant_oracle: Option<Arc<dyn VariantOracle>>,
    analyzer: Option<Arc<dyn MorphologicalAnalyzer>>,
}

impl IdentityResolver {
    pub fn new(
        lexicon: Arc<dyn LexiconRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
        variant_oracle: Option<Arc<dyn VariantOracle>>,
        analyzer: Option<Arc<dyn MorphologicalAnalyzer>>,
    ) -> Self {
        Self {
            lexicon,
            knowledge,
            variant_oracle,
            analyzer,
        }
    }

    /// §4.1 `resolve`: steps (a)-(f), short-circuiting on first hit.
    /// Resolver failures are non-fatal — returns `Ok(None)` rather than an
    /// error; the sentence builder treats an unresolved token as dormant
    /// (§4.5).
    #[instrument(skip(self))]
    pub async fn resolve(&self, surface: &str) -> anyhow::Result<Option<LemmaId>> {
        let Some(stripped) = strip_punctuation(surface) else {
            return Ok(None);
        };

        // (c) direct lookup of the bare form.
        if let Some(lemma) = self.lexicon.find_lemma_by_bare(&stripped).await? {
            return Ok(Some(lemma.id));
        }
        let normalized = normalize_for_comparison(&stripped);
        if normalized != stripped {
            if let Some(lemma) = self.lexicon.find_lemma_by_bare(&normalized).await? {
                return Ok(Some(lemma.id));
            }
        }

        // (d) clitic-aware lookup: strip one recognized clitic at a time.
        for proclitic in PROCLITICS {
            if let Some(rest) = stripped.strip_prefix(proclitic) {
                if rest.chars().count() >= 2 {
                    if let Some(lemma) = self.lexicon.find_lemma_by_bare(rest).await? {
                        return Ok(Some(lemma.id));
                    }
                }
            }
        }
        for enclitic in ENCLITIC_PRONOUNS {
            if let Some(rest) = stripped.strip_suffix(enclitic) {
                if rest.chars().count() >= 2 {
                    if let Some(lemma) = self.lexicon.find_lemma_by_bare(rest).await? {
                        return Ok(Some(lemma.id));
                    }
                }
            }
        }

        // (e) inflected-form index lookup.
        if let Some(lemma) = self.lexicon.find_lemma_by_inflected_form(&stripped).await? {
            return Ok(Some(lemma.id));
        }

        // (f) morphological analyzer fallback, ordered by likelihood.
        if let Some(analyzer) = &self.analyzer {
            match analyzer.analyze(&stripped).await {
                Ok(analyses) => {
                    for analysis in analyses {
                        if let Some(lemma) = self.lexicon.find_lemma_by_bare(&analysis.lex).await? {
                            return Ok(Some(lemma.id));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "morphological analyzer unavailable, resolution degraded");
                }
            }
        }

        Ok(None)
    }

    /// §4.1 `confirm_variant`: consults the cache; on miss calls the LLM
    /// oracle, caching the reply. Root mismatch short-circuits to `distinct`
    /// without calling the oracle.
    #[instrument(skip(self))]
    pub async fn confirm_variant(
        &self,
        lemma_a: LemmaId,
        lemma_b: LemmaId,
    ) -> anyhow::Result<VariantVerdict> {
        let (ordered_a, ordered_b) = if lemma_a.0 <= lemma_b.0 {
            (lemma_a, lemma_b)
        } else {
            (lemma_b, lemma_a)
        };

        if let Some(cached) = self
            .knowledge
            .get_variant_decision(ordered_a, ordered_b)
            .await?
        {
            return Ok(cached);
        }

        let a = self
            .lexicon
            .get_lemma(ordered_a)
            .await?
            .ok_or_else(|| anyhow::anyhow!("lemma {ordered_a} not found"))?;
        let b = self
            .lexicon
            .get_lemma(ordered_b)
            .await?
            .ok_or_else(|| anyhow::anyhow!("lemma {ordered_b} not found"))?;

        if a.root.is_some() && b.root.is_some() && a.root != b.root {
            let verdict = VariantVerdict::Distinct;
            self.cache_decision(ordered_a, ordered_b, verdict).await?;
            return Ok(verdict);
        }

        let Some(oracle) = &self.variant_oracle else {
            // Oracle unavailable: degrade to the morphological signal only,
            // per §4.1 failure semantics. Conservative default is distinct —
            // some variants simply won't be caught until the oracle returns.
            return Ok(VariantVerdict::Distinct);
        };

        let verdict = match oracle
            .judge_variant(
                a.diacritized.as_deref().unwrap_or(&a.bare),
                &a.gloss,
                b.diacritized.as_deref().unwrap_or(&b.bare),
                &b.gloss,
            )
            .await
        {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "variant oracle unavailable, defaulting to distinct");
                VariantVerdict::Distinct
            }
        };

        self.cache_decision(ordered_a, ordered_b, verdict).await?;
        Ok(verdict)
    }

    async fn cache_decision(
        &self,
        lemma_a: LemmaId,
        lemma_b: LemmaId,
        verdict: VariantVerdict,
    ) -> anyhow::Result<()> {
        self.knowledge
            .cache_variant_decision(&crate::domain::VariantDecision {
                lemma_a,
                lemma_b,
                verdict,
                decided_at: Utc::now(),
            })
            .await
    }

    /// §4.1 `mark_variants`: sets each variant's `canonical_lemma` pointer
    /// (lexicon.db), merges observational counters and retires any FSRS card
    /// on the variant (knowledge.db). The pointer flip and the knowledge-side
    /// merge are separate databases, so each is committed as its own
    /// transaction; the pointer flip runs first so a crash between the two
    /// leaves a variant pointing at its canonical with stats not yet merged,
    /// never the reverse (a merged-but-unpointed variant would re-enter
    /// scheduling directly, violating the §3 invariant).
    #[instrument(skip(self, variants))]
    pub async fn mark_variants(&self, canonical: LemmaId, variants: &[LemmaId]) -> anyhow::Result<()> {
        for variant in variants {
            if let Some(mut lemma) = self.lexicon.get_lemma(*variant).await? {
                lemma.canonical_lemma = Some(canonical);
                self.lexicon.update_lemma(&lemma).await?;
            }
        }
        self.knowledge.apply_variant_merge(canonical, variants).await
    }

    /// Merges a variant's surface-form counters into the canonical's
    /// `variant_stats` (pure helper used by the storage layer's
    /// `apply_variant_merge` implementation).
    pub fn merge_variant_stats(canonical: &mut VariantStats, variant: &VariantStats) {
        for (form, count) in &variant.surface_form_counts {
            *canonical.surface_form_counts.entry(form.clone()).or_insert(0) += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_rejects_too_short() {
        assert_eq!(strip_punctuation("،كتاب."), Some("كتاب".to_string()));
        assert_eq!(strip_punctuation("أ."), None);
    }

    #[test]
    fn normalizes_hamza_variants_for_comparison_only() {
        assert_eq!(normalize_for_comparison("أكتب"), "اكتب");
        assert_eq!(normalize_for_comparison("مدرسة"), "مدرسه");
    }

    #[test]
    fn merges_variant_stats_additively() {
        let mut canonical = VariantStats::default();
        canonical.surface_form_counts.insert("كتب".into(), 2);
        let mut variant = VariantStats::default();
        variant.surface_form_counts.insert("كتب".into(), 3);
        variant.surface_form_counts.insert("كاتب".into(), 1);

        IdentityResolver::merge_variant_stats(&mut canonical, &variant);
        assert_eq!(canonical.surface_form_counts["كتب"], 5);
        assert_eq!(canonical.surface_form_counts["كاتب"], 1);
    }
}
