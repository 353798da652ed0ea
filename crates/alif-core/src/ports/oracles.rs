use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{LemmaId, PartOfSpeech, VariantVerdict};

/// One candidate analysis of a surface form (§6: "lex, root, part of
/// speech, and features").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorphologicalAnalysis {
    pub lex: String,
    pub root: Option<Vec<char>>,
    pub pos: PartOfSpeech,
    pub features: std::collections::HashMap<String, String>,
    /// Corpus probability used by the maximum-likelihood disambiguator to
    /// order analyses (§4.1 step f, §6).
    pub likelihood: f64,
}

/// §6: "given an Arabic surface form, returns a list of analyses... plus a
/// maximum-likelihood disambiguator that orders them by corpus
/// probability." The analyzer itself returns analyses pre-ordered by
/// likelihood; the resolver just takes the first that matches a known
/// lemma.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MorphologicalAnalyzer: Send + Sync {
    async fn analyze(&self, surface: &str) -> Result<Vec<MorphologicalAnalysis>, crate::domain::OracleError>;
}

/// §6 LLM oracle (a): given two diacritized lemmas with glosses, judges
/// whether they are the same word for scheduling purposes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VariantOracle: Send + Sync {
    async fn judge_variant(
        &self,
        lemma_a_diacritized: &str,
        gloss_a: &str,
        lemma_b_diacritized: &str,
        gloss_b: &str,
    ) -> Result<VariantVerdict, crate::domain::OracleError>;
}

/// One target-word group handed to the sentence generator for backfill
/// (§4.5 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceGenerationRequest {
    pub target_lemmas: Vec<LemmaId>,
    /// Vocabulary the generator may freely use as scaffold, partitioned by
    /// POS so it can respect agreement constraints (§6).
    pub allowed_vocabulary: std::collections::HashMap<PartOfSpeech, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSentence {
    pub text_diacritized: String,
    pub translation_en: String,
    /// How many of `target_lemmas` the generator claims to have included;
    /// validated independently by the pipeline's rule-based pass (§4.5).
    pub claimed_target_count: u32,
}

/// §6 LLM oracle (b): given target words and an allowed vocabulary,
/// generates candidate sentences.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SentenceGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &SentenceGenerationRequest,
    ) -> Result<Vec<GeneratedSentence>, crate::domain::OracleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Ok,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceReview {
    pub verdict: ReviewVerdict,
    pub reason: Option<String>,
}

/// §6 LLM oracle (c): semantic quality audit (§4.5 step 4). "Fails closed:
/// if the reviewer is unavailable, the sentence is rejected" — callers must
/// treat `OracleError::Unavailable` as a reject, not retry-forever.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SentenceReviewer: Send + Sync {
    async fn review(
        &self,
        text_diacritized: &str,
        translation_en: &str,
    ) -> Result<SentenceReview, crate::domain::OracleError>;
}

/// §6: text-to-speech, only invoked for sentences whose scaffold is already
/// well-consolidated. Out of core scope as a vendor, but modeled as a port
/// so the session builder can request audio without depending on a vendor
/// crate directly.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text_diacritized: &str) -> Result<Vec<u8>, crate::domain::OracleError>;
}
