//! HTTP-backed implementations of the §6 external oracle contracts
//! (morphological analyzer, variant/sentence/review LLM oracles). Each
//! oracle is a thin `reqwest` client over a configured endpoint, with a
//! bounded timeout (§5: "every external call has a bounded timeout") and
//! untrusted-response validation that fails closed on anything that
//! doesn't parse (§9: "treat all LLM responses as untrusted inputs...
//! on schema mismatch, fail closed").

use std::time::Duration;

use alif_core::{
    GeneratedSentence, MorphologicalAnalysis, MorphologicalAnalyzer, OracleError, PartOfSpeech,
    ReviewVerdict, SentenceGenerationRequest, SentenceGenerator, SentenceReview, SentenceReviewer,
    VariantOracle, VariantVerdict,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client with a fixed timeout should always build")
}

fn map_transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(DEFAULT_TIMEOUT)
    } else {
        OracleError::Unavailable(err.to_string())
    }
}

/// `reqwest`-backed morphological analyzer (§6): POSTs a surface form,
/// expects analyses pre-ordered by corpus likelihood.
pub struct HttpMorphologicalAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpMorphologicalAnalyzer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    surface: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponseEntry {
    lex: String,
    root: Option<String>,
    pos: String,
    features: std::collections::HashMap<String, String>,
    likelihood: f64,
}

fn parse_pos(s: &str) -> Option<PartOfSpeech> {
    Some(match s {
        "noun" => PartOfSpeech::Noun,
        "verb" => PartOfSpeech::Verb,
        "adjective" => PartOfSpeech::Adjective,
        "adverb" => PartOfSpeech::Adverb,
        "preposition" => PartOfSpeech::Preposition,
        "conjunction" => PartOfSpeech::Conjunction,
        "particle" => PartOfSpeech::Particle,
        "pronoun" => PartOfSpeech::Pronoun,
        "proper_noun" => PartOfSpeech::ProperNoun,
        "other" => PartOfSpeech::Other,
        _ => return None,
    })
}

#[async_trait]
impl MorphologicalAnalyzer for HttpMorphologicalAnalyzer {
    async fn analyze(&self, surface: &str) -> Result<Vec<MorphologicalAnalysis>, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { surface })
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "analyzer returned status {}",
                response.status()
            )));
        }

        let entries: Vec<AnalyzeResponseEntry> = response
            .json()
            .await
            .map_err(|e| OracleError::Invalid(e.to_string()))?;

        entries
            .into_iter()
            .map(|e| {
                let pos = parse_pos(&e.pos)
                    .ok_or_else(|| OracleError::Invalid(format!("unknown pos '{}'", e.pos)))?;
                Ok(MorphologicalAnalysis {
                    lex: e.lex,
                    root: e.root.map(|r| r.chars().collect()),
                    pos,
                    features: e.features,
                    likelihood: e.likelihood,
                })
            })
            .collect()
    }
}

/// `reqwest`-backed variant oracle (§6 oracle a).
pub struct HttpVariantOracle {
    client: Client,
    endpoint: String,
}

impl HttpVariantOracle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct VariantRequest<'a> {
    lemma_a_diacritized: &'a str,
    gloss_a: &'a str,
    lemma_b_diacritized: &'a str,
    gloss_b: &'a str,
}

#[derive(Deserialize)]
struct VariantResponse {
    verdict: String,
}

#[async_trait]
impl VariantOracle for HttpVariantOracle {
    async fn judge_variant(
        &self,
        lemma_a_diacritized: &str,
        gloss_a: &str,
        lemma_b_diacritized: &str,
        gloss_b: &str,
    ) -> Result<VariantVerdict, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&VariantRequest {
                lemma_a_diacritized,
                gloss_a,
                lemma_b_diacritized,
                gloss_b,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "variant oracle returned status {}",
                response.status()
            )));
        }

        let body: VariantResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Invalid(e.to_string()))?;

        match body.verdict.as_str() {
            "equivalent" => Ok(VariantVerdict::Equivalent),
            "distinct" => Ok(VariantVerdict::Distinct),
            other => Err(OracleError::Invalid(format!("unknown verdict '{other}'"))),
        }
    }
}

/// `reqwest`-backed sentence generator (§6 oracle b).
pub struct HttpSentenceGenerator {
    client: Client,
    endpoint: String,
}

impl HttpSentenceGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequestBody {
    target_lemma_ids: Vec<i64>,
    allowed_vocabulary: std::collections::HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct GenerateResponseEntry {
    text_diacritized: String,
    translation_en: String,
    claimed_target_count: u32,
}

#[async_trait]
impl SentenceGenerator for HttpSentenceGenerator {
    async fn generate(
        &self,
        request: &SentenceGenerationRequest,
    ) -> Result<Vec<GeneratedSentence>, OracleError> {
        let body = GenerateRequestBody {
            target_lemma_ids: request.target_lemmas.iter().map(|l| l.0).collect(),
            allowed_vocabulary: request
                .allowed_vocabulary
                .iter()
                .map(|(pos, words)| (format!("{pos:?}"), words.clone()))
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "sentence generator returned status {}",
                response.status()
            )));
        }

        let entries: Vec<GenerateResponseEntry> = response
            .json()
            .await
            .map_err(|e| OracleError::Invalid(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|e| GeneratedSentence {
                text_diacritized: e.text_diacritized,
                translation_en: e.translation_en,
                claimed_target_count: e.claimed_target_count,
            })
            .collect())
    }
}

/// `reqwest`-backed sentence quality reviewer (§6 oracle c). §4.5: "fails
/// closed: if the reviewer is unavailable, the sentence is rejected" — the
/// caller (material pipeline) is responsible for treating `Err` as a reject,
/// not this client.
pub struct HttpSentenceReviewer {
    client: Client,
    endpoint: String,
}

impl HttpSentenceReviewer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct ReviewRequest<'a> {
    text_diacritized: &'a str,
    translation_en: &'a str,
}

#[derive(Deserialize)]
struct ReviewResponse {
    verdict: String,
    reason: Option<String>,
}

#[async_trait]
impl SentenceReviewer for HttpSentenceReviewer {
    async fn review(
        &self,
        text_diacritized: &str,
        translation_en: &str,
    ) -> Result<SentenceReview, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ReviewRequest {
                text_diacritized,
                translation_en,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "reviewer returned status {}",
                response.status()
            )));
        }

        let body: ReviewResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Invalid(e.to_string()))?;

        let verdict = match body.verdict.as_str() {
            "ok" => ReviewVerdict::Ok,
            "reject" => ReviewVerdict::Reject,
            other => return Err(OracleError::Invalid(format!("unknown review verdict '{other}'"))),
        };

        Ok(SentenceReview {
            verdict,
            reason: body.reason,
        })
    }
}
