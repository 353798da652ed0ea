use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identifiers. Newtype wrappers keep lemma/root/sentence ids from being
/// accidentally swapped at call sites (the teacher used bare `i64`/`String`
/// node ids and paid for it in call-site confusion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LemmaId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SentenceId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReviewLogId(pub i64);

impl std::fmt::Display for LemmaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lemma:{}", self.0)
    }
}

impl std::fmt::Display for SentenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sentence:{}", self.0)
    }
}

/// Arabic consonantal root (جذر), e.g. "k.t.b". §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub id: RootId,
    /// Ordered Arabic radicals, 3 or 4 letters, each in U+0621..=U+064A.
    pub radicals: Vec<char>,
    pub gloss: String,
}

impl Root {
    /// Validates radicals are in-range Arabic script and of valid length.
    /// §3: "otherwise the root is rejected at ingest."
    pub fn validate_radicals(radicals: &[char]) -> Result<(), crate::domain::DomainError> {
        if radicals.len() != 3 && radicals.len() != 4 {
            return Err(crate::domain::DomainError::InvalidRoot(
                radicals.iter().collect(),
            ));
        }
        for c in radicals {
            let cp = *c as u32;
            if !(0x0621..=0x064A).contains(&cp) {
                return Err(crate::domain::DomainError::InvalidRoot(
                    radicals.iter().collect(),
                ));
            }
        }
        Ok(())
    }
}

/// Part-of-speech tag for a lemma. Kept open-ended (string-backed enum) since
/// the morphological analyzer's tagset is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Preposition,
    Conjunction,
    Particle,
    Pronoun,
    ProperNoun,
    Other,
}

/// §3 word category: governs auto-introduction eligibility (proper names and
/// onomatopoeia are never auto-introduced, §4.7) and ingest filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordCategory {
    Standard,
    ProperName,
    Onomatopoeia,
    Junk,
}

/// CEFR proficiency band, optional per-lemma metadata used for tiebreaking
/// during auto-introduction selection (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CefrBand {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

/// Canonical dictionary form of a word; the unit of scheduling. §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    /// Diacritic-free surface string. Unique per lemma (invariant, §3).
    pub bare: String,
    /// Diacritized surface string, when known.
    pub diacritized: Option<String>,
    pub pos: PartOfSpeech,
    pub root: Option<RootId>,
    pub gloss: String,
    pub frequency_rank: Option<u32>,
    pub cefr_band: Option<CefrBand>,
    pub category: WordCategory,
    /// Maps an inflected surface form to a semantic role, used only for
    /// lookup during identity resolution (§4.1 step e). Never used for
    /// scheduling.
    pub inflected_forms: HashMap<String, String>,
    /// When set, this lemma is a variant of `canonical_lemma` and never
    /// receives scheduling or reviews directly (§3 invariant). Depth 1, never
    /// cyclic — enforced by `mark_variants` (§4.1), not by this type.
    pub canonical_lemma: Option<LemmaId>,
}

impl Lemma {
    pub fn is_variant(&self) -> bool {
        self.canonical_lemma.is_some()
    }
}

/// §3 word-state machine: Encountered → Acquiring → {Learning, Known, Lapsed}
/// → Suspended (reversible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordState {
    Encountered,
    Acquiring,
    Learning,
    Known,
    Lapsed,
    Suspended,
}

/// Leitner acquisition box. `None` means the record is not currently
/// acquiring (either pre-acquisition or graduated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionBox {
    Box1,
    Box2,
    Box3,
}

/// Raw review rating submitted by the user (or derived from a
/// comprehension rating, §4.6). §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn is_correct(&self) -> bool {
        !matches!(self, Rating::Again)
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }
}

impl TryFrom<u8> for Rating {
    type Error = crate::domain::DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            other => Err(crate::domain::DomainError::InvalidRating(other)),
        }
    }
}

/// Opaque FSRS card state persisted on a `KnowledgeRecord` once graduated.
/// §3: "FSRS card blob (null until graduated)". §6: "stored as an opaque
/// blob updated atomically".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsCard {
    pub stability: f64,
    pub difficulty: f64,
    /// Last computed retrievability at `last_review_at`, cached for
    /// diagnostics; not authoritative (recomputed from elapsed time + S).
    pub last_retrievability: f64,
}

/// How a word entered the system. §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordSource {
    BookImport,
    StoryImport,
    CourseImport,
    FrequencyList,
    SentenceGeneration,
}

/// Per-surface-form counters merged from variants into their canonical
/// record. Observational only (§3, §4.1 `mark_variants`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantStats {
    pub surface_form_counts: HashMap<String, u32>,
}

/// One per user per lemma; the unit of scheduling. §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub lemma: LemmaId,
    pub state: WordState,
    pub acquisition_box: Option<AcquisitionBox>,
    pub acquisition_next_due: Option<DateTime<Utc>>,
    pub acquisition_started_at: Option<DateTime<Utc>>,
    pub graduated_at: Option<DateTime<Utc>>,
    pub fsrs_card: Option<FsrsCard>,
    pub fsrs_due_at: Option<DateTime<Utc>>,
    pub times_seen: u32,
    pub times_correct: u32,
    pub leech_count: u32,
    pub leech_suspended_at: Option<DateTime<Utc>>,
    pub last_review_at: Option<DateTime<Utc>>,
    pub variant_stats: VariantStats,
    pub source: WordSource,
}

impl KnowledgeRecord {
    pub fn new_encountered(lemma: LemmaId, source: WordSource) -> Self {
        Self {
            lemma,
            state: WordState::Encountered,
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
            variant_stats: VariantStats::default(),
            source,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.times_seen == 0 {
            return 1.0;
        }
        self.times_correct as f64 / self.times_seen as f64
    }

    /// §3 invariant: `state = acquiring` iff `box ∈ {1,2,3}` and card is null.
    pub fn satisfies_state_invariant(&self) -> bool {
        match self.state {
            WordState::Acquiring => self.acquisition_box.is_some() && self.fsrs_card.is_none(),
            WordState::Learning | WordState::Known | WordState::Lapsed => {
                self.acquisition_box.is_none()
                    && self.fsrs_card.is_some()
                    && self.graduated_at.is_some()
            }
            WordState::Suspended => self.leech_suspended_at.is_some(),
            WordState::Encountered => {
                self.acquisition_box.is_none() && self.fsrs_card.is_none()
            }
        }
    }
}

/// Source tag for a sentence. §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceSource {
    LlmGenerated,
    BookOcr,
    StoryOcr,
    CourseImport,
}

impl SentenceSource {
    /// §4.6 scoring: "source_bonus rewards sentences from book/story sources
    /// over generic generated."
    pub fn source_bonus(&self) -> f64 {
        match self {
            SentenceSource::BookOcr | SentenceSource::StoryOcr => 1.25,
            SentenceSource::CourseImport => 1.1,
            SentenceSource::LlmGenerated => 1.0,
        }
    }
}

/// One token in a sentence. `lemma` is nullable only transiently — §3/§4.5:
/// an active sentence must have every token resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceToken {
    pub position: u16,
    pub surface: String,
    pub lemma: Option<LemmaId>,
}

/// §3. Attributes as enumerated in the spec's data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: SentenceId,
    pub text_diacritized: String,
    pub translation_en: String,
    pub tokens: Vec<SentenceToken>,
    pub active: bool,
    pub times_shown: u32,
    /// 1 to 4 target-word lemmas this sentence was generated to reinforce.
    pub target_words: Vec<LemmaId>,
    pub source: SentenceSource,
    pub page_number: Option<u32>,
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sentence {
    /// §3 invariant: every active sentence has every token resolved.
    pub fn all_tokens_resolved(&self) -> bool {
        self.tokens.iter().all(|t| t.lemma.is_some())
    }

    /// Non-target content tokens: the scaffold (§4.6, glossary).
    pub fn scaffold_lemmas(&self) -> Vec<LemmaId> {
        self.tokens
            .iter()
            .filter_map(|t| t.lemma)
            .filter(|l| !self.target_words.contains(l))
            .collect()
    }
}

/// Whether a review was recorded during the acquisition phase or against an
/// FSRS card. §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Acquisition,
    Fsrs,
}

/// §4.6: target words get `target` credit, other scaffold tokens get
/// `scaffold`, variant forms redirect to their canonical with
/// `variant_redirect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    Target,
    Scaffold,
    VariantRedirect,
}

/// A snapshot of the mutable fields of a `KnowledgeRecord` sufficient to
/// restore it exactly on undo (§4.4 `undo_last`, §8 undo law).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecordSnapshot {
    pub state: WordState,
    pub acquisition_box: Option<AcquisitionBox>,
    pub acquisition_next_due: Option<DateTime<Utc>>,
    pub acquisition_started_at: Option<DateTime<Utc>>,
    pub graduated_at: Option<DateTime<Utc>>,
    pub fsrs_card: Option<FsrsCard>,
    pub fsrs_due_at: Option<DateTime<Utc>>,
    pub times_seen: u32,
    pub times_correct: u32,
    pub leech_count: u32,
    pub leech_suspended_at: Option<DateTime<Utc>>,
    pub last_review_at: Option<DateTime<Utc>>,
}

impl From<&KnowledgeRecord> for KnowledgeRecordSnapshot {
    fn from(r: &KnowledgeRecord) -> Self {
        Self {
            state: r.state,
            acquisition_box: r.acquisition_box,
            acquisition_next_due: r.acquisition_next_due,
            acquisition_started_at: r.acquisition_started_at,
            graduated_at: r.graduated_at,
            fsrs_card: r.fsrs_card.clone(),
            fsrs_due_at: r.fsrs_due_at,
            times_seen: r.times_seen,
            times_correct: r.times_correct,
            leech_count: r.leech_count,
            leech_suspended_at: r.leech_suspended_at,
            last_review_at: r.last_review_at,
        }
    }
}

/// Immutable, append-only record of each review event. §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: ReviewLogId,
    pub lemma: LemmaId,
    pub rating: Rating,
    pub kind: SchedulerKind,
    pub pre_review_snapshot: KnowledgeRecordSnapshot,
    pub session_id: String,
    /// Client-supplied idempotency key, session-prefixed (§4.2, §6).
    pub client_review_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub credit_type: CreditType,
}

/// Cached result of the LLM variant oracle for an ordered lemma pair. §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantVerdict {
    Equivalent,
    Distinct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDecision {
    pub lemma_a: LemmaId,
    pub lemma_b: LemmaId,
    pub verdict: VariantVerdict,
    pub decided_at: DateTime<Utc>,
}

/// A session-returned review item: what the session builder hands back to
/// the client for one card (§4.6). Transient — the Session Builder produces
/// only objects like this, never durable state (§3 ownership rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionItem {
    pub sentence: SentenceId,
    pub target_words: Vec<LemmaId>,
    pub scaffold_words: Vec<LemmaId>,
    /// True if this exposure exists purely to satisfy acquisition
    /// repetition (§4.6 step 7) rather than due-coverage.
    pub is_acquisition_repetition: bool,
}

/// The ordered, bounded output of one session-builder call. §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub items: Vec<SessionItem>,
    pub created_at: DateTime<Utc>,
}

/// Global comprehension rating for a sentence, mapped to per-word ratings
/// per §4.6 / §9 open question (default policy; implementations may
/// reconfigure the mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComprehensionRating {
    Understood,
    Partial,
    NoIdea,
}

impl ComprehensionRating {
    pub fn default_word_rating(&self) -> Rating {
        match self {
            ComprehensionRating::Understood => Rating::Good,
            ComprehensionRating::Partial => Rating::Hard,
            ComprehensionRating::NoIdea => Rating::Again,
        }
    }
}

/// A client-submitted sentence review: a comprehension rating plus optional
/// per-word "missed" flags, routed to credit per token (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceReviewSubmission {
    pub sentence: SentenceId,
    pub session_id: String,
    pub client_review_id: String,
    pub comprehension: ComprehensionRating,
    pub missed_words: Vec<LemmaId>,
    pub submitted_at: DateTime<Utc>,
}

/// Classification used by the comprehensibility gate (§4.6 step 4) and the
/// Knowledge Store's comprehensibility-classification query (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComprehensibilityClass {
    KnownEnough,
    StillNew,
    Unknown,
}
