use std::collections::HashMap;

use alif_core::{
    AcquisitionBox, CreditType, FsrsCard, KnowledgeRecord, KnowledgeRecordSnapshot, LemmaId,
    Rating, ReviewLog, ReviewLogId, SchedulerKind, SentenceSource, VariantStats, VariantVerdict,
    WordSource, WordState,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;

use crate::error::{Result, StorageError};

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

pub fn state_str(state: WordState) -> &'static str {
    match state {
        WordState::Encountered => "encountered",
        WordState::Acquiring => "acquiring",
        WordState::Learning => "learning",
        WordState::Known => "known",
        WordState::Lapsed => "lapsed",
        WordState::Suspended => "suspended",
    }
}

pub fn parse_state(s: &str) -> Result<WordState> {
    Ok(match s {
        "encountered" => WordState::Encountered,
        "acquiring" => WordState::Acquiring,
        "learning" => WordState::Learning,
        "known" => WordState::Known,
        "lapsed" => WordState::Lapsed,
        "suspended" => WordState::Suspended,
        other => return Err(StorageError::InvalidRow(format!("unknown state '{other}'"))),
    })
}

pub fn box_str(b: AcquisitionBox) -> &'static str {
    match b {
        AcquisitionBox::Box1 => "1",
        AcquisitionBox::Box2 => "2",
        AcquisitionBox::Box3 => "3",
    }
}

fn parse_box(s: &str) -> Result<AcquisitionBox> {
    Ok(match s {
        "1" => AcquisitionBox::Box1,
        "2" => AcquisitionBox::Box2,
        "3" => AcquisitionBox::Box3,
        other => return Err(StorageError::InvalidRow(format!("unknown box '{other}'"))),
    })
}

pub fn source_str(s: WordSource) -> &'static str {
    match s {
        WordSource::BookImport => "book_import",
        WordSource::StoryImport => "story_import",
        WordSource::CourseImport => "course_import",
        WordSource::FrequencyList => "frequency_list",
        WordSource::SentenceGeneration => "sentence_generation",
    }
}

fn parse_source(s: &str) -> Result<WordSource> {
    Ok(match s {
        "book_import" => WordSource::BookImport,
        "story_import" => WordSource::StoryImport,
        "course_import" => WordSource::CourseImport,
        "frequency_list" => WordSource::FrequencyList,
        "sentence_generation" => WordSource::SentenceGeneration,
        other => return Err(StorageError::InvalidRow(format!("unknown source '{other}'"))),
    })
}

pub fn rating_str(r: Rating) -> &'static str {
    match r {
        Rating::Again => "again",
        Rating::Hard => "hard",
        Rating::Good => "good",
        Rating::Easy => "easy",
    }
}

fn parse_rating(s: &str) -> Result<Rating> {
    Ok(match s {
        "again" => Rating::Again,
        "hard" => Rating::Hard,
        "good" => Rating::Good,
        "easy" => Rating::Easy,
        other => return Err(StorageError::InvalidRow(format!("unknown rating '{other}'"))),
    })
}

pub fn kind_str(k: SchedulerKind) -> &'static str {
    match k {
        SchedulerKind::Acquisition => "acquisition",
        SchedulerKind::Fsrs => "fsrs",
    }
}

fn parse_kind(s: &str) -> Result<SchedulerKind> {
    Ok(match s {
        "acquisition" => SchedulerKind::Acquisition,
        "fsrs" => SchedulerKind::Fsrs,
        other => return Err(StorageError::InvalidRow(format!("unknown scheduler kind '{other}'"))),
    })
}

pub fn credit_str(c: CreditType) -> &'static str {
    match c {
        CreditType::Target => "target",
        CreditType::Scaffold => "scaffold",
        CreditType::VariantRedirect => "variant_redirect",
    }
}

fn parse_credit(s: &str) -> Result<CreditType> {
    Ok(match s {
        "target" => CreditType::Target,
        "scaffold" => CreditType::Scaffold,
        "variant_redirect" => CreditType::VariantRedirect,
        other => return Err(StorageError::InvalidRow(format!("unknown credit type '{other}'"))),
    })
}

pub fn sentence_source_str(s: SentenceSource) -> &'static str {
    match s {
        SentenceSource::LlmGenerated => "llm_generated",
        SentenceSource::BookOcr => "book_ocr",
        SentenceSource::StoryOcr => "story_ocr",
        SentenceSource::CourseImport => "course_import",
    }
}

fn parse_sentence_source(s: &str) -> Result<SentenceSource> {
    Ok(match s {
        "llm_generated" => SentenceSource::LlmGenerated,
        "book_ocr" => SentenceSource::BookOcr,
        "story_ocr" => SentenceSource::StoryOcr,
        "course_import" => SentenceSource::CourseImport,
        other => return Err(StorageError::InvalidRow(format!("unknown sentence source '{other}'"))),
    })
}

pub fn verdict_str(v: VariantVerdict) -> &'static str {
    match v {
        VariantVerdict::Equivalent => "equivalent",
        VariantVerdict::Distinct => "distinct",
    }
}

fn parse_verdict(s: &str) -> Result<VariantVerdict> {
    Ok(match s {
        "equivalent" => VariantVerdict::Equivalent,
        "distinct" => VariantVerdict::Distinct,
        other => return Err(StorageError::InvalidRow(format!("unknown verdict '{other}'"))),
    })
}

#[derive(FromRow)]
pub struct KnowledgeRecordRow {
    pub lemma_id: i64,
    pub state: String,
    pub acquisition_box: Option<String>,
    pub acquisition_next_due: Option<i64>,
    pub acquisition_started_at: Option<i64>,
    pub graduated_at: Option<i64>,
    pub fsrs_stability: Option<f64>,
    pub fsrs_difficulty: Option<f64>,
    pub fsrs_last_retrievability: Option<f64>,
    pub fsrs_due_at: Option<i64>,
    pub times_seen: i64,
    pub times_correct: i64,
    pub leech_count: i64,
    pub leech_suspended_at: Option<i64>,
    pub last_review_at: Option<i64>,
    pub variant_stats: String,
    pub source: String,
}

impl KnowledgeRecordRow {
    pub fn into_domain(self) -> Result<KnowledgeRecord> {
        let fsrs_card = match (self.fsrs_stability, self.fsrs_difficulty, self.fsrs_last_retrievability) {
            (Some(stability), Some(difficulty), Some(last_retrievability)) => Some(FsrsCard {
                stability,
                difficulty,
                last_retrievability,
            }),
            _ => None,
        };
        Ok(KnowledgeRecord {
            lemma: LemmaId(self.lemma_id),
            state: parse_state(&self.state)?,
            acquisition_box: self.acquisition_box.as_deref().map(parse_box).transpose()?,
            acquisition_next_due: self.acquisition_next_due.map(from_millis),
            acquisition_started_at: self.acquisition_started_at.map(from_millis),
            graduated_at: self.graduated_at.map(from_millis),
            fsrs_card,
            fsrs_due_at: self.fsrs_due_at.map(from_millis),
            times_seen: self.times_seen as u32,
            times_correct: self.times_correct as u32,
            leech_count: self.leech_count as u32,
            leech_suspended_at: self.leech_suspended_at.map(from_millis),
            last_review_at: self.last_review_at.map(from_millis),
            variant_stats: serde_json::from_str::<VariantStats>(&self.variant_stats)
                .unwrap_or_default(),
            source: parse_source(&self.source)?,
        })
    }
}

/// Parameters bound to the `knowledge_records` upsert statement, grounded
/// in the teacher's pattern of binding a flattened row rather than the
/// domain struct directly.
pub struct KnowledgeRecordParams<'a> {
    pub lemma_id: i64,
    pub state: &'a str,
    pub acquisition_box: Option<&'static str>,
    pub acquisition_next_due: Option<i64>,
    pub acquisition_started_at: Option<i64>,
    pub graduated_at: Option<i64>,
    pub fsrs_stability: Option<f64>,
    pub fsrs_difficulty: Option<f64>,
    pub fsrs_last_retrievability: Option<f64>,
    pub fsrs_due_at: Option<i64>,
    pub times_seen: i64,
    pub times_correct: i64,
    pub leech_count: i64,
    pub leech_suspended_at: Option<i64>,
    pub last_review_at: Option<i64>,
    pub variant_stats: String,
    pub source: &'static str,
}

pub fn record_params(record: &KnowledgeRecord) -> Result<KnowledgeRecordParams<'_>> {
    Ok(KnowledgeRecordParams {
        lemma_id: record.lemma.0,
        state: state_str(record.state),
        acquisition_box: record.acquisition_box.map(box_str),
        acquisition_next_due: record.acquisition_next_due.map(to_millis),
        acquisition_started_at: record.acquisition_started_at.map(to_millis),
        graduated_at: record.graduated_at.map(to_millis),
        fsrs_stability: record.fsrs_card.as_ref().map(|c| c.stability),
        fsrs_difficulty: record.fsrs_card.as_ref().map(|c| c.difficulty),
        fsrs_last_retrievability: record.fsrs_card.as_ref().map(|c| c.last_retrievability),
        fsrs_due_at: record.fsrs_due_at.map(to_millis),
        times_seen: record.times_seen as i64,
        times_correct: record.times_correct as i64,
        leech_count: record.leech_count as i64,
        leech_suspended_at: record.leech_suspended_at.map(to_millis),
        last_review_at: record.last_review_at.map(to_millis),
        variant_stats: serde_json::to_string(&record.variant_stats)?,
        source: source_str(record.source),
    })
}

#[derive(FromRow)]
pub struct ReviewLogRow {
    pub id: i64,
    pub lemma_id: i64,
    pub rating: String,
    pub kind: String,
    pub pre_review_snapshot: String,
    pub session_id: String,
    pub client_review_id: String,
    pub reviewed_at: i64,
    pub credit_type: String,
}

impl ReviewLogRow {
    pub fn into_domain(self) -> Result<ReviewLog> {
        Ok(ReviewLog {
            id: ReviewLogId(self.id),
            lemma: LemmaId(self.lemma_id),
            rating: parse_rating(&self.rating)?,
            kind: parse_kind(&self.kind)?,
            pre_review_snapshot: serde_json::from_str::<KnowledgeRecordSnapshot>(
                &self.pre_review_snapshot,
            )
            .map_err(|e| StorageError::InvalidRow(e.to_string()))?,
            session_id: self.session_id,
            client_review_id: self.client_review_id,
            reviewed_at: from_millis(self.reviewed_at),
            credit_type: parse_credit(&self.credit_type)?,
        })
    }
}

pub fn review_log_params(log: &ReviewLog) -> Result<(i64, &'static str, &'static str, String, &str, &str, i64, &'static str)> {
    Ok((
        log.lemma.0,
        rating_str(log.rating),
        kind_str(log.kind),
        serde_json::to_string(&log.pre_review_snapshot)?,
        log.session_id.as_str(),
        log.client_review_id.as_str(),
        to_millis(log.reviewed_at),
        credit_str(log.credit_type),
    ))
}

#[derive(FromRow)]
pub struct SentenceRow {
    pub id: i64,
    pub text_diacritized: String,
    pub translation_en: String,
    pub active: i64,
    pub times_shown: i64,
    pub source: String,
    pub page_number: Option<i64>,
    pub audio_ref: Option<String>,
    pub created_at: i64,
}

#[derive(FromRow)]
pub struct SentenceTokenRow {
    pub sentence_id: i64,
    pub position: i64,
    pub surface: String,
    pub lemma_id: Option<i64>,
}

#[derive(FromRow)]
pub struct VariantDecisionRow {
    pub lemma_a: i64,
    pub lemma_b: i64,
    pub verdict: String,
    pub decided_at: i64,
}

impl VariantDecisionRow {
    pub fn verdict(&self) -> Result<VariantVerdict> {
        parse_verdict(&self.verdict)
    }
}

pub fn sentence_source_params(s: SentenceSource) -> &'static str {
    sentence_source_str(s)
}

pub fn parse_sentence_source_str(s: &str) -> Result<SentenceSource> {
    parse_sentence_source(s)
}

pub fn to_millis_pub(t: DateTime<Utc>) -> i64 {
    to_millis(t)
}

pub fn from_millis_pub(ms: i64) -> DateTime<Utc> {
    from_millis(ms)
}

pub type VariantStatsRaw = HashMap<String, u32>;
