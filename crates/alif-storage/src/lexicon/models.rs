use std::collections::HashMap;

use alif_core::{CefrBand, Lemma, LemmaId, PartOfSpeech, Root, RootId, WordCategory};
use sqlx::FromRow;

use crate::error::{Result, StorageError};

#[derive(FromRow)]
pub struct RootRow {
    pub id: i64,
    pub radicals: String,
    pub gloss: String,
}

impl RootRow {
    pub fn into_domain(self) -> Root {
        Root {
            id: RootId(self.id),
            radicals: self.radicals.chars().collect(),
            gloss: self.gloss,
        }
    }
}

#[derive(FromRow)]
pub struct LemmaRow {
    pub id: i64,
    pub bare: String,
    pub diacritized: Option<String>,
    pub pos: String,
    pub root_id: Option<i64>,
    pub gloss: String,
    pub frequency_rank: Option<i64>,
    pub cefr_band: Option<String>,
    pub category: String,
    pub inflected_forms: String,
    pub canonical_lemma_id: Option<i64>,
}

impl LemmaRow {
    pub fn into_domain(self) -> Result<Lemma> {
        Ok(Lemma {
            id: LemmaId(self.id),
            bare: self.bare,
            diacritized: self.diacritized,
            pos: parse_pos(&self.pos)?,
            root: self.root_id.map(RootId),
            gloss: self.gloss,
            frequency_rank: self.frequency_rank.map(|r| r as u32),
            cefr_band: self.cefr_band.as_deref().map(parse_cefr).transpose()?,
            category: parse_category(&self.category)?,
            inflected_forms: serde_json::from_str::<HashMap<String, String>>(&self.inflected_forms)
                .unwrap_or_default(),
            canonical_lemma: self.canonical_lemma_id.map(LemmaId),
        })
    }
}

pub fn pos_str(pos: PartOfSpeech) -> &'static str {
    match pos {
        PartOfSpeech::Noun => "noun",
        PartOfSpeech::Verb => "verb",
        PartOfSpeech::Adjective => "adjective",
        PartOfSpeech::Adverb => "adverb",
        PartOfSpeech::Preposition => "preposition",
        PartOfSpeech::Conjunction => "conjunction",
        PartOfSpeech::Particle => "particle",
        PartOfSpeech::Pronoun => "pronoun",
        PartOfSpeech::ProperNoun => "proper_noun",
        PartOfSpeech::Other => "other",
    }
}

fn parse_pos(s: &str) -> Result<PartOfSpeech> {
    Ok(match s {
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
        other => return Err(StorageError::InvalidRow(format!("unknown pos '{other}'"))),
    })
}

pub fn category_str(category: WordCategory) -> &'static str {
    match category {
        WordCategory::Standard => "standard",
        WordCategory::ProperName => "proper_name",
        WordCategory::Onomatopoeia => "onomatopoeia",
        WordCategory::Junk => "junk",
    }
}

fn parse_category(s: &str) -> Result<WordCategory> {
    Ok(match s {
        "standard" => WordCategory::Standard,
        "proper_name" => WordCategory::ProperName,
        "onomatopoeia" => WordCategory::Onomatopoeia,
        "junk" => WordCategory::Junk,
        other => return Err(StorageError::InvalidRow(format!("unknown category '{other}'"))),
    })
}

pub fn cefr_str(band: CefrBand) -> &'static str {
    match band {
        CefrBand::A1 => "A1",
        CefrBand::A2 => "A2",
        CefrBand::B1 => "B1",
        CefrBand::B2 => "B2",
        CefrBand::C1 => "C1",
        CefrBand::C2 => "C2",
    }
}

fn parse_cefr(s: &str) -> Result<CefrBand> {
    Ok(match s {
        "A1" => CefrBand::A1,
        "A2" => CefrBand::A2,
        "B1" => CefrBand::B1,
        "B2" => CefrBand::B2,
        "C1" => CefrBand::C1,
        "C2" => CefrBand::C2,
        other => return Err(StorageError::InvalidRow(format!("unknown CEFR band '{other}'"))),
    })
}
