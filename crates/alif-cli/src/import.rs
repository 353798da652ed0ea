//! Bulk ingest commands: tagged vocabulary lists and externally-sourced
//! sentences (book/story OCR, course import), mirroring the teacher's
//! `import_cbor` pattern of reading a local file straight into storage.

use std::collections::HashMap;
use std::fs;

use alif_core::{KnowledgeRecord, Lemma, LemmaId, PartOfSpeech, SentenceSource, WordCategory};
use anyhow::{bail, Context, Result};
use colored::*;

use crate::bootstrap::AppContext;
use crate::word::parse_word_source;

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
        other => bail!("unknown part of speech '{other}'"),
    })
}

fn parse_sentence_source(s: &str) -> Result<SentenceSource> {
    Ok(match s {
        "book_ocr" => SentenceSource::BookOcr,
        "story_ocr" => SentenceSource::StoryOcr,
        "course_import" => SentenceSource::CourseImport,
        "llm_generated" => SentenceSource::LlmGenerated,
        other => bail!("unknown sentence source '{other}'"),
    })
}

/// `import words --file <path> --source <tag>`: one word per line, tab
/// separated as `bare\tgloss\tpos` (pos optional, defaults to noun).
pub async fn words(ctx: &AppContext, file: &str, source: &str) -> Result<()> {
    let source = parse_word_source(source)?;
    let contents = fs::read_to_string(file).with_context(|| format!("reading {file}"))?;

    let mut created = 0;
    let mut skipped = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split('\t');
        let Some(bare) = parts.next() else { continue };
        let gloss = parts.next().unwrap_or("").to_string();
        let pos = parts.next().map(parse_pos).transpose()?.unwrap_or(PartOfSpeech::Noun);

        let lemma_id = match ctx.lexicon.find_lemma_by_bare(bare).await? {
            Some(existing) => existing.id,
            None => {
                let lemma = Lemma {
                    id: LemmaId(0),
                    bare: bare.to_string(),
                    diacritized: None,
                    pos,
                    root: None,
                    gloss,
                    frequency_rank: None,
                    cefr_band: None,
                    category: WordCategory::Standard,
                    inflected_forms: HashMap::new(),
                    canonical_lemma: None,
                };
                ctx.lexicon.insert_lemma(&lemma).await?
            }
        };

        if ctx.knowledge.get_record(lemma_id).await?.is_none() {
            let record = KnowledgeRecord::new_encountered(lemma_id, source);
            ctx.knowledge.upsert_record(&record).await?;
            created += 1;
        } else {
            skipped += 1;
        }
    }

    println!(
        "{} {} words encountered, {} already known",
        "imported".green().bold(),
        created,
        skipped
    );
    Ok(())
}

/// `import sentences --file <path> --source <tag>`: one sentence per line,
/// tab separated as `text_diacritized\ttranslation_en\tpage_number`
/// (page_number optional).
pub async fn sentences(ctx: &AppContext, file: &str, source: &str) -> Result<()> {
    let source = parse_sentence_source(source)?;
    let contents = fs::read_to_string(file).with_context(|| format!("reading {file}"))?;

    let mut active = 0;
    let mut dormant = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split('\t');
        let Some(text) = parts.next() else { continue };
        let translation = parts.next().unwrap_or("");
        let page_number = parts.next().and_then(|p| p.parse::<u32>().ok());

        let id = ctx
            .material
            .ingest_external_sentence(text, translation, source, page_number)
            .await?;
        match ctx.knowledge.get_sentence(id).await? {
            Some(s) if s.active => active += 1,
            _ => dormant += 1,
        }
    }

    println!(
        "{} {} active, {} dormant (unresolved tokens)",
        "imported".green().bold(),
        active,
        dormant
    );
    Ok(())
}
