//! Word-level inspection and maintenance commands: lookup, manual encounter
//! registration, and leech/manual suspension.

use alif_core::{
    KnowledgeRecord, Lemma, LemmaId, PartOfSpeech, WordCategory, WordSource, WordState,
};
use anyhow::{bail, Result};
use chrono::Utc;
use colored::*;
use std::collections::HashMap;

use crate::bootstrap::AppContext;

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

pub fn parse_word_source(s: &str) -> Result<WordSource> {
    Ok(match s {
        "book_import" => WordSource::BookImport,
        "story_import" => WordSource::StoryImport,
        "course_import" => WordSource::CourseImport,
        "frequency_list" => WordSource::FrequencyList,
        "sentence_generation" => WordSource::SentenceGeneration,
        other => bail!("unknown word source '{other}'"),
    })
}

/// `word lookup <bare>`: prints the lemma's lexicon entry and, if a
/// knowledge record exists, its current scheduling state.
pub async fn lookup(ctx: &AppContext, bare: &str) -> Result<()> {
    let Some(lemma) = ctx.lexicon.find_lemma_by_bare(bare).await? else {
        println!("{}", format!("no lemma found for '{bare}'").yellow());
        return Ok(());
    };
    print_lemma(&lemma);

    match ctx.knowledge.get_record(lemma.id).await? {
        Some(record) => print_record(&record),
        None => println!("   {}", "not yet encountered".dimmed()),
    }
    Ok(())
}

fn print_lemma(lemma: &Lemma) {
    println!(
        "{} {} ({:?})",
        "lemma".bright_cyan().bold(),
        lemma.bare.bright_white().bold(),
        lemma.pos
    );
    println!("   id: {}", lemma.id);
    println!("   gloss: {}", lemma.gloss);
    if let Some(canonical) = lemma.canonical_lemma {
        println!("   {}: {}", "variant of".yellow(), canonical);
    }
}

fn print_record(record: &KnowledgeRecord) {
    println!("   state: {:?}", record.state);
    match record.acquisition_box {
        Some(b) => println!("   acquisition box: {b:?}"),
        None => {}
    }
    if let Some(card) = &record.fsrs_card {
        println!(
            "   fsrs: stability={:.2} difficulty={:.2}",
            card.stability, card.difficulty
        );
    }
    println!(
        "   seen {} times, {:.0}% correct",
        record.times_seen,
        record.accuracy() * 100.0
    );
    if record.leech_count > 0 {
        println!("   {} leech events: {}", "⚠".yellow(), record.leech_count);
    }
}

/// `word encounter <bare> --gloss --pos --source`: registers a word as
/// known-to-exist (§3 `encountered` state) without starting acquisition,
/// creating the lemma in the lexicon if it isn't already there.
pub async fn encounter(
    ctx: &AppContext,
    bare: &str,
    gloss: &str,
    pos: &str,
    source: &str,
) -> Result<()> {
    let source = parse_word_source(source)?;
    let lemma_id = match ctx.lexicon.find_lemma_by_bare(bare).await? {
        Some(existing) => existing.id,
        None => {
            let lemma = Lemma {
                id: LemmaId(0),
                bare: bare.to_string(),
                diacritized: None,
                pos: parse_pos(pos)?,
                root: None,
                gloss: gloss.to_string(),
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
        println!("{} {} ({})", "encountered".green().bold(), bare, lemma_id);
    } else {
        println!(
            "{}",
            format!("'{bare}' already has a knowledge record").yellow()
        );
    }
    Ok(())
}

/// `word suspend <lemma_id>`: manually suspends a word from scheduling,
/// mirroring the leech cooldown's terminal state (§4.4).
pub async fn suspend(ctx: &AppContext, lemma_id: i64) -> Result<()> {
    let lemma = LemmaId(lemma_id);
    let Some(mut record) = ctx.knowledge.get_record(lemma).await? else {
        bail!("no knowledge record for lemma {lemma}");
    };
    record.state = WordState::Suspended;
    record.leech_suspended_at = Some(Utc::now());
    ctx.knowledge.upsert_record(&record).await?;
    println!("{} {}", "suspended".red().bold(), lemma);
    Ok(())
}
