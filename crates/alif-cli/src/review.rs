//! Review submission and undo commands.

use alif_core::{ComprehensionRating, KnowledgeRecord, LemmaId, SentenceId, SentenceReviewSubmission};
use anyhow::{bail, Result};
use chrono::Utc;
use colored::*;

use crate::bootstrap::AppContext;

fn parse_comprehension(s: &str) -> Result<ComprehensionRating> {
    Ok(match s {
        "understood" => ComprehensionRating::Understood,
        "partial" => ComprehensionRating::Partial,
        "no_idea" => ComprehensionRating::NoIdea,
        other => bail!("unknown comprehension rating '{other}'"),
    })
}

/// `review submit`: applies a sentence-level comprehension rating, routing
/// per-word credit to the acquisition or FSRS scheduler (§4.6).
#[allow(clippy::too_many_arguments)]
pub async fn submit(
    ctx: &AppContext,
    sentence_id: i64,
    session_id: &str,
    client_review_id: &str,
    comprehension: &str,
    missed: &[i64],
) -> Result<()> {
    let sentence_id = SentenceId(sentence_id);
    let Some(sentence) = ctx.knowledge.get_sentence(sentence_id).await? else {
        bail!("no sentence {sentence_id}");
    };

    let submission = SentenceReviewSubmission {
        sentence: sentence_id,
        session_id: session_id.to_string(),
        client_review_id: client_review_id.to_string(),
        comprehension: parse_comprehension(comprehension)?,
        missed_words: missed.iter().copied().map(LemmaId).collect(),
        submitted_at: Utc::now(),
    };

    ctx.session_builder
        .submit_sentence_review(&ctx.acquisition, &submission, &sentence)
        .await?;

    println!(
        "{} sentence {} ({} words reviewed)",
        "recorded".green().bold(),
        sentence_id,
        sentence.tokens.iter().filter(|t| t.lemma.is_some()).count()
    );
    Ok(())
}

/// `review undo`: restores the most recent review for `lemma` tagged with
/// `session_prefix` from its pre-review snapshot (§4.4 `undo_last`, §8 undo
/// law).
pub async fn undo(ctx: &AppContext, lemma_id: i64, session_prefix: &str) -> Result<()> {
    let lemma = LemmaId(lemma_id);
    let Some(log) = ctx
        .knowledge
        .last_review_for_session(lemma, session_prefix)
        .await?
    else {
        println!(
            "{}",
            format!("no review for lemma {lemma} under session prefix '{session_prefix}'").yellow()
        );
        return Ok(());
    };

    let Some(current) = ctx.knowledge.get_record(lemma).await? else {
        bail!("no knowledge record for lemma {lemma}");
    };

    let snapshot = log.pre_review_snapshot.clone();
    let restored = KnowledgeRecord {
        lemma: current.lemma,
        state: snapshot.state,
        acquisition_box: snapshot.acquisition_box,
        acquisition_next_due: snapshot.acquisition_next_due,
        acquisition_started_at: snapshot.acquisition_started_at,
        graduated_at: snapshot.graduated_at,
        fsrs_card: snapshot.fsrs_card,
        fsrs_due_at: snapshot.fsrs_due_at,
        times_seen: snapshot.times_seen,
        times_correct: snapshot.times_correct,
        leech_count: snapshot.leech_count,
        leech_suspended_at: snapshot.leech_suspended_at,
        last_review_at: snapshot.last_review_at,
        variant_stats: current.variant_stats,
        source: current.source,
    };

    ctx.knowledge.undo_review(log.id, &restored).await?;
    println!("{} last review for {}", "undone".yellow().bold(), lemma);
    Ok(())
}
