//! Session-builder commands: fetches the next bounded review session.

use anyhow::Result;
use chrono::Utc;
use colored::*;

use crate::bootstrap::AppContext;

/// `session next`: builds one session via the full §4.6 pipeline and prints
/// each item with its sentence text.
pub async fn next(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();
    let session_id = format!("cli-{}", now.timestamp_millis());

    println!("{}", "Building session...".bright_cyan().bold());
    let session = ctx.session_builder.build_session(now, &session_id).await?;

    if session.items.is_empty() {
        println!("{}", "Nothing due right now.".yellow());
        return Ok(());
    }

    println!(
        "{} {} {}",
        "Session".bright_white().bold(),
        session.id.dimmed(),
        format!("({} items)", session.items.len()).green()
    );
    println!();

    for (i, item) in session.items.iter().enumerate() {
        let sentence = ctx.knowledge.get_sentence(item.sentence).await?;
        let marker = if item.is_acquisition_repetition {
            "repeat".yellow()
        } else {
            "review".green()
        };
        println!("{:>3}. [{}] sentence {}", i + 1, marker, item.sentence);
        if let Some(sentence) = sentence {
            println!("      {}", sentence.text_diacritized.bright_white());
            println!("      {}", sentence.translation_en.dimmed());
        }
        println!(
            "      targets: {}",
            item.target_words
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
