use anyhow::Result;
use clap::{Parser, Subcommand};

mod bootstrap;
mod import;
mod integrity;
mod material;
mod review;
mod session;
mod word;

use bootstrap::AppContext;

/// Alif CLI - operator tool for the Arabic vocabulary learning scheduler.
#[derive(Parser)]
#[command(name = "alif")]
#[command(about = "Alif CLI: session building, review submission, and material upkeep", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session-builder commands
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Review submission and undo
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Word lookup and manual state changes
    Word {
        #[command(subcommand)]
        command: WordCommands,
    },
    /// Sentence material pipeline
    Material {
        #[command(subcommand)]
        command: MaterialCommands,
    },
    /// Bulk ingest of tagged vocabulary and sentences
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Database integrity checks
    Integrity {
        /// Print every checked record, not just violations
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Build and print the next session
    Next,
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Submit a sentence-level comprehension review
    Submit {
        #[arg(long)]
        sentence_id: i64,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        client_review_id: String,
        /// understood | partial | no_idea
        #[arg(long)]
        comprehension: String,
        /// Lemma ids the learner flagged as missed, comma-separated
        #[arg(long, value_delimiter = ',')]
        missed: Vec<i64>,
    },
    /// Undo the last review for a lemma within a session
    Undo {
        #[arg(long)]
        lemma_id: i64,
        #[arg(long)]
        session_prefix: String,
    },
}

#[derive(Subcommand)]
enum WordCommands {
    /// Look up a lemma by its bare (diacritic-free) form
    Lookup { bare: String },
    /// Register a word as encountered without starting acquisition
    Encounter {
        bare: String,
        #[arg(long, default_value = "")]
        gloss: String,
        #[arg(long, default_value = "noun")]
        pos: String,
        /// book_import | story_import | course_import | frequency_list | sentence_generation
        #[arg(long)]
        source: String,
    },
    /// Manually suspend a word from scheduling
    Suspend { lemma_id: i64 },
}

#[derive(Subcommand)]
enum MaterialCommands {
    /// Run the rotate/cap/backfill/audit pipeline once
    Run {
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

#[derive(Subcommand)]
enum ImportCommands {
    /// Import a tab-separated word list
    Words {
        #[arg(long)]
        file: String,
        /// book_import | story_import | course_import | frequency_list
        #[arg(long)]
        source: String,
    },
    /// Import a tab-separated sentence list (book/story OCR, course import)
    Sentences {
        #[arg(long)]
        file: String,
        /// book_ocr | story_ocr | course_import
        #[arg(long)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Session { command } => {
            let ctx = AppContext::load().await?;
            match command {
                SessionCommands::Next => session::next(&ctx).await?,
            }
        }
        Commands::Review { command } => {
            let ctx = AppContext::load().await?;
            match command {
                ReviewCommands::Submit {
                    sentence_id,
                    session_id,
                    client_review_id,
                    comprehension,
                    missed,
                } => {
                    review::submit(
                        &ctx,
                        sentence_id,
                        &session_id,
                        &client_review_id,
                        &comprehension,
                        &missed,
                    )
                    .await?
                }
                ReviewCommands::Undo {
                    lemma_id,
                    session_prefix,
                } => review::undo(&ctx, lemma_id, &session_prefix).await?,
            }
        }
        Commands::Word { command } => {
            let ctx = AppContext::load().await?;
            match command {
                WordCommands::Lookup { bare } => word::lookup(&ctx, &bare).await?,
                WordCommands::Encounter {
                    bare,
                    gloss,
                    pos,
                    source,
                } => word::encounter(&ctx, &bare, &gloss, &pos, &source).await?,
                WordCommands::Suspend { lemma_id } => word::suspend(&ctx, lemma_id).await?,
            }
        }
        Commands::Material { command } => {
            let ctx = AppContext::load().await?;
            match command {
                MaterialCommands::Run { seed } => material::run(&ctx, seed).await?,
            }
        }
        Commands::Import { command } => {
            let ctx = AppContext::load().await?;
            match command {
                ImportCommands::Words { file, source } => import::words(&ctx, &file, &source).await?,
                ImportCommands::Sentences { file, source } => {
                    import::sentences(&ctx, &file, &source).await?
                }
            }
        }
        Commands::Integrity { verbose } => {
            let ctx = AppContext::load().await?;
            integrity::check(&ctx, verbose).await?
        }
    }

    Ok(())
}
