//! Sentence material pipeline command (§4.5).

use anyhow::Result;
use colored::*;

use crate::bootstrap::AppContext;

/// `material run --seed <n>`: runs the full rotate/cap/backfill/audit
/// pipeline once and prints the report.
pub async fn run(ctx: &AppContext, seed: u64) -> Result<()> {
    println!("{}", "Running material pipeline...".bright_cyan().bold());
    let report = ctx.material.run_pipeline(seed).await?;

    println!();
    println!("   {}: {}", "retired".dimmed(), report.retired);
    println!("   {}: {}", "generated".dimmed(), report.generated);
    println!("   {}: {}", "rejected".dimmed(), report.rejected);
    println!("   {}: {}", "mapped (active)".dimmed(), report.mapped_active);
    println!("   {}: {}", "mapped (dormant)".dimmed(), report.mapped_dormant);
    if report.errors_skipped > 0 {
        println!(
            "   {}: {}",
            "errors skipped".yellow(),
            report.errors_skipped
        );
    }
    Ok(())
}
