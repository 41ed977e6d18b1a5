//! `granska metrics` - resolver accuracy against ground truth.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use granska_persist::Store;
use granska_resolve::ValidationHarness;

#[derive(Args)]
pub struct MetricsArgs {
    /// Specificity target
    #[arg(long, default_value_t = 0.995)]
    pub min_specificity: f64,

    /// Sensitivity target
    #[arg(long, default_value_t = 0.90)]
    pub min_sensitivity: f64,
}

pub async fn run(store: Store, args: MetricsArgs) -> Result<()> {
    let report = ValidationHarness::new(store).evaluate().await?;

    println!("{}", "resolver accuracy".bold());
    println!(
        "  specificity  {:.4} (target {:.3})",
        report.specificity(),
        args.min_specificity
    );
    println!(
        "  sensitivity  {:.4} (target {:.3})",
        report.sensitivity(),
        args.min_sensitivity
    );
    println!(
        "  tp {} / fp {} / tn {} / fn {} / skipped {}",
        report.true_positives,
        report.false_positives,
        report.true_negatives,
        report.false_negatives,
        report.skipped
    );

    if report.meets_targets(args.min_specificity, args.min_sensitivity) {
        println!("{} targets met", "ok".green().bold());
    } else {
        println!("{} targets missed", "!!".red().bold());
        std::process::exit(1);
    }
    Ok(())
}
