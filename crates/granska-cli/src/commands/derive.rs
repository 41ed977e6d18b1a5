//! `granska derive` - run a derivation pass.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use granska_core::CoreConfig;
use granska_derive::{CancelFlag, DerivationEngine};
use granska_persist::Store;

#[derive(Args)]
pub struct DeriveArgs {}

pub async fn run(store: Store, config: Arc<CoreConfig>, _args: DeriveArgs) -> Result<()> {
    let engine = DerivationEngine::new(store, config);
    let cancel = CancelFlag::new();

    // Ctrl-C checkpoints the run instead of killing it
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested, committing checkpoint...");
            signal_cancel.cancel();
        }
    });

    let report = engine.run(&cancel).await?;

    println!("{} ({})", "derivation run".bold(), report.rule_version);
    println!("  entities processed {}", report.entities_processed);
    println!("  facts written      {}", report.facts_written.to_string().green());
    println!("  facts unchanged    {}", report.facts_unchanged);
    println!("  elapsed            {:.1}s", report.elapsed.as_secs_f64());
    if report.cancelled {
        println!("  {}", "cancelled at checkpoint; re-run to resume".yellow());
    }
    Ok(())
}
