//! `granska resolve` - run a resolution batch over pending mentions.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use granska_core::CoreConfig;
use granska_persist::Store;
use granska_queue::{MemoryQueue, WorkerConfig};
use granska_runtime::Driver;

#[derive(Args)]
pub struct ResolveArgs {
    /// Maximum mentions to process in this batch
    #[arg(long, default_value_t = 1000)]
    pub limit: usize,
}

pub async fn run(store: Store, config: Arc<CoreConfig>, args: ResolveArgs) -> Result<()> {
    let driver = Driver::new(
        store,
        config,
        Arc::new(MemoryQueue::new()),
        WorkerConfig::default(),
    );
    driver.init().await?;

    let (summary, _) = driver
        .resolver()
        .resolve_pending_outcomes(args.limit)
        .await?;

    println!("{}", "resolution batch".bold());
    println!("  processed          {}", summary.processed);
    println!("  auto matched       {}", summary.auto_matched.to_string().green());
    println!("  queued for review  {}", summary.queued_for_review.to_string().yellow());
    println!("  new entities       {}", summary.new_entities);
    if summary.failed > 0 {
        println!("  failed             {}", summary.failed.to_string().red());
    }
    Ok(())
}
