//! `granska verify` - audit chain verification.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use granska_core::ChainStatus;
use granska_persist::Store;

#[derive(Args)]
pub struct VerifyArgs {
    /// Export the verified log as JSON Lines to this path
    #[arg(long)]
    pub export: Option<PathBuf>,
}

pub async fn run(store: Store, args: VerifyArgs) -> Result<()> {
    match store.verify_audit().await? {
        ChainStatus::Intact { length } => {
            println!(
                "{} audit chain intact: {} entries",
                "ok".green().bold(),
                length
            );
        }
        ChainStatus::Broken { index, reason } => {
            println!(
                "{} audit chain BROKEN at entry {}: {}",
                "!!".red().bold(),
                index,
                reason
            );
            std::process::exit(2);
        }
    }

    if let Some(path) = args.export {
        let jsonl = store.export_audit_jsonl().await?;
        std::fs::write(&path, jsonl)?;
        println!("{} exported to {}", "ok".green().bold(), path.display());
    }
    Ok(())
}
