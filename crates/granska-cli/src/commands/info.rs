//! `granska info` - effective configuration and store statistics.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use granska_core::{CoreConfig, EntityType};
use granska_persist::Store;

#[derive(Args)]
pub struct InfoArgs {
    /// Dump the full effective configuration as JSON
    #[arg(long)]
    pub full_config: bool,
}

pub async fn run(store: Store, config: Arc<CoreConfig>, args: InfoArgs) -> Result<()> {
    println!("{} {}", "granska".bold(), env!("CARGO_PKG_VERSION"));

    println!("\n{}", "store".bold());
    for entity_type in [
        EntityType::Person,
        EntityType::Company,
        EntityType::Address,
        EntityType::Event,
    ] {
        let count = store.count_entities(Some(entity_type)).await?;
        println!("  {:<10} {count}", entity_type.as_str().to_lowercase());
    }
    let pending = store.pending_mentions(1_000_000).await?.len();
    println!("  pending mentions {pending}");
    let open_alerts = store.alerts(Some(false), 1_000_000).await?.len();
    println!("  open alerts      {open_alerts}");

    println!("\n{}", "thresholds".bold());
    for (name, t) in [
        ("person", config.thresholds.person),
        ("company", config.thresholds.company),
        ("address", config.thresholds.address),
    ] {
        println!("  {name:<8} auto {:.2}  review {:.2}", t.auto, t.review_min);
    }
    println!(
        "\n{} every field overridable via GRANSKA__* or --config",
        "config".bold()
    );
    println!(
        "  derivation {} / deadline {}s / {} partitions",
        config.derivation.rule_version,
        config.derivation.deadline_secs,
        config.derivation.partitions
    );

    if args.full_config {
        println!("\n{}", serde_json::to_string_pretty(config.as_ref())?);
    }
    Ok(())
}
