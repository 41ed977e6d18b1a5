//! `granska detect` - shell-network detection.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use granska_core::CoreConfig;
use granska_patterns::{detect, ShellNetworkParams};
use granska_persist::Store;

#[derive(Args)]
pub struct DetectArgs {
    /// Minimum qualifying companies per director
    #[arg(long)]
    pub min_companies: Option<usize>,

    /// Maximum employee count for a qualifying company
    #[arg(long)]
    pub max_employees: Option<i64>,

    /// Maximum revenue for a qualifying company
    #[arg(long)]
    pub max_revenue: Option<i64>,

    /// Include dissolved companies in the match
    #[arg(long)]
    pub include_dissolved: bool,

    /// Print full company lists instead of counts
    #[arg(long)]
    pub full: bool,
}

pub async fn run(store: Store, config: Arc<CoreConfig>, args: DetectArgs) -> Result<()> {
    let defaults = &config.shell_network;
    let params = ShellNetworkParams {
        min_companies: args.min_companies.unwrap_or(defaults.min_companies),
        max_employees: args.max_employees.unwrap_or(defaults.max_employees),
        max_revenue: args.max_revenue.unwrap_or(defaults.max_revenue),
        include_dissolved: args.include_dissolved || defaults.include_dissolved,
    };

    let matches = detect(&store, params).await?;
    if matches.is_empty() {
        println!("{} no shell networks matched", "ok".green().bold());
        return Ok(());
    }

    println!(
        "{} {} shell network(s) matched",
        "!".red().bold(),
        matches.len()
    );
    for m in &matches {
        println!(
            "  {} {} - {} companies, director risk {:.2}",
            m.director.to_string().dimmed(),
            m.director_name.bold(),
            m.match_size,
            m.director_risk
        );
        if args.full {
            for company in &m.companies {
                println!("      {company}");
            }
        }
    }
    Ok(())
}
