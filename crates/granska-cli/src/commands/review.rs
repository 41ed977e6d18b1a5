//! `granska review` - work the human review queue.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::sync::Arc;

use granska_core::{CoreConfig, DecisionId, EntityId, ReviewVerdict};
use granska_persist::Store;
use granska_resolve::{BlockingIndex, Resolver, ReviewQueue};

#[derive(Args)]
pub struct ReviewArgs {
    #[command(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Subcommand)]
pub enum ReviewCommand {
    /// List queued decisions with candidate breakdowns
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Confirm a candidate match
    Match {
        /// Decision id
        decision: DecisionId,

        /// Chosen candidate entity id
        entity: EntityId,

        /// Reviewer signature
        #[arg(long)]
        reviewer: String,
    },
    /// Reject all candidates (creates a fresh entity)
    Reject {
        /// Decision id
        decision: DecisionId,

        /// Reviewer signature
        #[arg(long)]
        reviewer: String,
    },
}

async fn queue(store: Store, config: Arc<CoreConfig>) -> Result<ReviewQueue> {
    let index = Arc::new(BlockingIndex::rebuild(&store).await?);
    Ok(ReviewQueue::new(Resolver::new(store, index, config)))
}

pub async fn run(store: Store, config: Arc<CoreConfig>, args: ReviewArgs) -> Result<()> {
    let queue = queue(store, config).await?;

    match args.command {
        ReviewCommand::List { limit } => {
            let decisions = queue.list(limit).await?;
            if decisions.is_empty() {
                println!("{} review queue is empty", "ok".green().bold());
                return Ok(());
            }
            for decision in decisions {
                println!(
                    "{} mention {} ({})",
                    decision.id.to_string().bold(),
                    decision.mention,
                    decision.mention_type
                );
                for candidate in &decision.candidates {
                    let features: Vec<String> = candidate
                        .features
                        .iter()
                        .map(|f| format!("{}={:.2}", f.name, f.value))
                        .collect();
                    println!(
                        "    {} score {:.3} [{}]",
                        candidate.entity,
                        candidate.score,
                        features.join(", ")
                    );
                }
            }
        }
        ReviewCommand::Match {
            decision,
            entity,
            reviewer,
        } => {
            queue
                .submit(decision, ReviewVerdict::HumanMatch { entity }, &reviewer)
                .await?;
            println!("{} matched to {entity}", "ok".green().bold());
        }
        ReviewCommand::Reject { decision, reviewer } => {
            let reviewed = queue
                .submit(decision, ReviewVerdict::HumanReject, &reviewer)
                .await?;
            println!(
                "{} rejected, outcome {:?}",
                "ok".green().bold(),
                reviewed.outcome
            );
        }
    }
    Ok(())
}
