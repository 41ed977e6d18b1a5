//! `granska alerts` - list and acknowledge alerts.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use granska_core::AlertId;
use granska_persist::Store;

#[derive(Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Subcommand)]
pub enum AlertsCommand {
    /// List alerts, newest first
    List {
        /// Only unacknowledged alerts
        #[arg(long)]
        open: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Acknowledge an alert
    Ack {
        /// Alert id
        id: AlertId,

        /// Acting analyst
        #[arg(long)]
        actor: String,
    },
}

pub async fn run(store: Store, args: AlertsArgs) -> Result<()> {
    match args.command {
        AlertsCommand::List { open, limit } => {
            let filter = if open { Some(false) } else { None };
            let alerts = store.alerts(filter, limit).await?;
            if alerts.is_empty() {
                println!("{} no alerts", "ok".green().bold());
                return Ok(());
            }
            for alert in alerts {
                let marker = if alert.acknowledged {
                    "ack".dimmed()
                } else {
                    "open".red().bold()
                };
                let signals: Vec<&str> = alert.signals.iter().map(|s| s.name()).collect();
                println!(
                    "[{marker}] {} {} risk {:.2} ({})",
                    alert.id,
                    alert.entity.to_string().dimmed(),
                    alert.risk_score,
                    signals.join(", ")
                );
            }
        }
        AlertsCommand::Ack { id, actor } => {
            let alert = store.acknowledge_alert(id, &actor).await?;
            println!("{} alert {} acknowledged", "ok".green().bold(), alert.id);
        }
    }
    Ok(())
}
