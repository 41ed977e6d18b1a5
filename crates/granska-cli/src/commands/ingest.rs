//! `granska ingest` - load mention records from a JSON Lines file.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use granska_core::{
    CoreConfig, EntityType, IdentifierType, Mention, Provenance, SourceType,
};
use granska_persist::Store;
use granska_queue::{MemoryQueue, WorkerConfig};
use granska_runtime::Driver;

#[derive(Args)]
pub struct IngestArgs {
    /// JSON Lines file, one mention record per line
    pub file: PathBuf,

    /// Resolve the batch immediately after loading
    #[arg(long)]
    pub resolve: bool,
}

/// Adapter-facing mention record
#[derive(Debug, Deserialize)]
struct MentionRecord {
    mention_type: EntityType,
    surface_form: String,
    normalized_form: Option<String>,
    #[serde(default)]
    identifiers: Vec<IdentifierField>,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
    source_type: SourceType,
    source_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default = "default_method")]
    extraction_method: String,
    #[serde(default = "default_version")]
    extractor_version: String,
    #[serde(default)]
    document_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentifierField {
    id_type: IdentifierType,
    value: String,
}

fn default_method() -> String {
    "file_import".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl MentionRecord {
    fn into_pair(self) -> (Mention, Provenance) {
        let mut provenance = Provenance::new(
            self.source_type,
            self.source_id,
            self.extraction_method,
            self.extractor_version,
        );
        if let Some(url) = self.url {
            provenance = provenance.with_url(url);
        }

        let normalized = self
            .normalized_form
            .unwrap_or_else(|| self.surface_form.to_uppercase());
        let mut mention = Mention::new(
            self.mention_type,
            self.surface_form,
            normalized,
            provenance.id,
        );
        for identifier in self.identifiers {
            mention = mention.with_identifier(identifier.id_type, identifier.value);
        }
        for (key, value) in self.attributes {
            mention = mention.with_attribute(key, value);
        }
        mention.document_ref = self.document_ref;
        (mention, provenance)
    }
}

pub async fn run(store: Store, config: Arc<CoreConfig>, args: IngestArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    let mut batch = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: MentionRecord = serde_json::from_str(line)
            .with_context(|| format!("parsing line {}", line_no + 1))?;
        batch.push(record.into_pair());
    }

    let driver = Driver::new(
        store,
        config,
        Arc::new(MemoryQueue::new()),
        WorkerConfig::default(),
    );
    driver.init().await?;

    let loaded = driver.ingest(batch).await?;
    println!("{} {loaded} mentions loaded", "ok".green().bold());

    if args.resolve {
        driver.enqueue_resolution(loaded.max(1)).await?;
        driver.drain().await;
        let pending = driver.store().pending_mentions(1_000_000).await?.len();
        println!(
            "{} resolution complete, {pending} mentions awaiting review",
            "ok".green().bold()
        );
    }
    Ok(())
}
