//! Provenance: where a datum came from and how it was extracted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::ids::{FactId, ProvenanceId};

/// Origin class of a datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Official registry (Bolagsverket, SCB, Skatteverket, Lantmäteriet)
    AuthoritativeRegistry,
    Scrape,
    ManualEntry,
    DerivedComputation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthoritativeRegistry => "AUTHORITATIVE_REGISTRY",
            Self::Scrape => "SCRAPE",
            Self::ManualEntry => "MANUAL_ENTRY",
            Self::DerivedComputation => "DERIVED_COMPUTATION",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of the origin and extraction of a datum.
/// Every fact, identifier, and mention references exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub id: ProvenanceId,
    pub source_type: SourceType,
    /// Source-local identifier (registry record id, scrape batch id, ...)
    pub source_id: String,
    pub url: Option<String>,
    pub document_hash: Option<Hash>,
    pub extraction_method: String,
    pub extracted_at: DateTime<Utc>,
    pub extractor_version: String,
    /// For DERIVED_COMPUTATION: the base facts the value was computed from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_facts: Vec<FactId>,
    /// For DERIVED_COMPUTATION: the producing rule, `name@version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation_rule: Option<String>,
}

impl Provenance {
    pub fn new(
        source_type: SourceType,
        source_id: impl Into<String>,
        extraction_method: impl Into<String>,
        extractor_version: impl Into<String>,
    ) -> Self {
        Self {
            id: ProvenanceId::new(),
            source_type,
            source_id: source_id.into(),
            url: None,
            document_hash: None,
            extraction_method: extraction_method.into(),
            extracted_at: Utc::now(),
            extractor_version: extractor_version.into(),
            source_facts: Vec::new(),
            derivation_rule: None,
        }
    }

    /// Provenance for a derivation-engine output
    pub fn derived(rule: impl Into<String>, source_facts: Vec<FactId>) -> Self {
        let rule = rule.into();
        let mut p = Self::new(
            SourceType::DerivedComputation,
            rule.clone(),
            "derivation",
            env!("CARGO_PKG_VERSION"),
        );
        p.source_facts = source_facts;
        p.derivation_rule = Some(rule);
        p
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_document_hash(mut self, hash: Hash) -> Self {
        self.document_hash = Some(hash);
        self
    }
}
