//! Explicitly passed configuration.
//!
//! One `CoreConfig` value travels through the resolver, derivation engine,
//! pattern engine, and driver. Defaults match the documented platform
//! defaults; a TOML file and `GRANSKA_`-prefixed environment variables can
//! override any field.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entity::EntityType;
use crate::provenance::SourceType;

/// Auto-accept and review-floor thresholds for one entity type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub auto: f64,
    pub review_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionThresholds {
    pub person: Thresholds,
    pub company: Thresholds,
    pub address: Thresholds,
}

impl Default for ResolutionThresholds {
    fn default() -> Self {
        Self {
            person: Thresholds {
                auto: 0.95,
                review_min: 0.60,
            },
            company: Thresholds {
                auto: 0.95,
                review_min: 0.60,
            },
            address: Thresholds {
                auto: 0.90,
                review_min: 0.50,
            },
        }
    }
}

impl ResolutionThresholds {
    pub fn for_type(&self, entity_type: EntityType) -> Thresholds {
        match entity_type {
            EntityType::Person | EntityType::Event => self.person,
            EntityType::Company => self.company,
            EntityType::Address => self.address,
        }
    }
}

/// Pairwise feature weights per entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonFeatureWeights {
    pub identifier_match: f64,
    pub name_jaro_winkler: f64,
    pub name_token_jaccard: f64,
    pub birth_year_match: f64,
    pub address_similarity: f64,
    pub network_overlap: f64,
}

impl Default for PersonFeatureWeights {
    fn default() -> Self {
        Self {
            identifier_match: 10.0,
            name_jaro_winkler: 2.0,
            name_token_jaccard: 1.5,
            birth_year_match: 1.5,
            address_similarity: 1.0,
            network_overlap: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyFeatureWeights {
    pub identifier_match: f64,
    pub name_jaro_winkler: f64,
    pub address_similarity: f64,
    pub director_overlap: f64,
}

impl Default for CompanyFeatureWeights {
    fn default() -> Self {
        Self {
            identifier_match: 10.0,
            name_jaro_winkler: 3.0,
            address_similarity: 1.5,
            director_overlap: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressFeatureWeights {
    pub postal_exact: f64,
    pub street_jaro_winkler: f64,
    pub number_exact: f64,
}

impl Default for AddressFeatureWeights {
    fn default() -> Self {
        Self {
            postal_exact: 3.0,
            street_jaro_winkler: 5.0,
            number_exact: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub person: PersonFeatureWeights,
    pub company: CompanyFeatureWeights,
    pub address: AddressFeatureWeights,
}

/// One row of the source-authority table. Lower level = higher authority.
/// A row with `predicate: None` applies to every predicate of the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityRule {
    pub source_type: SourceType,
    pub predicate: Option<String>,
    pub level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityTable {
    pub rules: Vec<AuthorityRule>,
}

impl Default for AuthorityTable {
    fn default() -> Self {
        Self {
            rules: vec![
                AuthorityRule {
                    source_type: SourceType::AuthoritativeRegistry,
                    predicate: None,
                    level: 1,
                },
                AuthorityRule {
                    source_type: SourceType::ManualEntry,
                    predicate: None,
                    level: 2,
                },
                AuthorityRule {
                    source_type: SourceType::DerivedComputation,
                    predicate: None,
                    level: 3,
                },
                AuthorityRule {
                    source_type: SourceType::Scrape,
                    predicate: None,
                    level: 4,
                },
            ],
        }
    }
}

impl AuthorityTable {
    /// Authority level for `(source, predicate)`; predicate-specific rows win
    pub fn level(&self, source: SourceType, predicate: &str) -> u8 {
        self.rules
            .iter()
            .filter(|r| r.source_type == source)
            .filter(|r| r.predicate.as_deref().map_or(true, |p| p == predicate))
            .min_by_key(|r| (r.predicate.is_none(), r.level))
            .map(|r| r.level)
            .unwrap_or(u8::MAX)
    }
}

/// Person risk factor weights and trigger thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonRiskConfig {
    pub many_directorships_weight: f64,
    pub many_directorships_min: usize,
    pub shell_company_director_weight: f64,
    pub high_velocity_network_weight: f64,
    pub high_velocity_min_per_year: f64,
    pub vulnerable_area_companies_weight: f64,
    pub dissolved_company_history_weight: f64,
    pub dissolved_company_min: usize,
    pub young_director_weight: f64,
    pub young_director_max_age: u32,
}

impl Default for PersonRiskConfig {
    fn default() -> Self {
        Self {
            many_directorships_weight: 0.20,
            many_directorships_min: 5,
            shell_company_director_weight: 0.30,
            high_velocity_network_weight: 0.20,
            high_velocity_min_per_year: 2.0,
            vulnerable_area_companies_weight: 0.15,
            dissolved_company_history_weight: 0.10,
            dissolved_company_min: 3,
            young_director_weight: 0.05,
            young_director_max_age: 25,
        }
    }
}

/// Company shell-indicator weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyRiskConfig {
    pub f_skatt_no_vat_weight: f64,
    pub generic_sni_weight: f64,
    pub generic_sni_prefixes: Vec<String>,
    pub no_employees_weight: f64,
    pub recently_formed_weight: f64,
    pub recently_formed_max_months: u32,
    pub single_director_weight: f64,
    pub no_revenue_weight: f64,
}

impl Default for CompanyRiskConfig {
    fn default() -> Self {
        Self {
            f_skatt_no_vat_weight: 0.25,
            generic_sni_weight: 0.20,
            generic_sni_prefixes: ["64", "66", "68", "70", "82"]
                .map(String::from)
                .to_vec(),
            no_employees_weight: 0.15,
            recently_formed_weight: 0.15,
            recently_formed_max_months: 24,
            single_director_weight: 0.10,
            no_revenue_weight: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSeverityBands {
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskSeverityBands {
    fn default() -> Self {
        Self {
            high: 0.60,
            medium: 0.40,
        }
    }
}

/// Nightly derivation schedule and budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// `rule_name@version` tag stamped on every derived fact of a run
    pub rule_version: String,
    /// Wall-clock budget for a full pass
    pub deadline_secs: u64,
    /// Disjoint entity partitions processed by the worker pool
    pub partitions: usize,
    /// Moving-average window for director velocity, months
    pub velocity_window_months: u32,
    /// Address becomes a registration hub at this many registered companies
    pub registration_hub_min_companies: usize,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            rule_version: "granska-derive@1".to_string(),
            deadline_secs: 4 * 3600,
            partitions: 8,
            velocity_window_months: 36,
            registration_hub_min_companies: 20,
        }
    }
}

/// Defaults for the parameterized shell-network query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellNetworkDefaults {
    pub min_companies: usize,
    pub max_employees: i64,
    pub max_revenue: i64,
    pub include_dissolved: bool,
}

impl Default for ShellNetworkDefaults {
    fn default() -> Self {
        Self {
            min_companies: 3,
            max_employees: 2,
            max_revenue: 500_000,
            include_dissolved: false,
        }
    }
}

/// Alert generation knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Director risk score at or above which the signal triggers
    pub director_risk_min: f64,
    pub healthcare_sni_prefixes: Vec<String>,
    /// Signals required to emit (healthcare+vulnerable always emits)
    pub min_signals: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            director_risk_min: 0.60,
            healthcare_sni_prefixes: ["86", "87", "88"].map(String::from).to_vec(),
            min_signals: 2,
        }
    }
}

/// Bounded retry with exponential backoff for CAS losers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_initial_ms: 50,
            backoff_multiplier: 2.0,
        }
    }
}

/// Query boundary limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Depth with the fast-path latency contract
    pub fast_depth: u32,
    pub max_nodes: usize,
    pub search_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            fast_depth: 2,
            max_nodes: 500,
            search_limit: 50,
        }
    }
}

/// The one configuration value passed through the core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub thresholds: ResolutionThresholds,
    pub weights: FeatureWeights,
    pub authority: AuthorityTable,
    pub person_risk: PersonRiskConfig,
    pub company_risk: CompanyRiskConfig,
    pub severity: RiskSeverityBands,
    pub derivation: DerivationConfig,
    pub shell_network: ShellNetworkDefaults,
    pub alerts: AlertConfig,
    pub retry: RetryConfig,
    pub query: QueryConfig,
}

impl CoreConfig {
    /// Layered load: defaults, then optional TOML file, then `GRANSKA_` env
    /// variables (`__` as the nesting separator).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(p) = path {
            builder = builder.add_source(config::File::from(p));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GRANSKA")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let c = CoreConfig::default();
        assert_eq!(c.thresholds.person.auto, 0.95);
        assert_eq!(c.thresholds.address.review_min, 0.50);
        assert_eq!(c.shell_network.min_companies, 3);
        assert_eq!(c.derivation.deadline_secs, 4 * 3600);
    }

    #[test]
    fn authority_prefers_predicate_specific_rows() {
        let mut table = AuthorityTable::default();
        table.rules.push(AuthorityRule {
            source_type: SourceType::Scrape,
            predicate: Some("DIRECTOR_OF".to_string()),
            level: 1,
        });
        assert_eq!(table.level(SourceType::Scrape, "DIRECTOR_OF"), 1);
        assert_eq!(table.level(SourceType::Scrape, "REGISTERED_AT"), 4);
        assert_eq!(table.level(SourceType::AuthoritativeRegistry, "DIRECTOR_OF"), 1);
    }

    #[test]
    fn thresholds_resolve_by_entity_type() {
        let t = ResolutionThresholds::default();
        assert_eq!(t.for_type(EntityType::Address).auto, 0.90);
        assert_eq!(t.for_type(EntityType::Company).auto, 0.95);
    }
}
