//! Streaming alert generation for newly registered companies.

use tracing::{debug, info};

use granska_core::{
    derived, Actor, Alert, AlertSignal, CoreConfig, CoreResult, EntityId, FactValue,
    RelationshipPredicate,
};
use granska_persist::{Direction, Store};

use crate::shell_network::risk_score_of;

/// Computes risk-signal vectors and persists alerts
#[derive(Clone, Debug)]
pub struct AlertEngine {
    store: Store,
    config: std::sync::Arc<CoreConfig>,
}

impl AlertEngine {
    pub fn new(store: Store, config: std::sync::Arc<CoreConfig>) -> Self {
        Self { store, config }
    }

    /// Evaluate one company's signal vector; emits and persists an alert
    /// when at least `min_signals` trigger, or unconditionally on the
    /// healthcare-in-vulnerable-area combination.
    pub async fn scan_company(&self, company: EntityId) -> CoreResult<Option<Alert>> {
        let mut signals = Vec::new();
        let mut max_director_risk = 0.0f64;

        // Highest-risk director over inbound DIRECTOR_OF edges
        let directors = self
            .store
            .neighbors(
                company,
                Some(&[RelationshipPredicate::DirectorOf]),
                Direction::Incoming,
                None,
            )
            .await?;
        for edge in &directors {
            let risk = risk_score_of(&self.store, edge.neighbor).await?;
            if risk > max_director_risk {
                max_director_risk = risk;
            }
            if risk >= self.config.alerts.director_risk_min {
                signals.push(AlertSignal::HighRiskDirector {
                    director: edge.neighbor,
                    risk_score: risk,
                });
            }
        }
        // Keep at most the strongest director signal
        signals.sort_by(|a, b| signal_strength(b).total_cmp(&signal_strength(a)));
        signals.truncate(1);

        // Registered address: vulnerability and hub flags
        let mut vulnerable_level: Option<i64> = None;
        let registrations = self
            .store
            .neighbors(
                company,
                Some(&[RelationshipPredicate::RegisteredAt]),
                Direction::Outgoing,
                None,
            )
            .await?;
        for edge in &registrations {
            let address = edge.neighbor;
            for fact in self
                .store
                .current_facts(address, Some("VULNERABLE_AREA_LEVEL"))
                .await?
            {
                if let Some(FactValue::Integer(level)) = fact.body.value() {
                    if *level >= 1 {
                        vulnerable_level = Some((*level).max(vulnerable_level.unwrap_or(0)));
                    }
                }
            }
            for fact in self
                .store
                .current_facts(address, Some(derived::REGISTRATION_HUB))
                .await?
            {
                if fact.body.value() == Some(&FactValue::Boolean(true)) {
                    signals.push(AlertSignal::RegistrationHub { address });
                }
            }
        }
        if let Some(level) = vulnerable_level {
            signals.push(AlertSignal::VulnerableArea { level });
        }

        // Healthcare SNI combined with a vulnerable area always alerts
        let mut healthcare = false;
        if vulnerable_level.is_some() {
            for fact in self.store.current_facts(company, Some("SNI_CODE")).await? {
                if let Some(FactValue::Text(code)) = fact.body.value() {
                    if self
                        .config
                        .alerts
                        .healthcare_sni_prefixes
                        .iter()
                        .any(|p| code.starts_with(p.as_str()))
                    {
                        healthcare = true;
                        signals.push(AlertSignal::HealthcareInVulnerableArea {
                            sni_code: code.clone(),
                        });
                        break;
                    }
                }
            }
        }

        if signals.len() < self.config.alerts.min_signals && !healthcare {
            debug!(company = %company, signals = signals.len(), "below alert threshold");
            return Ok(None);
        }

        let company_risk = risk_score_of(&self.store, company).await?;
        let combined = company_risk.max(max_director_risk);
        let alert = Alert::new(company, "NEW_REGISTRATION", signals, combined);
        let alert = self.store.create_alert(alert, Actor::System).await?;
        info!(company = %company, alert = %alert.id, risk = combined, "alert emitted");
        Ok(Some(alert))
    }

    /// Scan a batch of companies (driver fan-out on new registrations)
    pub async fn scan_companies(&self, companies: &[EntityId]) -> CoreResult<Vec<Alert>> {
        let mut emitted = Vec::new();
        for company in companies {
            if let Some(alert) = self.scan_company(*company).await? {
                emitted.push(alert);
            }
        }
        Ok(emitted)
    }
}

fn signal_strength(signal: &AlertSignal) -> f64 {
    match signal {
        AlertSignal::HighRiskDirector { risk_score, .. } => *risk_score,
        _ => 0.0,
    }
}
