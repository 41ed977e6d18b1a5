//! Real-time risk alerts emitted on new registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AlertId, EntityId};

/// A triggered risk signal contributing to an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum AlertSignal {
    /// Highest risk score among the company's directors
    HighRiskDirector { director: EntityId, risk_score: f64 },
    /// Registered address lies in a vulnerable area
    VulnerableArea { level: i64 },
    /// Registered address hosts an anomalous number of companies
    RegistrationHub { address: EntityId },
    /// Healthcare-sector SNI combined with a vulnerable area
    HealthcareInVulnerableArea { sni_code: String },
}

impl AlertSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HighRiskDirector { .. } => "high_risk_director",
            Self::VulnerableArea { .. } => "vulnerable_area",
            Self::RegistrationHub { .. } => "registration_hub",
            Self::HealthcareInVulnerableArea { .. } => "healthcare_in_vulnerable_area",
        }
    }
}

/// An unacknowledged-by-default alert tied to an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub entity: EntityId,
    pub alert_type: String,
    pub signals: Vec<AlertSignal>,
    /// Combined risk score in [0, 1]
    pub risk_score: f64,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        entity: EntityId,
        alert_type: impl Into<String>,
        signals: Vec<AlertSignal>,
        risk_score: f64,
    ) -> Self {
        Self {
            id: AlertId::new(),
            entity,
            alert_type: alert_type.into(),
            signals,
            risk_score: risk_score.clamp(0.0, 1.0),
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }
}
