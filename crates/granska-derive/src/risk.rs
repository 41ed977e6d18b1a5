//! Risk assessments from configured factor-weight tables.

use serde::{Deserialize, Serialize};

use granska_core::{
    config::{PersonRiskConfig, RiskSeverityBands},
    FactId, FactValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_score(score: f64, bands: &RiskSeverityBands) -> Self {
        if score >= bands.high {
            Self::High
        } else if score >= bands.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A triggered risk factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub weight: f64,
}

/// Final assessment written as the `RISK_SCORE` fact value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub severity: Severity,
    pub risk_factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    pub fn new(factors: Vec<RiskFactor>, bands: &RiskSeverityBands) -> Self {
        let score: f64 = factors.iter().map(|f| f.weight).sum::<f64>().min(1.0);
        Self {
            score,
            severity: Severity::from_score(score, bands),
            risk_factors: factors,
        }
    }

    /// Stored form: a JSON attribute value so factors ride with the score
    pub fn to_fact_value(&self) -> FactValue {
        FactValue::Json(serde_json::to_value(self).unwrap_or(serde_json::Value::Null))
    }
}

/// Inputs the engine gathers for one person
#[derive(Debug, Clone, Default)]
pub struct PersonRiskInputs {
    pub active_directorships: usize,
    pub shell_company_count: usize,
    /// Average directorship-change velocity across the person's companies
    pub network_velocity_per_year: f64,
    pub vulnerable_area_companies: usize,
    pub dissolved_company_count: usize,
    pub age_years: Option<u32>,
    /// Facts consulted while gathering the inputs
    pub sources: Vec<FactId>,
}

/// Evaluate the person factor table
pub fn person_assessment(
    inputs: &PersonRiskInputs,
    config: &PersonRiskConfig,
    bands: &RiskSeverityBands,
) -> RiskAssessment {
    let mut factors = Vec::new();

    if inputs.active_directorships > config.many_directorships_min {
        factors.push(RiskFactor {
            name: "many_directorships".into(),
            weight: config.many_directorships_weight,
        });
    }
    if inputs.shell_company_count > 0 {
        factors.push(RiskFactor {
            name: "shell_company_director".into(),
            weight: config.shell_company_director_weight,
        });
    }
    if inputs.network_velocity_per_year > config.high_velocity_min_per_year {
        factors.push(RiskFactor {
            name: "high_velocity_network".into(),
            weight: config.high_velocity_network_weight,
        });
    }
    if inputs.vulnerable_area_companies > 0 {
        factors.push(RiskFactor {
            name: "vulnerable_area_companies".into(),
            weight: config.vulnerable_area_companies_weight,
        });
    }
    if inputs.dissolved_company_count > config.dissolved_company_min {
        factors.push(RiskFactor {
            name: "dissolved_company_history".into(),
            weight: config.dissolved_company_history_weight,
        });
    }
    if let Some(age) = inputs.age_years {
        if age < config.young_director_max_age && inputs.active_directorships > 0 {
            factors.push(RiskFactor {
                name: "young_director".into(),
                weight: config.young_director_weight,
            });
        }
    }

    RiskAssessment::new(factors, bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> RiskSeverityBands {
        RiskSeverityBands::default()
    }

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_score(0.65, &bands()), Severity::High);
        assert_eq!(Severity::from_score(0.60, &bands()), Severity::High);
        assert_eq!(Severity::from_score(0.45, &bands()), Severity::Medium);
        assert_eq!(Severity::from_score(0.10, &bands()), Severity::Low);
    }

    #[test]
    fn nominee_director_profile_scores_high() {
        let inputs = PersonRiskInputs {
            active_directorships: 9,
            shell_company_count: 4,
            network_velocity_per_year: 3.5,
            vulnerable_area_companies: 0,
            dissolved_company_count: 5,
            age_years: Some(23),
            sources: vec![],
        };
        let assessment = person_assessment(&inputs, &PersonRiskConfig::default(), &bands());
        // 0.20 + 0.30 + 0.20 + 0.10 + 0.05
        assert!((assessment.score - 0.85).abs() < 1e-9);
        assert_eq!(assessment.severity, Severity::High);
        assert_eq!(assessment.risk_factors.len(), 5);
    }

    #[test]
    fn clean_person_scores_zero() {
        let inputs = PersonRiskInputs {
            active_directorships: 1,
            age_years: Some(45),
            ..Default::default()
        };
        let assessment = person_assessment(&inputs, &PersonRiskConfig::default(), &bands());
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.severity, Severity::Low);
        assert!(assessment.risk_factors.is_empty());
    }

    #[test]
    fn thresholds_are_strict_inequalities() {
        let config = PersonRiskConfig::default();
        // Exactly 5 directorships is not "many" (>5)
        let at_limit = PersonRiskInputs {
            active_directorships: 5,
            age_years: Some(40),
            ..Default::default()
        };
        let assessment = person_assessment(&at_limit, &config, &bands());
        assert!(assessment.risk_factors.is_empty());

        // Exactly 3 dissolved companies is not a history (>3)
        let dissolved = PersonRiskInputs {
            dissolved_company_count: 3,
            age_years: Some(40),
            ..Default::default()
        };
        assert!(person_assessment(&dissolved, &config, &bands())
            .risk_factors
            .is_empty());
    }

    #[test]
    fn young_director_requires_a_directorship() {
        let not_director = PersonRiskInputs {
            active_directorships: 0,
            age_years: Some(20),
            ..Default::default()
        };
        assert!(
            person_assessment(&not_director, &PersonRiskConfig::default(), &bands())
                .risk_factors
                .is_empty()
        );
    }
}
