//! Shell-company indicators from current company attributes.

use chrono::{Months, NaiveDate};

use granska_core::{config::CompanyRiskConfig, Fact, FactBody, FactId, FactValue};

/// One triggered indicator with its configured weight
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub tag: &'static str,
    pub weight: f64,
}

/// Result of a shell scan over one company
#[derive(Debug, Clone, Default)]
pub struct ShellScan {
    pub indicators: Vec<Indicator>,
    /// Facts consulted, whether or not they triggered
    pub sources: Vec<FactId>,
}

impl ShellScan {
    pub fn tags(&self) -> Vec<String> {
        self.indicators.iter().map(|i| i.tag.to_string()).collect()
    }

    pub fn risk_sum(&self) -> f64 {
        self.indicators.iter().map(|i| i.weight).sum()
    }
}

fn attr<'a>(facts: &'a [Fact], predicate: &str) -> Option<(&'a Fact, &'a FactValue)> {
    facts.iter().find_map(|f| match &f.body {
        FactBody::Attribute {
            predicate: p,
            value,
        } if p == predicate => Some((f, value)),
        _ => None,
    })
}

/// Scan a company's current attribute facts plus its current inbound
/// director count for shell indicators.
pub fn scan(
    facts: &[Fact],
    director_count: usize,
    director_fact_ids: &[FactId],
    config: &CompanyRiskConfig,
    as_of: NaiveDate,
) -> ShellScan {
    let mut scan = ShellScan::default();

    let f_skatt = attr(facts, "F_SKATT");
    let vat = attr(facts, "VAT_REGISTERED");
    if let (Some((f1, FactValue::Boolean(true))), Some((f2, FactValue::Boolean(false)))) =
        (f_skatt, vat)
    {
        scan.indicators.push(Indicator {
            tag: "F_SKATT_NO_VAT",
            weight: config.f_skatt_no_vat_weight,
        });
        scan.sources.extend([f1.id, f2.id]);
    } else {
        if let Some((f, _)) = f_skatt {
            scan.sources.push(f.id);
        }
        if let Some((f, _)) = vat {
            scan.sources.push(f.id);
        }
    }

    if let Some((f, FactValue::Text(code))) = attr(facts, "SNI_CODE") {
        scan.sources.push(f.id);
        if config
            .generic_sni_prefixes
            .iter()
            .any(|p| code.starts_with(p.as_str()))
        {
            scan.indicators.push(Indicator {
                tag: "GENERIC_SNI",
                weight: config.generic_sni_weight,
            });
        }
    }

    if let Some((f, FactValue::Integer(n))) = attr(facts, "EMPLOYEE_COUNT") {
        scan.sources.push(f.id);
        if *n == 0 {
            scan.indicators.push(Indicator {
                tag: "NO_EMPLOYEES",
                weight: config.no_employees_weight,
            });
        }
    }

    if let Some((f, FactValue::Date(registered))) = attr(facts, "REGISTRATION_DATE") {
        scan.sources.push(f.id);
        let cutoff = as_of
            .checked_sub_months(Months::new(config.recently_formed_max_months))
            .unwrap_or(NaiveDate::MIN);
        if *registered >= cutoff {
            scan.indicators.push(Indicator {
                tag: "RECENTLY_FORMED",
                weight: config.recently_formed_weight,
            });
        }
    }

    if director_count == 1 {
        scan.indicators.push(Indicator {
            tag: "SINGLE_DIRECTOR",
            weight: config.single_director_weight,
        });
        scan.sources.extend_from_slice(director_fact_ids);
    }

    if let Some((f, FactValue::Integer(revenue))) = attr(facts, "REVENUE") {
        scan.sources.push(f.id);
        if *revenue == 0 {
            scan.indicators.push(Indicator {
                tag: "NO_REVENUE",
                weight: config.no_revenue_weight,
            });
        }
    }

    scan.sources.sort();
    scan.sources.dedup();
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use granska_core::{EntityId, ProvenanceId};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn attr_fact(predicate: &str, value: FactValue) -> Fact {
        Fact::attribute(
            EntityId::new(),
            predicate,
            value,
            day(2024, 1, 1),
            1.0,
            ProvenanceId::new(),
        )
    }

    #[test]
    fn fully_shell_company_triggers_everything() {
        let facts = vec![
            attr_fact("F_SKATT", FactValue::Boolean(true)),
            attr_fact("VAT_REGISTERED", FactValue::Boolean(false)),
            attr_fact("SNI_CODE", FactValue::Text("64190".into())),
            attr_fact("EMPLOYEE_COUNT", FactValue::Integer(0)),
            attr_fact("REVENUE", FactValue::Integer(0)),
            attr_fact("REGISTRATION_DATE", FactValue::Date(day(2025, 6, 1))),
        ];
        let director = granska_core::FactId::new();
        let scan = scan(
            &facts,
            1,
            &[director],
            &CompanyRiskConfig::default(),
            day(2026, 1, 1),
        );
        let tags = scan.tags();
        for expected in [
            "F_SKATT_NO_VAT",
            "GENERIC_SNI",
            "NO_EMPLOYEES",
            "RECENTLY_FORMED",
            "SINGLE_DIRECTOR",
            "NO_REVENUE",
        ] {
            assert!(tags.contains(&expected.to_string()), "missing {expected}");
        }
        // 0.25 + 0.20 + 0.15 + 0.15 + 0.10 + 0.15
        assert!((scan.risk_sum() - 1.0).abs() < 1e-9);
        assert!(scan.sources.contains(&director));
    }

    #[test]
    fn healthy_company_triggers_nothing() {
        let facts = vec![
            attr_fact("F_SKATT", FactValue::Boolean(true)),
            attr_fact("VAT_REGISTERED", FactValue::Boolean(true)),
            attr_fact("SNI_CODE", FactValue::Text("45200".into())),
            attr_fact("EMPLOYEE_COUNT", FactValue::Integer(42)),
            attr_fact("REVENUE", FactValue::Integer(12_000_000)),
            attr_fact("REGISTRATION_DATE", FactValue::Date(day(1998, 3, 1))),
        ];
        let scan = scan(
            &facts,
            3,
            &[],
            &CompanyRiskConfig::default(),
            day(2026, 1, 1),
        );
        assert!(scan.indicators.is_empty());
        assert!(!scan.sources.is_empty());
    }

    #[test]
    fn missing_attributes_trigger_nothing() {
        let scan = scan(&[], 0, &[], &CompanyRiskConfig::default(), day(2026, 1, 1));
        assert!(scan.indicators.is_empty());
        assert!(scan.sources.is_empty());
    }
}
