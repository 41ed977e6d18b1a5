//! Director velocity: directorship-change events per year, smoothed over a
//! moving window.

use chrono::{Months, NaiveDate};

use granska_core::Fact;

/// Count appointment (`valid_from`) and termination (`valid_to`) events
/// falling inside the window ending at `as_of`.
pub fn change_events(facts: &[&Fact], window_months: u32, as_of: NaiveDate) -> usize {
    let window_start = as_of
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(NaiveDate::MIN);

    let mut events = 0usize;
    for fact in facts {
        if fact.superseded_by.is_some() {
            continue;
        }
        if fact.valid_from >= window_start && fact.valid_from <= as_of {
            events += 1;
        }
        if let Some(end) = fact.valid_to {
            if end >= window_start && end <= as_of {
                events += 1;
            }
        }
    }
    events
}

/// Events per 12 months, averaged across the window
pub fn per_year(events: usize, window_months: u32) -> f64 {
    if window_months == 0 {
        return 0.0;
    }
    events as f64 * 12.0 / f64::from(window_months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use granska_core::{EntityId, FactValue, ProvenanceId, RelationshipPredicate};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn directorship(from: NaiveDate, to: Option<NaiveDate>) -> Fact {
        Fact::relationship(
            EntityId::new(),
            RelationshipPredicate::DirectorOf,
            EntityId::new(),
            from,
            1.0,
            ProvenanceId::new(),
        )
        .with_valid_to(to)
    }

    #[test]
    fn counts_starts_and_ends_in_window() {
        let as_of = day(2026, 1, 1);
        let facts = vec![
            // Appointment and termination inside the window: 2 events
            directorship(day(2024, 3, 1), Some(day(2025, 3, 1))),
            // Appointment long before, termination inside: 1 event
            directorship(day(2019, 1, 1), Some(day(2024, 6, 1))),
            // Entirely before the window: 0 events
            directorship(day(2018, 1, 1), Some(day(2019, 1, 1))),
            // Open-ended appointment inside the window: 1 event
            directorship(day(2025, 10, 1), None),
        ];
        let refs: Vec<&Fact> = facts.iter().collect();
        assert_eq!(change_events(&refs, 36, as_of), 4);
    }

    #[test]
    fn superseded_facts_are_ignored() {
        let as_of = day(2026, 1, 1);
        let mut fact = directorship(day(2025, 1, 1), None);
        fact.superseded_by = Some(granska_core::FactId::new());
        let facts = vec![&fact];
        assert_eq!(change_events(&facts, 36, as_of), 0);
    }

    #[test]
    fn per_year_normalizes_over_window() {
        // 6 events across 36 months = 2 per year
        assert!((per_year(6, 36) - 2.0).abs() < 1e-9);
        assert_eq!(per_year(0, 36), 0.0);
    }

    #[test]
    fn change_events_counts_dates_of_whatever_facts_it_is_given() {
        // Callers are responsible for selecting DIRECTOR_OF facts
        let attr = Fact::attribute(
            EntityId::new(),
            "EMPLOYEE_COUNT",
            FactValue::Integer(0),
            day(2025, 6, 1),
            1.0,
            ProvenanceId::new(),
        );
        let refs: Vec<&Fact> = vec![&attr];
        assert_eq!(change_events(&refs, 36, day(2026, 1, 1)), 1);
    }
}
