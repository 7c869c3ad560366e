//! # Break Lines
//!
//! Drivers are paid per shift hour but take an unpaid break on every shift.
//! Instead of shortening each ordinary line, one negative "unpaid break"
//! line is emitted per vehicle class.
//!
//! ```text
//! Tray  8.0h @ $85   ┐
//! Tray  9.5h @ $85   ┼─► Tray:  2 shifts × 0.5h = 1.0h → −1.0h @ $85
//! Crane 7.0h @ $110  ┘   Crane: 1 shift  × 0.5h = 0.5h → −0.5h @ $110
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::calculator::compute_line_amounts;
use crate::money::Money;
use crate::types::{LineDraft, LineKind, TaxMode, TaxStatus};

/// Category label used for the break line of a vehicle class.
pub fn break_category(vehicle_class: &str) -> String {
    format!("Unpaid break ({})", vehicle_class)
}

struct ClassGroup {
    shifts: i64,
    /// Rate of the first line seen for the class.
    rate: Money,
    last_date: NaiveDate,
}

/// Emits one break-deduction line per vehicle class present in `lines`.
///
/// Only ordinary lines count as shifts. Each class's total break is
/// `break_hours_per_shift × shift count`, priced at the class's first rate
/// with negative units. Returns nothing when the setting is `None` or zero.
/// Output is ordered by class label.
pub fn compute_break_lines(
    lines: &[LineDraft],
    break_hours_per_shift: Option<Decimal>,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
) -> Vec<LineDraft> {
    let per_shift = match break_hours_per_shift {
        Some(hours) if !hours.is_zero() => hours,
        _ => return Vec::new(),
    };

    let mut groups: BTreeMap<&str, ClassGroup> = BTreeMap::new();
    for line in lines.iter().filter(|l| l.kind.is_ordinary()) {
        groups
            .entry(line.category.as_str())
            .and_modify(|g| {
                g.shifts += 1;
                g.last_date = g.last_date.max(line.line_date);
            })
            .or_insert(ClassGroup {
                shifts: 1,
                rate: line.rate,
                last_date: line.line_date,
            });
    }

    groups
        .into_iter()
        .filter_map(|(class, group)| {
            let total_break = per_shift * Decimal::from(group.shifts);
            if total_break.is_zero() {
                return None;
            }
            let units = -total_break;
            Some(LineDraft {
                source_record_id: None,
                line_date: group.last_date,
                kind: LineKind::Break,
                category: break_category(class),
                units,
                rate: group.rate,
                amounts: compute_line_amounts(units, group.rate, tax_status, tax_mode),
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn shift(class: &str, day: u32, hours: Decimal, rate_cents: i64) -> LineDraft {
        let rate = Money::from_cents(rate_cents);
        LineDraft {
            source_record_id: Some(format!("rec-{}-{}", class, day)),
            line_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            kind: LineKind::Ordinary,
            category: class.to_string(),
            units: hours,
            rate,
            amounts: compute_line_amounts(hours, rate, TaxStatus::Registered, TaxMode::Exclusive),
        }
    }

    #[test]
    fn test_one_line_per_class() {
        let lines = vec![
            shift("Tray", 24, dec!(8), 8500),
            shift("Crane", 25, dec!(7), 11000),
            shift("Tray", 26, dec!(9.5), 8500),
        ];

        let breaks = compute_break_lines(
            &lines,
            Some(dec!(0.5)),
            TaxStatus::Registered,
            TaxMode::Exclusive,
        );

        assert_eq!(breaks.len(), 2);

        let crane = &breaks[0];
        assert_eq!(crane.category, "Unpaid break (Crane)");
        assert_eq!(crane.units, dec!(-0.5));
        assert_eq!(crane.amounts.ex_tax.cents(), -5500);

        let tray = &breaks[1];
        assert_eq!(tray.kind, LineKind::Break);
        assert_eq!(tray.units, dec!(-1.0));
        assert_eq!(tray.rate.cents(), 8500);
        assert_eq!(tray.amounts.ex_tax.cents(), -8500);
        assert_eq!(tray.amounts.tax.cents(), -850);
        assert_eq!(tray.line_date, NaiveDate::from_ymd_opt(2024, 6, 26).unwrap());
        assert!(tray.source_record_id.is_none());
    }

    #[test]
    fn test_representative_rate_is_first_seen() {
        let lines = vec![shift("Tray", 24, dec!(8), 8000), shift("Tray", 25, dec!(8), 9000)];
        let breaks = compute_break_lines(
            &lines,
            Some(dec!(1)),
            TaxStatus::NotRegistered,
            TaxMode::Exclusive,
        );
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].rate.cents(), 8000);
        assert_eq!(breaks[0].amounts.inc_tax.cents(), -16000);
    }

    #[test]
    fn test_no_lines_when_setting_absent_or_zero() {
        let lines = vec![shift("Tray", 24, dec!(8), 8500)];
        assert!(compute_break_lines(&lines, None, TaxStatus::Registered, TaxMode::Exclusive)
            .is_empty());
        assert!(compute_break_lines(
            &lines,
            Some(Decimal::ZERO),
            TaxStatus::Registered,
            TaxMode::Exclusive
        )
        .is_empty());
    }

    #[test]
    fn test_synthetic_lines_are_not_shifts() {
        let mut levy = shift("Fuel levy", 30, dec!(1), 4844);
        levy.kind = LineKind::FuelLevy;
        let lines = vec![shift("Tray", 24, dec!(8), 8500), levy];

        let breaks = compute_break_lines(
            &lines,
            Some(dec!(0.5)),
            TaxStatus::Registered,
            TaxMode::Exclusive,
        );
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].units, dec!(-0.5));
    }

    #[test]
    fn test_empty_input() {
        assert!(
            compute_break_lines(&[], Some(dec!(0.5)), TaxStatus::Registered, TaxMode::Exclusive)
                .is_empty()
        );
    }
}
