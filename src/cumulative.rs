use crate::answers::Vector84;
use crate::fiscal;
use crate::models::{IdentityKey, Report};

/// Fiscal-year-to-date total for `target`: every other report of the same
/// institution earlier in the same fiscal year, plus `target_answers`.
///
/// Only the target is recomputed. Later months of the same fiscal year keep
/// whatever cumulative they were written with.
pub fn compute_cumulative(history: &[Report], target: &IdentityKey, target_answers: &Vector84) -> Vector84 {
    let mut total = Vector84::zeros();

    if let Some(fy) = fiscal::fiscal_year_start(target.year(), target.month()) {
        for report in history.iter().filter(|r| counts_toward(r, target, fy)) {
            total.add(&report.answers);
        }
    }

    total.add(target_answers);
    total
}

fn counts_toward(report: &Report, target: &IdentityKey, fy: i32) -> bool {
    if report.district != target.district() || report.institution != target.institution() {
        return false;
    }
    if report.month.is_empty() || report.year.is_empty() {
        return false;
    }
    if report.month == target.month() && report.year == target.year() {
        return false;
    }

    fiscal::fiscal_year_start(&report.year, &report.month) == Some(fy)
        && fiscal::on_or_before_within_year(&report.month, &report.year, target.month(), target.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{write_stamp, ReportPayload};

    fn report(institution: &str, month: &str, year: &str, fill: f64) -> Report {
        let key = IdentityKey::new("North", institution, month, year).unwrap();
        Report::build(
            &key,
            ReportPayload {
                answers: Vector84::filled(fill),
                ..ReportPayload::default()
            },
            write_stamp(),
        )
    }

    fn key(month: &str, year: &str) -> IdentityKey {
        IdentityKey::new("North", "Clinic", month, year).unwrap()
    }

    #[test]
    fn sums_earlier_months_of_the_fiscal_year() {
        let history = vec![report("Clinic", "April", "2024", 10.0)];
        let total = compute_cumulative(&history, &key("May", "2024"), &Vector84::filled(5.0));
        assert_eq!(total, Vector84::filled(15.0));
    }

    #[test]
    fn next_fiscal_year_starts_from_zero() {
        let history = vec![
            report("Clinic", "April", "2024", 10.0),
            report("Clinic", "May", "2024", 5.0),
        ];
        let total = compute_cumulative(&history, &key("April", "2025"), &Vector84::filled(1.0));
        assert_eq!(total, Vector84::filled(1.0));
    }

    #[test]
    fn target_month_is_not_double_counted() {
        let history = vec![
            report("Clinic", "April", "2024", 10.0),
            report("Clinic", "May", "2024", 99.0),
        ];
        let total = compute_cumulative(&history, &key("May", "2024"), &Vector84::filled(5.0));
        assert_eq!(total, Vector84::filled(15.0));
    }

    #[test]
    fn later_months_and_other_institutions_are_ignored() {
        let history = vec![
            report("Clinic", "April", "2024", 1.0),
            report("Clinic", "June", "2024", 50.0),
            report("Other", "April", "2024", 70.0),
        ];
        let total = compute_cumulative(&history, &key("May", "2024"), &Vector84::filled(2.0));
        assert_eq!(total, Vector84::filled(3.0));
    }

    #[test]
    fn january_to_march_belong_to_the_previous_fiscal_year() {
        let history = vec![
            report("Clinic", "April", "2024", 1.0),
            report("Clinic", "December", "2024", 2.0),
            report("Clinic", "January", "2025", 3.0),
            report("Clinic", "March", "2024", 100.0),
        ];
        let total = compute_cumulative(&history, &key("February", "2025"), &Vector84::filled(4.0));
        assert_eq!(total, Vector84::filled(10.0));
    }

    #[test]
    fn unparseable_year_contributes_only_its_own_answers() {
        let history = vec![report("Clinic", "April", "FY24", 10.0)];
        let total = compute_cumulative(&history, &key("May", "FY24"), &Vector84::filled(5.0));
        assert_eq!(total, Vector84::filled(5.0));
    }
}
