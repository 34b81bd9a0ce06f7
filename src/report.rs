use std::fmt::Write;

use crate::fiscal;
use crate::models::Report;

/// Markdown summary of one report: the month's non-zero slots against the
/// fiscal-year-to-date totals.
pub fn build_summary(report: &Report) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Monthly Report: {}", report.institution);
    let _ = writeln!(
        output,
        "{} district, {} {}",
        report.district, report.month, report.year
    );
    let fiscal_year = fiscal::fiscal_year_start(&report.year, &report.month)
        .and_then(|start| start.checked_add(1).map(|end| (start, end)));
    if let Some((start, end)) = fiscal_year {
        let _ = writeln!(output, "Fiscal year {}-{}", start, end);
    }
    let _ = writeln!(output, "Last updated {}", report.updated_at.to_rfc3339());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Answers");

    let mut slots: Vec<usize> = report
        .answers
        .non_zero()
        .chain(report.cumulative.non_zero())
        .map(|(slot, _)| slot)
        .collect();
    slots.sort_unstable();
    slots.dedup();

    if slots.is_empty() {
        let _ = writeln!(output, "No answers recorded for this month.");
    } else {
        let _ = writeln!(output, "| Question | Month | Year to date |");
        let _ = writeln!(output, "|---|---:|---:|");
        for slot in slots {
            let _ = writeln!(
                output,
                "| q{} | {} | {} |",
                slot,
                report.answers.get(slot),
                report.cumulative.get(slot)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attachments");
    let _ = writeln!(output, "- Eye bank entries: {}", report.eye_bank.len());
    let _ = writeln!(output, "- Vision center entries: {}", report.vision_center.len());

    output
}
