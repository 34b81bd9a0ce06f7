use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FiscalMonth {
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
    January,
    February,
    March,
}

impl FiscalMonth {
    pub const ALL: [FiscalMonth; 12] = [
        FiscalMonth::April,
        FiscalMonth::May,
        FiscalMonth::June,
        FiscalMonth::July,
        FiscalMonth::August,
        FiscalMonth::September,
        FiscalMonth::October,
        FiscalMonth::November,
        FiscalMonth::December,
        FiscalMonth::January,
        FiscalMonth::February,
        FiscalMonth::March,
    ];

    /// Position in the fiscal year, April = 0 .. March = 11.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FiscalMonth::April => "April",
            FiscalMonth::May => "May",
            FiscalMonth::June => "June",
            FiscalMonth::July => "July",
            FiscalMonth::August => "August",
            FiscalMonth::September => "September",
            FiscalMonth::October => "October",
            FiscalMonth::November => "November",
            FiscalMonth::December => "December",
            FiscalMonth::January => "January",
            FiscalMonth::February => "February",
            FiscalMonth::March => "March",
        }
    }

    /// January to March close the fiscal year opened the previous calendar year.
    pub fn closes_fiscal_year(self) -> bool {
        matches!(
            self,
            FiscalMonth::January | FiscalMonth::February | FiscalMonth::March
        )
    }

    /// Calendar month number (1-12) to its fiscal position.
    pub fn from_calendar(month: u32) -> Option<FiscalMonth> {
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(FiscalMonth::ALL[((month + 2) % 12) as usize])
    }

    pub fn parse(label: &str) -> Option<FiscalMonth> {
        let lowered = label.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        if let Some(month) = FiscalMonth::ALL
            .iter()
            .find(|m| m.name().to_lowercase() == lowered)
        {
            return Some(*month);
        }

        let mut prefixed = FiscalMonth::ALL
            .iter()
            .filter(|m| m.name().to_lowercase().starts_with(&lowered));
        if let (Some(month), None) = (prefixed.next(), prefixed.next()) {
            return Some(*month);
        }

        if lowered.len() <= 2 && lowered.chars().all(|c| c.is_ascii_digit()) {
            return lowered.parse().ok().and_then(FiscalMonth::from_calendar);
        }

        None
    }
}

impl fmt::Display for FiscalMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical month name for `label`, or `label` itself when it names no month.
pub fn canonicalize(label: &str) -> String {
    match FiscalMonth::parse(label) {
        Some(month) => month.name().to_string(),
        None => label.to_string(),
    }
}

/// Fiscal year (labeled by its start year) that `month` of calendar `year` falls in.
/// `None` when the year is not numeric or the fiscal year falls outside `i32`.
pub fn fiscal_year_start(year: &str, month: &str) -> Option<i32> {
    let year: i32 = year.trim().parse().ok()?;
    match FiscalMonth::parse(month) {
        Some(m) if m.closes_fiscal_year() => year.checked_sub(1),
        _ => Some(year),
    }
}

/// Total order over (month, year): earlier fiscal year first, then fiscal month order.
/// Unparseable years or months never compare as on-or-before.
pub fn on_or_before(a_month: &str, a_year: &str, b_month: &str, b_year: &str) -> bool {
    let (Some(a_fy), Some(b_fy)) = (
        fiscal_year_start(a_year, a_month),
        fiscal_year_start(b_year, b_month),
    ) else {
        return false;
    };

    if a_fy != b_fy {
        return a_fy < b_fy;
    }

    match (FiscalMonth::parse(a_month), FiscalMonth::parse(b_month)) {
        (Some(a), Some(b)) => a.index() <= b.index(),
        _ => false,
    }
}

/// Like [`on_or_before`], restricted to a single fiscal year: months in different
/// fiscal years are never on-or-before each other.
pub fn on_or_before_within_year(a_month: &str, a_year: &str, b_month: &str, b_year: &str) -> bool {
    match (
        fiscal_year_start(a_year, a_month),
        fiscal_year_start(b_year, b_month),
    ) {
        (Some(a_fy), Some(b_fy)) if a_fy == b_fy => on_or_before(a_month, a_year, b_month, b_year),
        _ => false,
    }
}
