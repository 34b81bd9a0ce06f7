use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answers::Vector84;
use crate::error::{Error, Result};
use crate::fiscal::{self, FiscalMonth};

/// Trim and collapse internal whitespace runs to one space.
pub fn clean(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// (district, institution, month, year) addressing exactly one report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey {
    district: String,
    institution: String,
    month: String,
    year: String,
}

impl IdentityKey {
    pub fn new(district: &str, institution: &str, month: &str, year: &str) -> Result<Self> {
        let district = clean(district);
        let institution = clean(institution);
        let month = fiscal::canonicalize(&clean(month));
        let year = year.trim().to_string();

        if district.is_empty() {
            return Err(Error::MissingIdentity("district"));
        }
        if institution.is_empty() {
            return Err(Error::MissingIdentity("institution"));
        }
        if month.is_empty() {
            return Err(Error::MissingIdentity("month"));
        }
        if year.is_empty() {
            return Err(Error::MissingIdentity("year"));
        }

        Ok(Self {
            district,
            institution,
            month,
            year,
        })
    }

    pub fn district(&self) -> &str {
        &self.district
    }

    pub fn institution(&self) -> &str {
        &self.institution
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn year(&self) -> &str {
        &self.year
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.district, self.institution, self.year, self.month
        )
    }
}

/// The persisted report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub district: String,
    pub institution: String,
    pub month: String,
    pub year: String,
    #[serde(default)]
    pub answers: Vector84,
    #[serde(default)]
    pub cumulative: Vector84,
    #[serde(default)]
    pub eye_bank: Vec<Value>,
    #[serde(default)]
    pub vision_center: Vec<Value>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn build(key: &IdentityKey, payload: ReportPayload, updated_at: DateTime<Utc>) -> Self {
        Self {
            district: key.district.clone(),
            institution: key.institution.clone(),
            month: key.month.clone(),
            year: key.year.clone(),
            answers: payload.answers,
            cumulative: payload.cumulative,
            eye_bank: payload.eye_bank.unwrap_or_default(),
            vision_center: payload.vision_center.unwrap_or_default(),
            updated_at,
        }
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            district: self.district.clone(),
            institution: self.institution.clone(),
            month: self.month.clone(),
            year: self.year.clone(),
        }
    }

    pub fn fiscal_month(&self) -> Option<FiscalMonth> {
        FiscalMonth::parse(&self.month)
    }
}

/// Write timestamp at millisecond precision so every backend round-trips it exactly.
pub fn write_stamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// What the storage layer writes for one key. Merge is already resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPayload {
    pub answers: Vector84,
    pub cumulative: Vector84,
    pub eye_bank: Option<Vec<Value>>,
    pub vision_center: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub doc: Report,
    /// File path or connection descriptor the document was written to.
    pub location: Option<String>,
}

/// Exact-match filter over any subset of the identity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub district: Option<String>,
    pub institution: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
}

impl ReportFilter {
    pub fn new(
        district: Option<&str>,
        institution: Option<&str>,
        month: Option<&str>,
        year: Option<&str>,
    ) -> Self {
        let non_empty = |value: Option<&str>| value.map(clean).filter(|v| !v.is_empty());
        Self {
            district: non_empty(district),
            institution: non_empty(institution),
            month: non_empty(month).map(|m| fiscal::canonicalize(&m)),
            year: non_empty(year),
        }
    }

    /// Every report of the institution that owns `key`.
    pub fn institution_history(key: &IdentityKey) -> Self {
        Self {
            district: Some(key.district.clone()),
            institution: Some(key.institution.clone()),
            month: None,
            year: None,
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        let field = |wanted: &Option<String>, actual: &str| {
            wanted.as_deref().map_or(true, |w| w == actual)
        };
        field(&self.district, &report.district)
            && field(&self.institution, &report.institution)
            && field(&self.month, &report.month)
            && field(&self.year, &report.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Fs,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "fs" | "file" | "filesystem" => Ok(BackendKind::Fs),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            other => Err(Error::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Fs => f.write_str("fs"),
            BackendKind::Postgres => f.write_str("postgres"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub backend: BackendKind,
    pub location: String,
    pub slot_count: usize,
}

/// Newest year first, then fiscal month order, then district and institution.
pub fn listing_order(a: &Report, b: &Report) -> Ordering {
    let year = |r: &Report| r.year.trim().parse::<i64>().unwrap_or(i64::MIN);
    let month = |r: &Report| r.fiscal_month().map_or(usize::MAX, FiscalMonth::index);

    year(b)
        .cmp(&year(a))
        .then_with(|| b.year.cmp(&a.year))
        .then_with(|| month(a).cmp(&month(b)))
        .then_with(|| a.district.cmp(&b.district))
        .then_with(|| a.institution.cmp(&b.institution))
}
