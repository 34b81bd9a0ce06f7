use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::answers::{Vector84, SLOT_COUNT};
use crate::error::Result;
use crate::models::{
    listing_order, write_stamp, BackendKind, IdentityKey, Report, ReportFilter, ReportPayload,
    StorageInfo, Upserted,
};
use crate::storage::ReportStore;

const REPORT_COLUMNS: &str = "district, institution, month, year, answers, cumulative, \
                              eye_bank, vision_center, updated_at";

/// One row per identity key in `survey_reports.reports`; the unique
/// constraint on (district, institution, year, month) rules out duplicates.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    url: String,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool, url))
    }

    pub fn from_pool(pool: PgPool, url: &str) -> Self {
        Self {
            pool,
            url: url.to_string(),
        }
    }

    pub async fn init_db(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn upsert_report(&self, key: &IdentityKey, payload: ReportPayload) -> Result<Upserted> {
        let doc = Report::build(key, payload, write_stamp());

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO survey_reports.reports
            (district, institution, year, month, answers, cumulative, eye_bank, vision_center, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (district, institution, year, month) DO UPDATE
            SET answers = EXCLUDED.answers,
                cumulative = EXCLUDED.cumulative,
                eye_bank = EXCLUDED.eye_bank,
                vision_center = EXCLUDED.vision_center,
                updated_at = EXCLUDED.updated_at
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(&doc.district)
        .bind(&doc.institution)
        .bind(&doc.year)
        .bind(&doc.month)
        .bind(Json(doc.answers))
        .bind(Json(doc.cumulative))
        .bind(Json(&doc.eye_bank))
        .bind(Json(&doc.vision_center))
        .bind(doc.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let stored = report_from_row(&row)?;
        info!("Report {} upserted into survey_reports.reports", key);
        Ok(Upserted {
            doc: stored,
            location: Some(redact_password(&self.url)),
        })
    }

    async fn get_report(&self, key: &IdentityKey) -> Result<Option<Report>> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM survey_reports.reports \
             WHERE district = $1 AND institution = $2 AND year = $3 AND month = $4"
        ))
        .bind(key.district())
        .bind(key.institution())
        .bind(key.year())
        .bind(key.month())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let (clause, values) = filter_clause(filter);
        let query = format!("SELECT {REPORT_COLUMNS} FROM survey_reports.reports{clause}");

        let mut rows = sqlx::query(&query);
        for value in &values {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut reports = Vec::with_capacity(records.len());
        for row in &records {
            reports.push(report_from_row(row)?);
        }

        reports.sort_by(listing_order);
        Ok(reports)
    }

    fn info(&self) -> StorageInfo {
        StorageInfo {
            backend: BackendKind::Postgres,
            location: redact_password(&self.url),
            slot_count: SLOT_COUNT,
        }
    }
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    Ok(Report {
        district: row.try_get("district")?,
        institution: row.try_get("institution")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        answers: row.try_get::<Json<Vector84>, _>("answers")?.0,
        cumulative: row.try_get::<Json<Vector84>, _>("cumulative")?.0,
        eye_bank: row.try_get::<Json<Vec<serde_json::Value>>, _>("eye_bank")?.0,
        vision_center: row.try_get::<Json<Vec<serde_json::Value>>, _>("vision_center")?.0,
        updated_at: row.try_get("updated_at")?,
    })
}

/// ` WHERE` clause with numbered placeholders for the fields set in `filter`.
fn filter_clause(filter: &ReportFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    for (column, value) in [
        ("district", &filter.district),
        ("institution", &filter.institution),
        ("month", &filter.month),
        ("year", &filter.year),
    ] {
        if let Some(value) = value {
            values.push(value.clone());
            conditions.push(format!("{column} = ${}", values.len()));
        }
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// Connection string with the password replaced, for display.
fn redact_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &url[authority_start..];
    let authority_len = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_len].rfind('@') else {
        return url.to_string();
    };
    let Some(colon) = rest[..at].find(':') else {
        return url.to_string();
    };

    format!(
        "{}{}****{}",
        &url[..authority_start],
        &rest[..=colon],
        &rest[at..]
    )
}
