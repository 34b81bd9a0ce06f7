//! One pretty-printed JSON file per report under
//! `base_dir/district/institution/year/month.json`.
//!
//! Writes go straight to the target file (no temp file and rename), so a crash
//! mid-write can leave a truncated document. Reads treat such a file as absent and
//! the next write for that key replaces it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::answers::SLOT_COUNT;
use crate::error::{Error, Result};
use crate::models::{
    listing_order, write_stamp, BackendKind, IdentityKey, Report, ReportFilter, ReportPayload,
    StorageInfo, Upserted,
};
use crate::storage::ReportStore;

const RESERVED: [char; 10] = ['%', '\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Make one identity field safe to use as a single path segment.
///
/// Reserved and control characters are percent-encoded, `%` included, so distinct
/// fields never share a segment. `.` and `..` are encoded the same way and the
/// empty field becomes a bare `%`.
pub fn sanitize(segment: &str) -> String {
    match segment {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let mut encoded = String::with_capacity(segment.len());
    for c in segment.chars() {
        if RESERVED.contains(&c) || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Like [`FileStore::new`], creating the base directory if missing.
    pub async fn create(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(base_dir);
        tokio::fs::create_dir_all(&store.base_dir).await?;
        Ok(store)
    }

    pub fn file_path(&self, key: &IdentityKey) -> PathBuf {
        self.base_dir
            .join(sanitize(key.district()))
            .join(sanitize(key.institution()))
            .join(sanitize(key.year()))
            .join(format!("{}.json", sanitize(key.month())))
    }
}

#[async_trait]
impl ReportStore for FileStore {
    async fn upsert_report(&self, key: &IdentityKey, payload: ReportPayload) -> Result<Upserted> {
        let file = self.file_path(key);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let doc = Report::build(key, payload, write_stamp());
        let body = serde_json::to_string_pretty(&doc)?;
        tokio::fs::write(&file, body).await?;

        info!("Report {} written to {}", key, file.display());
        Ok(Upserted {
            doc,
            location: Some(file.display().to_string()),
        })
    }

    async fn get_report(&self, key: &IdentityKey) -> Result<Option<Report>> {
        let file = self.file_path(key);
        let body = match tokio::fs::read_to_string(&file).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let doc: Report = match serde_json::from_str(&body) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("Ignoring unreadable report {}: {}", file.display(), err);
                return Ok(None);
            }
        };
        if doc.key() != *key {
            warn!("Report at {} belongs to {}, not {}", file.display(), doc.key(), key);
            return Ok(None);
        }
        Ok(Some(doc))
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let base_dir = self.base_dir.clone();
        let filter = filter.clone();

        let mut reports = tokio::task::spawn_blocking(move || walk_reports(&base_dir, &filter))
            .await
            .map_err(|err| Error::Io(std::io::Error::other(err)))?;

        reports.sort_by(listing_order);
        Ok(reports)
    }

    fn info(&self) -> StorageInfo {
        StorageInfo {
            backend: BackendKind::Fs,
            location: self.base_dir.display().to_string(),
            slot_count: SLOT_COUNT,
        }
    }
}

// Best effort: unreadable directories and files that do not parse are skipped.
fn walk_reports(base_dir: &Path, filter: &ReportFilter) -> Vec<Report> {
    let mut reports = Vec::new();

    for entry in WalkDir::new(base_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", base_dir.display(), err);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|body| serde_json::from_str::<Report>(&body).map_err(Error::from));
        match parsed {
            Ok(report) if filter.matches(&report) => reports.push(report),
            Ok(_) => {}
            Err(err) => warn!("Skipping {}: {}", path.display(), err),
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::Vector84;
    use serde_json::json;
    use tempfile::TempDir;

    fn key(institution: &str, month: &str, year: &str) -> IdentityKey {
        IdentityKey::new("North", institution, month, year).unwrap()
    }

    fn payload(fill: f64) -> ReportPayload {
        ReportPayload {
            answers: Vector84::filled(fill),
            cumulative: Vector84::filled(fill * 2.0),
            eye_bank: Some(vec![json!({ "donor": "A", "corneas": 2 })]),
            vision_center: None,
        }
    }

    #[test]
    fn sanitize_encodes_reserved_characters() {
        assert_eq!(sanitize("A/B\\C"), "A%2FB%5CC");
        assert_eq!(sanitize("x:y*z?"), "x%3Ay%2Az%3F");
        assert_eq!(sanitize("tab\there"), "tab%09here");
        assert_eq!(sanitize("50%"), "50%25");
        assert_eq!(sanitize(""), "%");
        assert_eq!(sanitize("."), "%2E");
        assert_eq!(sanitize(".."), "%2E%2E");
        assert_eq!(sanitize("St. Mary's"), "St. Mary's");
        assert_eq!(sanitize("A_B"), "A_B");
    }

    #[test]
    fn sanitize_keeps_distinct_fields_apart() {
        let fields = ["A/B", "A_B", "A%2FB", "A:B", ".", "%2E", "", "%", "_"];
        let encoded: std::collections::HashSet<String> = fields.iter().map(|f| sanitize(f)).collect();
        assert_eq!(encoded.len(), fields.len());
    }

    #[test]
    fn file_path_follows_district_institution_year_month() {
        let store = FileStore::new("/data");
        let path = store.file_path(&key("City/Eye", "April", "2025"));
        assert_eq!(path, PathBuf::from("/data/North/City%2FEye/2025/April.json"));
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let key = key("Clinic", "April", "2025");

        let saved = store.upsert_report(&key, payload(3.0)).await.unwrap();
        let loaded = store.get_report(&key).await.unwrap().unwrap();

        assert_eq!(loaded, saved.doc);
        assert_eq!(loaded.answers, Vector84::filled(3.0));
        assert_eq!(loaded.cumulative, Vector84::filled(6.0));
        assert!(loaded.vision_center.is_empty());
        assert_eq!(loaded.eye_bank.len(), 1);

        let on_disk = std::fs::read_to_string(store.file_path(&key)).unwrap();
        assert_eq!(on_disk, serde_json::to_string_pretty(&saved.doc).unwrap());
    }

    #[tokio::test]
    async fn upsert_overwrites_the_same_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let key = key("Clinic", "April", "2025");

        store.upsert_report(&key, payload(1.0)).await.unwrap();
        store.upsert_report(&key, payload(2.0)).await.unwrap();

        let all = store.list_reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].answers, Vector84::filled(2.0));
    }

    #[tokio::test]
    async fn missing_report_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();

        let loaded = store.get_report(&key("Clinic", "May", "2025")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn truncated_report_reads_as_missing_and_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let key = key("Clinic", "April", "2025");

        let file = store.file_path(&key);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, r#"{ "district": "North", "answ"#).unwrap();

        assert!(store.get_report(&key).await.unwrap().is_none());

        store.upsert_report(&key, payload(1.0)).await.unwrap();
        let loaded = store.get_report(&key).await.unwrap().unwrap();
        assert_eq!(loaded.answers, Vector84::filled(1.0));
    }

    #[tokio::test]
    async fn unreadable_report_path_is_still_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let key = key("Clinic", "April", "2025");

        std::fs::create_dir_all(store.file_path(&key)).unwrap();
        assert!(matches!(store.get_report(&key).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn similar_institution_names_get_separate_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let slash = key("A/B", "April", "2025");
        let underscore = key("A_B", "April", "2025");

        store.upsert_report(&slash, payload(5.0)).await.unwrap();
        store.upsert_report(&underscore, payload(9.0)).await.unwrap();

        let loaded = store.get_report(&slash).await.unwrap().unwrap();
        assert_eq!(loaded.institution, "A/B");
        assert_eq!(loaded.answers, Vector84::filled(5.0));
        let loaded = store.get_report(&underscore).await.unwrap().unwrap();
        assert_eq!(loaded.institution, "A_B");

        let all = store.list_reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn document_for_another_key_is_not_returned() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();
        let other = key("Other", "April", "2025");
        let wanted = key("Clinic", "April", "2025");

        let saved = store.upsert_report(&other, payload(2.0)).await.unwrap();
        let file = store.file_path(&wanted);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, serde_json::to_string_pretty(&saved.doc).unwrap()).unwrap();

        assert!(store.get_report(&wanted).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_and_skips_broken_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::create(temp_dir.path()).await.unwrap();

        store.upsert_report(&key("Clinic", "April", "2025"), payload(1.0)).await.unwrap();
        store.upsert_report(&key("Clinic", "May", "2025"), payload(1.0)).await.unwrap();
        store.upsert_report(&key("Other", "April", "2025"), payload(1.0)).await.unwrap();
        std::fs::write(temp_dir.path().join("North").join("broken.json"), "{ not json").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let all = store.list_reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let april = store
            .list_reports(&ReportFilter::new(None, None, Some("apr"), None))
            .await
            .unwrap();
        assert_eq!(april.len(), 2);
        assert!(april.iter().all(|r| r.month == "April"));

        let clinic = store
            .list_reports(&ReportFilter::new(Some("North"), Some("Clinic"), None, Some("2025")))
            .await
            .unwrap();
        let months: Vec<&str> = clinic.iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months, vec!["April", "May"]);
    }

    #[tokio::test]
    async fn list_on_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("absent"));

        let all = store.list_reports(&ReportFilter::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn info_reports_base_dir() {
        let store = FileStore::new("/srv/reports");
        let info = store.info();
        assert_eq!(info.backend, BackendKind::Fs);
        assert_eq!(info.location, "/srv/reports");
        assert_eq!(info.slot_count, SLOT_COUNT);
    }
}
