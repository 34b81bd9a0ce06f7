use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::answers::{AnswerInput, Vector84};
use crate::cumulative::compute_cumulative;
use crate::error::Result;
use crate::merge::{effective_merge, resolve_answers};
use crate::models::{IdentityKey, Report, ReportFilter, ReportPayload, StorageInfo, Upserted};
use crate::storage::ReportStore;

/// Raw submission body as the transport receives it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBody {
    pub district: Option<Value>,
    pub institution: Option<Value>,
    pub month: Option<Value>,
    pub year: Option<Value>,
    pub answers: Option<Value>,
    pub cumulative: Option<Value>,
    pub eye_bank: Option<Value>,
    pub vision_center: Option<Value>,
    pub merge: Option<Value>,
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn attachment(value: Option<Value>) -> Option<Vec<Value>> {
    match value {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// A validated submission for one identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub key: IdentityKey,
    pub answers: AnswerInput,
    /// Non-empty means "store this cumulative as given" instead of computing it.
    pub cumulative: AnswerInput,
    pub eye_bank: Option<Vec<Value>>,
    pub vision_center: Option<Vec<Value>>,
    pub merge: bool,
}

impl Submission {
    pub fn new(key: IdentityKey, answers: AnswerInput) -> Self {
        Self {
            key,
            answers,
            cumulative: AnswerInput::Absent,
            eye_bank: None,
            vision_center: None,
            merge: false,
        }
    }

    /// Validate identity fields; `merge` is OR-ed with the body's own flag, which
    /// only counts when it is literally `true`.
    pub fn from_body(body: SubmissionBody, merge: bool) -> Result<Self> {
        let key = IdentityKey::new(
            &value_text(body.district.as_ref()),
            &value_text(body.institution.as_ref()),
            &value_text(body.month.as_ref()),
            &value_text(body.year.as_ref()),
        )?;

        Ok(Self {
            key,
            answers: AnswerInput::from(body.answers.as_ref()),
            cumulative: AnswerInput::from(body.cumulative.as_ref()),
            eye_bank: attachment(body.eye_bank),
            vision_center: attachment(body.vision_center),
            merge: merge || body.merge == Some(Value::Bool(true)),
        })
    }
}

/// Resolved report content for a submission, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub payload: ReportPayload,
    pub existing: bool,
    pub merged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub answers: Vector84,
    pub cumulative: Vector84,
    pub existing: bool,
}

/// Per-identity-key async locks, so one key's read-modify-write runs alone.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<IdentityKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: &IdentityKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct ReportService {
    store: Arc<dyn ReportStore>,
    locks: KeyedLocks,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    pub fn info(&self) -> StorageInfo {
        self.store.info()
    }

    /// Build the final answers and cumulative for `submission` from what is stored.
    pub async fn resolve(&self, submission: &Submission) -> Result<Resolved> {
        let key = &submission.key;
        let existing = self.store.get_report(key).await?;
        let existing_answers = existing.as_ref().map(|r| &r.answers);

        let incoming = submission.answers.normalize();
        debug!(
            "Recognized non-zero slots for {}: {}",
            key,
            describe_slots(&incoming.values)
        );

        let merged = effective_merge(existing_answers, &incoming, submission.merge);
        let answers = resolve_answers(existing_answers, &incoming, submission.merge);
        debug!(
            "Resolved answers for {} (merge: {}, incoming: {}, existing: {})",
            key,
            merged,
            incoming.has_incoming,
            existing.is_some()
        );

        let cumulative = if submission.cumulative.is_supplied() {
            submission.cumulative.normalize().values
        } else {
            let history = self
                .store
                .list_reports(&ReportFilter::institution_history(key))
                .await?;
            compute_cumulative(&history, key, &answers)
        };

        Ok(Resolved {
            payload: ReportPayload {
                answers,
                cumulative,
                eye_bank: submission.eye_bank.clone(),
                vision_center: submission.vision_center.clone(),
            },
            existing: existing.is_some(),
            merged,
        })
    }

    /// Resolve without writing anything.
    pub async fn preview(&self, submission: &Submission) -> Result<Preview> {
        let resolved = self.resolve(submission).await?;
        Ok(Preview {
            answers: resolved.payload.answers,
            cumulative: resolved.payload.cumulative,
            existing: resolved.existing,
        })
    }

    /// Resolve and persist. Submissions for the same key are serialized.
    ///
    /// Only this month's cumulative is recomputed; later months of the same
    /// fiscal year keep their stored totals until they are resubmitted.
    pub async fn submit(&self, submission: &Submission) -> Result<Upserted> {
        let _guard = self.locks.acquire(&submission.key).await;
        let resolved = self.resolve(submission).await?;
        self.store
            .upsert_report(&submission.key, resolved.payload)
            .await
    }

    pub async fn get(&self, key: &IdentityKey) -> Result<Option<Report>> {
        self.store.get_report(key).await
    }

    pub async fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        self.store.list_reports(filter).await
    }

    /// Distinct institution names, sorted, without doctor accounts (`DC `/`DOC ` prefixes).
    pub async fn institutions(&self, district: Option<&str>) -> Result<Vec<String>> {
        let filter = ReportFilter::new(district, None, None, None);
        let reports = self.store.list_reports(&filter).await?;

        let names: BTreeSet<String> = reports
            .into_iter()
            .map(|r| r.institution)
            .filter(|name| !name.is_empty() && !is_doctor_account(name))
            .collect();
        Ok(names.into_iter().collect())
    }
}

fn is_doctor_account(name: &str) -> bool {
    let mut words = name.splitn(2, char::is_whitespace);
    let first = words.next().unwrap_or_default();
    words.next().is_some() && (first.eq_ignore_ascii_case("dc") || first.eq_ignore_ascii_case("doc"))
}

fn describe_slots(vector: &Vector84) -> String {
    let slots: Vec<String> = vector.non_zero().map(|(slot, _)| format!("q{slot}")).collect();
    if slots.is_empty() {
        "(none)".to_string()
    } else {
        slots.join(", ")
    }
}
