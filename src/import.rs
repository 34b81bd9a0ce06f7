use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::answers::{AnswerInput, Scalar};
use crate::error::{Error, Result};
use crate::models::IdentityKey;
use crate::service::{ReportService, Submission};

const IDENTITY_COLUMNS: [&str; 4] = ["district", "institution", "month", "year"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Parse CSV rows into submissions.
///
/// `district,institution,month,year` are matched by header name; every other
/// column is an answer cell keyed by its header. Blank cells are left out so a
/// merge import does not touch them. Rows with an incomplete identity come back
/// as `Err` entries in place.
pub fn read_submissions<R: Read>(reader: R, merge: bool) -> Result<Vec<Result<Submission>>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let identity: Vec<Option<usize>> = IDENTITY_COLUMNS.iter().map(|c| position(*c)).collect();

    let mut submissions = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |column: usize| identity[column].and_then(|i| record.get(i)).unwrap_or("");

        let key = IdentityKey::new(field(0), field(1), field(2), field(3));
        let answers: Vec<(String, Scalar)> = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, (_, cell))| !identity.contains(&Some(*i)) && !cell.is_empty())
            .map(|(_, (header, cell))| (header.to_string(), Scalar::from(cell)))
            .collect();

        submissions.push(key.map(|key| Submission {
            merge,
            ..Submission::new(key, AnswerInput::Mapping(answers))
        }));
    }

    Ok(submissions)
}

/// Submit every row of a CSV file through the normal submission path.
pub async fn import_csv(service: &ReportService, csv_path: &Path, merge: bool) -> Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)?;
    let mut summary = ImportSummary::default();

    for (row, submission) in read_submissions(file, merge)?.into_iter().enumerate() {
        match submission {
            Ok(submission) => {
                service.submit(&submission).await?;
                summary.written += 1;
            }
            Err(Error::MissingIdentity(field)) => {
                warn!("Row {} of {} has no {}; skipped", row + 1, csv_path.display(), field);
                summary.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        "Imported {} reports from {} ({} skipped)",
        summary.written,
        csv_path.display(),
        summary.skipped
    );
    Ok(summary)
}
