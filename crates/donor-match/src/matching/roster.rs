use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::domain::{
    Availability, DonorId, DonorRecord, RecipientId, RecipientRecord, RequestStatus, UrgencyTier,
};
use super::memory::InMemoryProfileStore;
use super::repository::StoreError;

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
    Store(StoreError),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::InvalidField { line, field, value } => write!(
                f,
                "roster line {}: invalid {} '{}'",
                line, field, value
            ),
            RosterImportError::Store(err) => write!(f, "could not seed profile store: {}", err),
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::InvalidField { .. } => None,
            RosterImportError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<StoreError> for RosterImportError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Loads donor and recipient roster exports.
///
/// Blood group and organ columns are kept verbatim so malformed values surface as
/// per-record validation failures during matching rather than aborting the import.
/// Organ lists use `;` as separator.
pub struct RosterImporter;

impl RosterImporter {
    pub fn donors_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<DonorRecord>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::donors_from_reader(file)
    }

    pub fn recipients_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<RecipientRecord>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::recipients_from_reader(file)
    }

    pub fn donors_from_reader<R: Read>(reader: R) -> Result<Vec<DonorRecord>, RosterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for (index, row) in csv_reader.deserialize::<DonorRow>().enumerate() {
            let row = row?;
            let line = index + 2;
            records.push(DonorRecord {
                id: DonorId(row.id),
                blood_group: row.blood_group.unwrap_or_default(),
                organ_types: split_list(row.organ_types.as_deref()),
                availability: parse_availability(line, row.availability.as_deref())?,
                verified: parse_flag(line, "verified", row.verified.as_deref())?,
                created_at: parse_timestamp(line, &row.created_at)?,
            });
        }

        Ok(records)
    }

    pub fn recipients_from_reader<R: Read>(
        reader: R,
    ) -> Result<Vec<RecipientRecord>, RosterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for (index, row) in csv_reader.deserialize::<RecipientRow>().enumerate() {
            let row = row?;
            let line = index + 2;
            let urgency = row
                .urgency
                .parse::<UrgencyTier>()
                .map_err(|_| RosterImportError::InvalidField {
                    line,
                    field: "urgency",
                    value: row.urgency.clone(),
                })?;

            records.push(RecipientRecord {
                id: RecipientId(row.id),
                organ_type: row.organ_type.unwrap_or_default(),
                blood_group: row.blood_group.unwrap_or_default(),
                urgency,
                verified: parse_flag(line, "verified", row.verified.as_deref())?,
                status: parse_status(line, row.status.as_deref())?,
                created_at: parse_timestamp(line, &row.created_at)?,
            });
        }

        Ok(records)
    }

    /// Reads both rosters and inserts every row into `store`.
    pub fn seed<P: AsRef<Path>>(
        store: &InMemoryProfileStore,
        donors: P,
        recipients: P,
    ) -> Result<(usize, usize), RosterImportError> {
        let donors = Self::donors_from_path(donors)?;
        let recipients = Self::recipients_from_path(recipients)?;
        let counts = (donors.len(), recipients.len());

        for donor in donors {
            store.insert_donor(donor)?;
        }
        for recipient in recipients {
            store.insert_recipient(recipient)?;
        }

        info!(donors = counts.0, recipients = counts.1, "profile store seeded");
        Ok(counts)
    }
}

#[derive(Debug, Deserialize)]
struct DonorRow {
    id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    blood_group: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    organ_types: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    availability: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    verified: Option<String>,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct RecipientRow {
    id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    organ_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    blood_group: Option<String>,
    urgency: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    verified: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
    created_at: String,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_flag(line: usize, field: &'static str, raw: Option<&str>) -> Result<bool, RosterImportError> {
    let Some(value) = raw.map(|value| value.to_ascii_lowercase()) else {
        return Ok(false);
    };

    match value.as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(RosterImportError::InvalidField {
            line,
            field,
            value: other.to_string(),
        }),
    }
}

fn parse_availability(line: usize, raw: Option<&str>) -> Result<Availability, RosterImportError> {
    match raw.map(|value| value.to_ascii_lowercase()).as_deref() {
        None | Some("active") => Ok(Availability::Active),
        Some("paused") => Ok(Availability::Paused),
        Some("unavailable") => Ok(Availability::Unavailable),
        Some(other) => Err(RosterImportError::InvalidField {
            line,
            field: "availability",
            value: other.to_string(),
        }),
    }
}

fn parse_status(line: usize, raw: Option<&str>) -> Result<RequestStatus, RosterImportError> {
    let status = match raw.map(|value| value.to_ascii_lowercase()).as_deref() {
        None | Some("pending") => RequestStatus::Pending,
        Some("under_review") => RequestStatus::UnderReview,
        Some("verified") => RequestStatus::Verified,
        Some("matched") => RequestStatus::Matched,
        Some("approved") => RequestStatus::Approved,
        Some("rejected") => RequestStatus::Rejected,
        Some("completed") => RequestStatus::Completed,
        Some("cancelled") => RequestStatus::Cancelled,
        Some(other) => {
            return Err(RosterImportError::InvalidField {
                line,
                field: "status",
                value: other.to_string(),
            })
        }
    };
    Ok(status)
}

fn parse_timestamp(line: usize, raw: &str) -> Result<DateTime<Utc>, RosterImportError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RosterImportError::InvalidField {
            line,
            field: "created_at",
            value: trimmed.to_string(),
        })
}
