use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::allocator::{AllocationOutcome, MatchAllocator};
use super::domain::{Match, RecipientId, RecipientRequest};
use super::repository::{ProfileStore, StoreError};

/// Why a recipient left a batch run without a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NoCandidate,
    Conflict { attempts: u8, detail: String },
    Validation { detail: String },
    Infrastructure { detail: String },
}

impl FailureReason {
    pub fn summary(&self) -> String {
        match self {
            FailureReason::NoCandidate => "no eligible donor".to_string(),
            FailureReason::Conflict { attempts, detail } => {
                format!("contended after {attempts} attempt(s): {detail}")
            }
            FailureReason::Validation { detail } => format!("invalid record: {detail}"),
            FailureReason::Infrastructure { detail } => format!("storage failure: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub recipient_id: RecipientId,
    pub reason: FailureReason,
}

/// Operator-facing result of one batch allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub created: usize,
    pub total_eligible: usize,
    pub failures: Vec<BatchFailure>,
    pub matches: Vec<Match>,
}

/// Drives allocation across every verified recipient, isolating per-recipient
/// failures. Already matched recipients are not listed by the store, so re-running
/// only works through the remaining backlog.
pub struct BatchCoordinator<S> {
    store: Arc<S>,
    allocator: Arc<MatchAllocator<S>>,
}

impl<S> BatchCoordinator<S>
where
    S: ProfileStore,
{
    pub fn new(store: Arc<S>, allocator: Arc<MatchAllocator<S>>) -> Self {
        Self { store, allocator }
    }

    pub fn run_all(&self) -> Result<BatchSummary, StoreError> {
        self.run_all_at(Utc::now())
    }

    /// Fails only when the recipient listing itself cannot be read.
    pub fn run_all_at(&self, now: DateTime<Utc>) -> Result<BatchSummary, StoreError> {
        let records = self.store.verified_recipients()?;
        let total_eligible = records.len();
        let mut failures = Vec::new();
        let mut requests = Vec::with_capacity(records.len());

        for record in &records {
            match RecipientRequest::try_from(record) {
                Ok(request) => requests.push(request),
                Err(error) => {
                    warn!(recipient_id = %record.id, %error, "skipping malformed recipient record");
                    failures.push(BatchFailure {
                        recipient_id: record.id.clone(),
                        reason: FailureReason::Validation {
                            detail: error.to_string(),
                        },
                    });
                }
            }
        }

        requests.sort_by(allocation_priority);

        let mut matches = Vec::new();
        for request in &requests {
            let reason = match self.allocator.allocate_at(request, now) {
                Ok(AllocationOutcome::Matched { record }) => {
                    matches.push(record);
                    continue;
                }
                Ok(AllocationOutcome::NoCandidate) => FailureReason::NoCandidate,
                Ok(AllocationOutcome::Conflict { attempts, reason }) => FailureReason::Conflict {
                    attempts,
                    detail: reason.to_string(),
                },
                Err(error) => {
                    warn!(recipient_id = %request.id, %error, "allocation failed");
                    FailureReason::Infrastructure {
                        detail: error.to_string(),
                    }
                }
            };

            failures.push(BatchFailure {
                recipient_id: request.id.clone(),
                reason,
            });
        }

        let summary = BatchSummary {
            created: matches.len(),
            total_eligible,
            failures,
            matches,
        };

        info!(
            created = summary.created,
            total_eligible = summary.total_eligible,
            failed = summary.failures.len(),
            "batch allocation finished"
        );
        Ok(summary)
    }
}

/// Most urgent first, then longest waiting, then lowest identifier.
fn allocation_priority(left: &RecipientRequest, right: &RecipientRequest) -> Ordering {
    right
        .urgency
        .cmp(&left.urgency)
        .then_with(|| left.created_at.cmp(&right.created_at))
        .then_with(|| left.id.cmp(&right.id))
}
