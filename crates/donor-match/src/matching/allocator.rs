use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::compatibility::{Compatibility, CompatibilityEvaluator};
use super::config::{CapacityPolicy, MatchingConfig};
use super::domain::{BloodGroup, Donor, DonorId, Match, RecipientRequest};
use super::repository::{ClaimConflict, ClaimRequest, ProfileStore, StoreError};
use super::scanner::CandidateScanner;
use super::scoring::{rank_order, ScoreBreakdown, ScoreComponent, ScoringContext, ScoringFunction};

/// Eligible donor with its compatibility level and score for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub donor: Donor,
    pub compatibility: Compatibility,
    pub score: ScoreBreakdown,
}

impl RankedCandidate {
    pub fn view(&self) -> CandidateView {
        CandidateView {
            donor_id: self.donor.id.clone(),
            blood_group: self.donor.blood_group,
            compatibility: self.compatibility,
            score: self.score.total,
            components: self.score.components.clone(),
        }
    }
}

/// Sanitised candidate row for preview and review screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
    pub donor_id: DonorId,
    pub blood_group: BloodGroup,
    pub compatibility: Compatibility,
    pub score: f64,
    pub components: Vec<ScoreComponent>,
}

/// Expected results of an allocation attempt. None of these are errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationOutcome {
    Matched {
        #[serde(rename = "match")]
        record: Match,
    },
    NoCandidate,
    Conflict {
        attempts: u8,
        reason: ClaimConflict,
    },
}

impl AllocationOutcome {
    pub fn matched(&self) -> Option<&Match> {
        match self {
            AllocationOutcome::Matched { record } => Some(record),
            _ => None,
        }
    }
}

/// Infrastructure faults; contention and empty pools are outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Scans, scores and atomically claims the best donor for a recipient.
pub struct MatchAllocator<S> {
    store: Arc<S>,
    scanner: CandidateScanner<S>,
    evaluator: Arc<CompatibilityEvaluator>,
    scoring: ScoringFunction,
    capacity: CapacityPolicy,
    max_attempts: u8,
}

impl<S> MatchAllocator<S>
where
    S: ProfileStore,
{
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        let evaluator = Arc::new(CompatibilityEvaluator::new(config.matrix));
        let scanner =
            CandidateScanner::new(store.clone(), evaluator.clone(), config.capacity.clone());

        Self {
            store,
            scanner,
            evaluator,
            scoring: ScoringFunction::new(config.weights),
            capacity: config.capacity,
            max_attempts: config.max_claim_retries.max(1),
        }
    }

    pub fn evaluator(&self) -> &CompatibilityEvaluator {
        &self.evaluator
    }

    /// Ranked eligible donors for `recipient`, best first. Read-only.
    pub fn rank(
        &self,
        recipient: &RecipientRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedCandidate>, AllocationError> {
        self.rank_excluding(recipient, now, &HashSet::new())
    }

    fn rank_excluding(
        &self,
        recipient: &RecipientRequest,
        now: DateTime<Utc>,
        excluded: &HashSet<DonorId>,
    ) -> Result<Vec<RankedCandidate>, AllocationError> {
        let context = ScoringContext {
            now,
            oldest_request_at: self.store.oldest_verified_request(recipient.organ_type)?,
        };

        let mut ranked: Vec<RankedCandidate> = self
            .scanner
            .eligible(recipient)?
            .filter(|donor| !excluded.contains(&donor.id))
            .map(|donor| {
                let compatibility = self.evaluator.blood_compatibility(&donor, recipient);
                let score = self
                    .scoring
                    .score(&donor, recipient, compatibility, &context);
                RankedCandidate {
                    donor,
                    compatibility,
                    score,
                }
            })
            .collect();

        ranked.sort_by(|left, right| rank_order(&left.score, &right.score));
        Ok(ranked)
    }

    pub fn allocate(&self, recipient: &RecipientRequest) -> Result<AllocationOutcome, AllocationError> {
        self.allocate_at(recipient, Utc::now())
    }

    /// Claims the top-ranked donor, re-scanning after each lost race until the
    /// attempt budget is spent.
    pub fn allocate_at(
        &self,
        recipient: &RecipientRequest,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, AllocationError> {
        let mut excluded = HashSet::new();
        let mut last_conflict = None;
        let mut attempts = 0u8;

        while attempts < self.max_attempts {
            let Some(best) = self
                .rank_excluding(recipient, now, &excluded)?
                .into_iter()
                .next()
            else {
                break;
            };
            attempts += 1;

            let claim = ClaimRequest {
                donor_id: best.donor.id.clone(),
                recipient_id: recipient.id.clone(),
                organ_type: recipient.organ_type,
                score: best.score.total,
                capacity: self.capacity.capacity_for(recipient.organ_type),
                claimed_at: now,
            };

            match self.store.claim(claim) {
                Ok(record) => {
                    info!(
                        match_id = %record.id,
                        donor_id = %record.donor_id,
                        recipient_id = %record.recipient_id,
                        organ_type = %record.organ_type,
                        score = record.score,
                        attempts,
                        "donor allocated"
                    );
                    return Ok(AllocationOutcome::Matched { record });
                }
                Err(StoreError::Conflict(ClaimConflict::DonorAtCapacity { active, capacity })) => {
                    // Capacity refusals exclude the donor without spending an attempt.
                    attempts -= 1;
                    debug!(
                        recipient_id = %recipient.id,
                        donor_id = %best.donor.id,
                        active,
                        capacity,
                        "donor at capacity; skipping"
                    );
                    excluded.insert(best.donor.id);
                }
                Err(StoreError::Conflict(conflict)) => {
                    debug!(
                        recipient_id = %recipient.id,
                        donor_id = %best.donor.id,
                        %conflict,
                        attempts,
                        "claim lost to concurrent allocation"
                    );
                    let recipient_side = conflict.is_recipient_side();
                    excluded.insert(best.donor.id);
                    last_conflict = Some(conflict);
                    if recipient_side {
                        break;
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }

        match last_conflict {
            Some(reason) => {
                warn!(recipient_id = %recipient.id, attempts, %reason, "allocation contended");
                Ok(AllocationOutcome::Conflict { attempts, reason })
            }
            None => {
                debug!(recipient_id = %recipient.id, "no eligible donor");
                Ok(AllocationOutcome::NoCandidate)
            }
        }
    }
}
