mod config;
pub(crate) mod rules;

pub use config::{BloodTierScores, ScoringWeights};

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compatibility::Compatibility;
use super::domain::{Donor, DonorId, RecipientRequest};

/// Point-in-time inputs shared by every pair scored within one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    /// Creation time of the oldest verified request for the same organ type.
    pub oldest_request_at: Option<DateTime<Utc>>,
}

/// Stateless scorer turning an eligible pair into a desirability score.
#[derive(Debug, Clone, Default)]
pub struct ScoringFunction {
    weights: ScoringWeights,
}

impl ScoringFunction {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights: weights.sanitized(),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(
        &self,
        donor: &Donor,
        recipient: &RecipientRequest,
        compatibility: Compatibility,
        context: &ScoringContext,
    ) -> ScoreBreakdown {
        let (components, total) =
            rules::score_pair(donor, recipient, compatibility, context, &self.weights);

        ScoreBreakdown {
            donor_id: donor.id.clone(),
            total,
            requested_at: recipient.created_at,
            components,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Urgency,
    BloodTier,
    WaitTime,
    DonorRecency,
}

/// Discrete contribution to a score, kept for review screens and audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub normalized: f64,
    pub weighted: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub donor_id: DonorId,
    pub total: f64,
    pub requested_at: DateTime<Utc>,
    pub components: Vec<ScoreComponent>,
}

/// Total order over scored candidates, best first: higher score, then earlier
/// recipient request, then lowest donor id.
pub fn rank_order(left: &ScoreBreakdown, right: &ScoreBreakdown) -> Ordering {
    right
        .total
        .total_cmp(&left.total)
        .then_with(|| left.requested_at.cmp(&right.requested_at))
        .then_with(|| left.donor_id.cmp(&right.donor_id))
}
