use chrono::{DateTime, Utc};

use super::super::compatibility::Compatibility;
use super::super::domain::{Donor, RecipientRequest, UrgencyTier};
use super::config::{BloodTierScores, ScoringWeights};
use super::{ScoreComponent, ScoreFactor, ScoringContext};

pub(crate) fn urgency_factor(tier: UrgencyTier) -> f64 {
    match tier {
        UrgencyTier::Critical => 1.0,
        UrgencyTier::High => 0.75,
        UrgencyTier::Medium => 0.5,
        UrgencyTier::Low => 0.25,
    }
}

pub(crate) fn blood_tier_factor(compatibility: Compatibility, tiers: &BloodTierScores) -> f64 {
    match compatibility {
        Compatibility::Identical => tiers.identical,
        Compatibility::Compatible => tiers.compatible,
        Compatibility::Tolerated => tiers.tolerated,
        Compatibility::Incompatible => 0.0,
    }
}

/// Request age relative to the oldest pending request for the same organ type.
pub(crate) fn wait_time_factor(
    requested_at: DateTime<Utc>,
    oldest_requested_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let waited = (now - requested_at).num_seconds().max(0) as f64;
    let longest = oldest_requested_at
        .map(|oldest| (now - oldest).num_seconds().max(0) as f64)
        .unwrap_or(waited);

    if longest <= 0.0 {
        return 1.0;
    }

    (waited / longest).clamp(0.0, 1.0)
}

/// Profile freshness decaying linearly to zero across the horizon.
pub(crate) fn recency_factor(
    registered_at: DateTime<Utc>,
    now: DateTime<Utc>,
    horizon_days: u32,
) -> f64 {
    let horizon = f64::from(horizon_days.max(1));
    let age_days = (now - registered_at).num_days().max(0) as f64;
    1.0 - age_days.min(horizon) / horizon
}

pub(crate) fn score_pair(
    donor: &Donor,
    recipient: &RecipientRequest,
    compatibility: Compatibility,
    context: &ScoringContext,
    weights: &ScoringWeights,
) -> (Vec<ScoreComponent>, f64) {
    let urgency = urgency_factor(recipient.urgency);
    let blood = blood_tier_factor(compatibility, &weights.tiers);
    let wait = wait_time_factor(
        recipient.created_at,
        context.oldest_request_at,
        context.now,
    );
    let recency = recency_factor(donor.created_at, context.now, weights.recency_horizon_days);

    let components = vec![
        ScoreComponent {
            factor: ScoreFactor::Urgency,
            normalized: urgency,
            weighted: urgency * weights.urgency,
            notes: format!("urgency tier {}", recipient.urgency.label()),
        },
        ScoreComponent {
            factor: ScoreFactor::BloodTier,
            normalized: blood,
            weighted: blood * weights.blood_tier,
            notes: format!(
                "{} donor for {} recipient ({:?})",
                donor.blood_group, recipient.blood_group, compatibility
            ),
        },
        ScoreComponent {
            factor: ScoreFactor::WaitTime,
            normalized: wait,
            weighted: wait * weights.wait_time,
            notes: format!("waited {:.0}% of the longest open request", wait * 100.0),
        },
        ScoreComponent {
            factor: ScoreFactor::DonorRecency,
            normalized: recency,
            weighted: recency * weights.donor_recency,
            notes: format!(
                "registered {} day(s) ago",
                (context.now - donor.created_at).num_days().max(0)
            ),
        },
    ];

    let total = components.iter().map(|component| component.weighted).sum();
    (components, total)
}
