use serde::{Deserialize, Serialize};

const DEFAULT_RECENCY_HORIZON_DAYS: u32 = 365;

/// Relative weights of the scoring factors. Each factor is normalised to [0, 1]
/// before its weight is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub urgency: f64,
    pub blood_tier: f64,
    pub wait_time: f64,
    pub donor_recency: f64,
    pub tiers: BloodTierScores,
    pub recency_horizon_days: u32,
}

impl ScoringWeights {
    /// Replaces non-finite or negative dials with their defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            urgency: sanitize(self.urgency, defaults.urgency),
            blood_tier: sanitize(self.blood_tier, defaults.blood_tier),
            wait_time: sanitize(self.wait_time, defaults.wait_time),
            donor_recency: sanitize(self.donor_recency, defaults.donor_recency),
            tiers: BloodTierScores {
                identical: sanitize_unit(self.tiers.identical, defaults.tiers.identical),
                compatible: sanitize_unit(self.tiers.compatible, defaults.tiers.compatible),
                tolerated: sanitize_unit(self.tiers.tolerated, defaults.tiers.tolerated),
            },
            recency_horizon_days: if self.recency_horizon_days == 0 {
                DEFAULT_RECENCY_HORIZON_DAYS
            } else {
                self.recency_horizon_days
            },
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            urgency: 0.45,
            blood_tier: 0.30,
            wait_time: 0.20,
            donor_recency: 0.05,
            tiers: BloodTierScores::default(),
            recency_horizon_days: DEFAULT_RECENCY_HORIZON_DAYS,
        }
    }
}

/// Normalised score of each compatibility level; exact ABO/Rh matches are
/// preferred over universal-donor substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodTierScores {
    pub identical: f64,
    pub compatible: f64,
    pub tolerated: f64,
}

impl Default for BloodTierScores {
    fn default() -> Self {
        Self {
            identical: 1.0,
            compatible: 0.7,
            tolerated: 0.3,
        }
    }
}

fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

fn sanitize_unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        value
    } else {
        fallback
    }
}
