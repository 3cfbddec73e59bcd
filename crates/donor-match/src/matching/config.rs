use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::compatibility::CompatibilityMatrix;
use super::domain::OrganType;
use super::scoring::ScoringWeights;

pub const DEFAULT_MAX_CLAIM_RETRIES: u8 = 3;

/// Engine dials: scoring weights, compatibility table, donor capacity and
/// contention retry bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub weights: ScoringWeights,
    pub matrix: CompatibilityMatrix,
    pub capacity: CapacityPolicy,
    pub max_claim_retries: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            matrix: CompatibilityMatrix::standard(),
            capacity: CapacityPolicy::default(),
            max_claim_retries: DEFAULT_MAX_CLAIM_RETRIES,
        }
    }
}

/// Maximum number of non-terminal matches a donor may hold per organ type.
///
/// Solid organs are pinned to one regardless of overrides, and every other
/// capacity is at least one, including values loaded through serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    renewable_default: u32,
    overrides: BTreeMap<OrganType, u32>,
}

impl CapacityPolicy {
    pub fn new(renewable_default: u32) -> Self {
        Self {
            renewable_default: renewable_default.max(1),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, organ_type: OrganType, capacity: u32) -> Self {
        self.overrides.insert(organ_type, capacity.max(1));
        self
    }

    pub fn capacity_for(&self, organ_type: OrganType) -> u32 {
        if !organ_type.is_renewable() {
            return 1;
        }

        self.overrides
            .get(&organ_type)
            .copied()
            .unwrap_or(self.renewable_default)
            .max(1)
    }
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}
