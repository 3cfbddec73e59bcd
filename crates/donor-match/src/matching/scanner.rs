use std::sync::Arc;

use tracing::{debug, warn};

use super::compatibility::CompatibilityEvaluator;
use super::config::CapacityPolicy;
use super::domain::{Donor, DonorRecord, OrganType, RecipientRequest};
use super::repository::{ProfileStore, StoreError};

/// Reads the current donor pool for an organ type. Nothing is cached between
/// calls; every scan reflects the store as it is now.
pub struct CandidateScanner<S> {
    store: Arc<S>,
    evaluator: Arc<CompatibilityEvaluator>,
    capacity: CapacityPolicy,
}

impl<S> CandidateScanner<S>
where
    S: ProfileStore,
{
    pub fn new(
        store: Arc<S>,
        evaluator: Arc<CompatibilityEvaluator>,
        capacity: CapacityPolicy,
    ) -> Self {
        Self {
            store,
            evaluator,
            capacity,
        }
    }

    /// Active, verified donors offering `organ_type` with spare capacity for it,
    /// as typed entities.
    pub fn scan(&self, organ_type: OrganType) -> Result<CandidateScan, StoreError> {
        let capacity = self.capacity.capacity_for(organ_type);
        let records = self.store.eligible_donors(organ_type, capacity)?;
        debug!(organ_type = %organ_type, capacity, pool = records.len(), "donor pool scanned");
        Ok(CandidateScan {
            organ_type,
            records: records.into_iter(),
            skipped: 0,
        })
    }

    /// Donors from a fresh scan that pass the compatibility evaluator for `recipient`.
    pub fn eligible<'a>(
        &'a self,
        recipient: &'a RecipientRequest,
    ) -> Result<impl Iterator<Item = Donor> + 'a, StoreError> {
        let scan = self.scan(recipient.organ_type)?;
        Ok(scan.filter(move |donor| self.evaluator.is_eligible(donor, recipient)))
    }
}

/// Lazy pass over one scan result. Malformed donor rows are logged and skipped.
#[derive(Debug)]
pub struct CandidateScan {
    organ_type: OrganType,
    records: std::vec::IntoIter<DonorRecord>,
    skipped: usize,
}

impl CandidateScan {
    /// Rows dropped so far because they failed validation.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for CandidateScan {
    type Item = Donor;

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.records.by_ref() {
            match Donor::try_from(&record) {
                Ok(donor) if donor.can_donate(self.organ_type) => return Some(donor),
                Ok(_) => continue,
                Err(error) => {
                    self.skipped += 1;
                    warn!(donor_id = %record.id, %error, "skipping malformed donor record");
                }
            }
        }
        None
    }
}
