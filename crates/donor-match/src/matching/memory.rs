use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::domain::{
    Availability, DonorId, DonorRecord, Match, MatchId, MatchStatus, OrganType, RecipientId,
    RecipientRecord, RequestStatus,
};
use super::repository::{ClaimConflict, ClaimRequest, ProfileStore, StoreError};

/// Profile store keeping every table behind one mutex, so each claim runs as a
/// serialisable transaction.
///
/// The active-claim indexes play the role of the uniqueness constraints a SQL
/// backend would declare: one active match per (recipient, organ type) and at
/// most `capacity` active matches per donor.
#[derive(Default, Clone)]
pub struct InMemoryProfileStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    donors: BTreeMap<DonorId, DonorRecord>,
    recipients: BTreeMap<RecipientId, RecipientRecord>,
    matches: BTreeMap<MatchId, Match>,
    active_by_donor: HashMap<DonorId, u32>,
    active_by_recipient: HashSet<(RecipientId, OrganType)>,
    /// Donors made unavailable by a claim rather than by their own profile.
    held_by_claims: HashSet<DonorId>,
    sequence: u64,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("profile store mutex poisoned".to_string()))
    }

    pub fn insert_donor(&self, record: DonorRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.donors.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.0));
        }
        state.donors.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn insert_recipient(&self, record: RecipientRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.recipients.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.0));
        }
        state.recipients.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn donor(&self, id: &DonorId) -> Result<Option<DonorRecord>, StoreError> {
        Ok(self.lock()?.donors.get(id).cloned())
    }

    pub fn donors(&self) -> Result<Vec<DonorRecord>, StoreError> {
        Ok(self.lock()?.donors.values().cloned().collect())
    }

    pub fn matches(&self) -> Result<Vec<Match>, StoreError> {
        Ok(self.lock()?.matches.values().cloned().collect())
    }

    /// Write path of the external review workflow. Terminal transitions release
    /// the donor's capacity; rejected or cancelled matches return the recipient
    /// to the matchable pool.
    pub fn transition_match(&self, id: &MatchId, next: MatchStatus) -> Result<Match, StoreError> {
        let mut state = self.lock()?;
        let current = state.matches.get(id).cloned().ok_or(StoreError::NotFound)?;

        if !current.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: current.status,
                to: next,
            });
        }

        let recipient_status = match next {
            MatchStatus::Approved => RequestStatus::Approved,
            MatchStatus::Completed => RequestStatus::Completed,
            MatchStatus::Rejected | MatchStatus::Cancelled => RequestStatus::Verified,
            MatchStatus::Proposed => RequestStatus::Matched,
        };
        if let Some(recipient) = state.recipients.get_mut(&current.recipient_id) {
            recipient.status = recipient_status;
        }

        if !next.is_active() {
            state.release(&current, next);
        }

        let updated = Match {
            status: next,
            ..current
        };
        state.matches.insert(id.clone(), updated.clone());
        Ok(updated)
    }
}

impl StoreState {
    fn active_for(&self, donor_id: &DonorId) -> u32 {
        self.active_by_donor.get(donor_id).copied().unwrap_or(0)
    }

    fn release(&mut self, released: &Match, next: MatchStatus) {
        if let Some(active) = self.active_by_donor.get_mut(&released.donor_id) {
            *active = active.saturating_sub(1);
        }
        self.active_by_recipient
            .remove(&(released.recipient_id.clone(), released.organ_type));

        let donated_organ = next == MatchStatus::Completed && !released.organ_type.is_renewable();
        if !self.held_by_claims.remove(&released.donor_id) || donated_organ {
            return;
        }

        if let Some(donor) = self.donors.get_mut(&released.donor_id) {
            if donor.availability == Availability::Unavailable {
                donor.availability = Availability::Active;
            }
        }
    }

    fn verify_claim(&self, claim: &ClaimRequest) -> Result<u32, StoreError> {
        let donor = self
            .donors
            .get(&claim.donor_id)
            .ok_or(StoreError::NotFound)?;
        let offers_organ = donor
            .organ_types
            .iter()
            .any(|raw| raw.parse::<OrganType>().ok() == Some(claim.organ_type));
        if !donor.verified || donor.availability != Availability::Active || !offers_organ {
            return Err(StoreError::Conflict(ClaimConflict::DonorUnavailable));
        }

        let active = self.active_for(&claim.donor_id);
        if active >= claim.capacity {
            return Err(StoreError::Conflict(ClaimConflict::DonorAtCapacity {
                active,
                capacity: claim.capacity,
            }));
        }

        let recipient = self
            .recipients
            .get(&claim.recipient_id)
            .ok_or(StoreError::NotFound)?;
        if !recipient.verified || recipient.status != RequestStatus::Verified {
            return Err(StoreError::Conflict(ClaimConflict::RecipientNotEligible {
                status: recipient.status,
            }));
        }
        if self
            .active_by_recipient
            .contains(&(claim.recipient_id.clone(), claim.organ_type))
        {
            return Err(StoreError::Conflict(ClaimConflict::RecipientAlreadyMatched));
        }

        Ok(active)
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .donors
            .values()
            .filter(|donor| donor.verified && donor.availability == Availability::Active)
            .filter(|donor| {
                donor
                    .organ_types
                    .iter()
                    .any(|raw| raw.parse::<OrganType>().ok() == Some(organ_type))
            })
            .filter(|donor| state.active_for(&donor.id) < capacity)
            .cloned()
            .collect())
    }

    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        Ok(self.lock()?.recipients.get(id).cloned())
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .recipients
            .values()
            .filter(|recipient| recipient.verified && recipient.status == RequestStatus::Verified)
            .cloned()
            .collect())
    }

    fn claim(&self, claim: ClaimRequest) -> Result<Match, StoreError> {
        let mut state = self.lock()?;
        let active = state.verify_claim(&claim)?;

        state.sequence += 1;
        let record = Match {
            id: MatchId(format!("match-{:06}", state.sequence)),
            donor_id: claim.donor_id.clone(),
            recipient_id: claim.recipient_id.clone(),
            organ_type: claim.organ_type,
            score: claim.score,
            status: MatchStatus::Proposed,
            created_at: claim.claimed_at,
        };

        let held = active + 1;
        state.active_by_donor.insert(claim.donor_id.clone(), held);
        state
            .active_by_recipient
            .insert((claim.recipient_id.clone(), claim.organ_type));
        if held >= claim.capacity {
            if let Some(donor) = state.donors.get_mut(&claim.donor_id) {
                donor.availability = Availability::Unavailable;
            }
            state.held_by_claims.insert(claim.donor_id.clone());
        }
        if let Some(recipient) = state.recipients.get_mut(&claim.recipient_id) {
            recipient.status = RequestStatus::Matched;
        }
        state.matches.insert(record.id.clone(), record.clone());

        debug!(
            match_id = %record.id,
            donor_id = %record.donor_id,
            recipient_id = %record.recipient_id,
            held,
            capacity = claim.capacity,
            "claim committed"
        );
        Ok(record)
    }
}
