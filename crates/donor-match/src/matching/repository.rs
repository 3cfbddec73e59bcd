use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    DonorId, DonorRecord, Match, MatchId, MatchStatus, OrganType, RecipientId, RecipientRecord,
    RecipientRequest, RequestStatus,
};

/// Conditional write issued by the allocator once a winner is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub donor_id: DonorId,
    pub recipient_id: RecipientId,
    pub organ_type: OrganType,
    pub score: f64,
    /// Non-terminal matches the donor may hold once this claim lands.
    pub capacity: u32,
    pub claimed_at: DateTime<Utc>,
}

/// Why the store refused a claim at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimConflict {
    #[error("donor is no longer active and verified")]
    DonorUnavailable,
    #[error("donor already holds {active} of {capacity} active match(es)")]
    DonorAtCapacity { active: u32, capacity: u32 },
    #[error("recipient is no longer eligible (status {})", .status.label())]
    RecipientNotEligible { status: RequestStatus },
    #[error("recipient already holds an active match for this organ type")]
    RecipientAlreadyMatched,
}

impl ClaimConflict {
    /// Recipient-side conflicts cannot be resolved by trying another donor.
    pub fn is_recipient_side(&self) -> bool {
        matches!(
            self,
            ClaimConflict::RecipientNotEligible { .. } | ClaimConflict::RecipientAlreadyMatched
        )
    }
}

/// Persistence seam for donors, recipient requests and matches.
///
/// `claim` must be atomic: re-verify the donor and recipient, insert the match
/// and update donor availability and recipient status together, or do nothing.
pub trait ProfileStore: Send + Sync {
    /// Donors that are active, verified, offer `organ_type` and hold fewer than
    /// `capacity` non-terminal matches across every organ type.
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError>;
    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError>;
    /// Requests with the verification flag set and status `verified`.
    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError>;
    fn claim(&self, claim: ClaimRequest) -> Result<Match, StoreError>;

    fn oldest_verified_request(
        &self,
        organ_type: OrganType,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let oldest = self
            .verified_recipients()?
            .iter()
            .filter_map(|record| RecipientRequest::try_from(record).ok())
            .filter(|request| request.organ_type == organ_type)
            .map(|request| request.created_at)
            .min();
        Ok(oldest)
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record '{0}' already exists")]
    Duplicate(String),
    #[error("claim rejected: {0}")]
    Conflict(ClaimConflict),
    #[error("match {id} cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Which side of a match a notice is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeParty {
    Donor,
    Recipient,
}

/// Request to inform one party of a new proposed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchNotice {
    pub party: NoticeParty,
    pub match_id: MatchId,
    pub donor_id: DonorId,
    pub recipient_id: RecipientId,
    pub organ_type: OrganType,
}

/// Outbound notification hook (e-mail, SMS, in-app adapters).
pub trait NotificationGateway: Send + Sync {
    fn notify(&self, notice: MatchNotice) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    MatchAllocated,
    BatchAllocationRun,
    BatchAllocationRefused,
}

/// Compliance record of an allocation decision or maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
}

/// Outbound compliance log hook.
pub trait AuditGateway: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway transport unavailable: {0}")]
    Transport(String),
}
