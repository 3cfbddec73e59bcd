//! Donor/recipient matching engine.
//!
//! Pure pieces (compatibility evaluation and scoring) never fail. Storage-bound
//! pieces (scanning and claiming) surface infrastructure faults as errors, while
//! empty pools and lost races are reported as [`AllocationOutcome`] variants.

pub mod allocator;
pub mod batch;
pub mod compatibility;
pub mod config;
pub mod domain;
pub mod memory;
pub mod repository;
pub mod roster;
pub mod router;
pub mod scanner;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use allocator::{
    AllocationError, AllocationOutcome, CandidateView, MatchAllocator, RankedCandidate,
};
pub use batch::{BatchCoordinator, BatchFailure, BatchSummary, FailureReason};
pub use compatibility::{Compatibility, CompatibilityEvaluator, CompatibilityMatrix};
pub use config::{CapacityPolicy, MatchingConfig};
pub use domain::{
    Availability, BloodGroup, Donor, DonorId, DonorRecord, Match, MatchId, MatchStatus, OrganType,
    ProductCategory, RecipientId, RecipientRecord, RecipientRequest, RequestStatus, UrgencyTier,
    ValidationError,
};
pub use memory::InMemoryProfileStore;
pub use repository::{
    AuditAction, AuditEntry, AuditGateway, ClaimConflict, ClaimRequest, GatewayError,
    MatchNotice, NotificationGateway, NoticeParty, ProfileStore, StoreError,
};
pub use roster::{RosterImportError, RosterImporter};
pub use router::matching_router;
pub use scanner::{CandidateScan, CandidateScanner};
pub use scoring::{
    ScoreBreakdown, ScoreComponent, ScoreFactor, ScoringContext, ScoringFunction, ScoringWeights,
};
pub use service::{MatchingService, MatchingServiceError, OperatorCredential};
