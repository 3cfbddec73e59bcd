use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::allocator::{AllocationError, AllocationOutcome, MatchAllocator, RankedCandidate};
use super::batch::{BatchCoordinator, BatchSummary};
use super::config::MatchingConfig;
use super::domain::{Match, RecipientId, RecipientRequest, ValidationError};
use super::repository::{
    AuditAction, AuditEntry, AuditGateway, MatchNotice, NotificationGateway, NoticeParty,
    ProfileStore, StoreError,
};

/// Identity presented by whoever triggers a maintenance command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCredential {
    pub operator: String,
    pub token: String,
}

/// Facade composing the allocator, the batch coordinator and the outbound
/// gateways. Gateways are informed after the fact; their failures never change
/// an allocation result.
pub struct MatchingService<S, N, A> {
    store: Arc<S>,
    notifications: Arc<N>,
    audit: Arc<A>,
    allocator: Arc<MatchAllocator<S>>,
    coordinator: BatchCoordinator<S>,
    operator_token: Option<String>,
}

impl<S, N, A> MatchingService<S, N, A>
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>, audit: Arc<A>, config: MatchingConfig) -> Self {
        let allocator = Arc::new(MatchAllocator::new(store.clone(), config));
        let coordinator = BatchCoordinator::new(store.clone(), allocator.clone());

        Self {
            store,
            notifications,
            audit,
            allocator,
            coordinator,
            operator_token: None,
        }
    }

    /// Token required by [`Self::run_batch_allocation`]. Without one, every run
    /// is refused.
    pub fn with_operator_token(mut self, token: Option<String>) -> Self {
        self.operator_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    /// Ranked eligible donors for a recipient without allocating.
    pub fn find_candidates(
        &self,
        recipient_id: &RecipientId,
    ) -> Result<Vec<RankedCandidate>, MatchingServiceError> {
        let recipient = self.load_recipient(recipient_id)?;
        Ok(self.allocator.rank(&recipient, Utc::now())?)
    }

    /// On-demand allocation for a single recipient.
    pub fn allocate(
        &self,
        recipient_id: &RecipientId,
    ) -> Result<AllocationOutcome, MatchingServiceError> {
        let recipient = self.load_recipient(recipient_id)?;
        let outcome = self.allocator.allocate(&recipient)?;

        if let Some(record) = outcome.matched() {
            self.publish_allocation(record, "on_demand");
        }

        Ok(outcome)
    }

    /// Maintenance command: allocate across the whole verified backlog.
    pub fn run_batch_allocation(
        &self,
        credential: &OperatorCredential,
    ) -> Result<BatchSummary, MatchingServiceError> {
        if !self.authorized(credential) {
            warn!(operator = %credential.operator, "batch allocation refused");
            self.record_audit(AuditEntry {
                action: AuditAction::BatchAllocationRefused,
                actor: credential.operator.clone(),
                recorded_at: Utc::now(),
                details: BTreeMap::new(),
            });
            return Err(MatchingServiceError::Unauthorized);
        }

        let summary = self.coordinator.run_all()?;
        for record in &summary.matches {
            self.publish_allocation(record, &credential.operator);
        }

        let mut details = BTreeMap::new();
        details.insert("created".to_string(), summary.created.to_string());
        details.insert(
            "total_eligible".to_string(),
            summary.total_eligible.to_string(),
        );
        details.insert("failures".to_string(), summary.failures.len().to_string());
        self.record_audit(AuditEntry {
            action: AuditAction::BatchAllocationRun,
            actor: credential.operator.clone(),
            recorded_at: Utc::now(),
            details,
        });

        info!(operator = %credential.operator, created = summary.created, "batch allocation run recorded");
        Ok(summary)
    }

    fn authorized(&self, credential: &OperatorCredential) -> bool {
        match &self.operator_token {
            Some(expected) => constant_time_eq(expected.as_bytes(), credential.token.as_bytes()),
            None => false,
        }
    }

    fn load_recipient(
        &self,
        recipient_id: &RecipientId,
    ) -> Result<RecipientRequest, MatchingServiceError> {
        let record = self
            .store
            .recipient(recipient_id)?
            .ok_or_else(|| MatchingServiceError::RecipientNotFound(recipient_id.clone()))?;
        Ok(RecipientRequest::try_from(&record)?)
    }

    fn publish_allocation(&self, record: &Match, actor: &str) {
        for party in [NoticeParty::Donor, NoticeParty::Recipient] {
            let notice = MatchNotice {
                party,
                match_id: record.id.clone(),
                donor_id: record.donor_id.clone(),
                recipient_id: record.recipient_id.clone(),
                organ_type: record.organ_type,
            };
            if let Err(error) = self.notifications.notify(notice) {
                warn!(match_id = %record.id, ?party, %error, "match notification not delivered");
            }
        }

        let mut details = BTreeMap::new();
        details.insert("match_id".to_string(), record.id.0.clone());
        details.insert("donor_id".to_string(), record.donor_id.0.clone());
        details.insert("recipient_id".to_string(), record.recipient_id.0.clone());
        details.insert("organ_type".to_string(), record.organ_type.label().to_string());
        details.insert("score".to_string(), format!("{:.4}", record.score));
        self.record_audit(AuditEntry {
            action: AuditAction::MatchAllocated,
            actor: actor.to_string(),
            recorded_at: record.created_at,
            details,
        });
    }

    fn record_audit(&self, entry: AuditEntry) {
        let action = entry.action;
        if let Err(error) = self.audit.record(entry) {
            warn!(?action, %error, "audit entry not recorded");
        }
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Error raised by the matching service.
#[derive(Debug, thiserror::Error)]
pub enum MatchingServiceError {
    #[error("recipient {0} not found")]
    RecipientNotFound(RecipientId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("operator is not authorised to run batch allocation")]
    Unauthorized,
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
