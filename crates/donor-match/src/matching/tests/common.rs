use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::matching::domain::{
    Availability, DonorId, DonorRecord, Match, OrganType, RecipientId, RecipientRecord,
    RequestStatus, UrgencyTier,
};
use crate::matching::repository::{
    AuditEntry, AuditGateway, ClaimConflict, ClaimRequest, GatewayError, MatchNotice, NotificationGateway,
    ProfileStore, StoreError,
};
use crate::matching::{matching_router, InMemoryProfileStore, MatchingConfig, MatchingService};

pub(super) const OPERATOR_TOKEN: &str = "maintenance-secret";

/// Reference instant every fixture is positioned against.
pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid reference time")
}

pub(super) fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub(super) fn donor(id: &str, blood_group: &str, organs: &[&str], registered_days_ago: i64) -> DonorRecord {
    DonorRecord {
        id: DonorId(id.to_string()),
        blood_group: blood_group.to_string(),
        organ_types: organs.iter().map(|organ| organ.to_string()).collect(),
        availability: Availability::Active,
        verified: true,
        created_at: days_ago(registered_days_ago),
    }
}

pub(super) fn recipient(
    id: &str,
    organ_type: &str,
    blood_group: &str,
    urgency: UrgencyTier,
    requested_days_ago: i64,
) -> RecipientRecord {
    RecipientRecord {
        id: RecipientId(id.to_string()),
        organ_type: organ_type.to_string(),
        blood_group: blood_group.to_string(),
        urgency,
        verified: true,
        status: RequestStatus::Verified,
        created_at: days_ago(requested_days_ago),
    }
}

pub(super) fn seeded_store(
    donors: Vec<DonorRecord>,
    recipients: Vec<RecipientRecord>,
) -> Arc<InMemoryProfileStore> {
    let store = InMemoryProfileStore::new();
    for record in donors {
        store.insert_donor(record).expect("donor seeds");
    }
    for record in recipients {
        store.insert_recipient(record).expect("recipient seeds");
    }
    Arc::new(store)
}

/// Default weights, pinned here so scenario assertions break loudly if the
/// defaults drift.
pub(super) fn pinned_config() -> MatchingConfig {
    let config = MatchingConfig::default();
    assert_eq!(config.weights.urgency, 0.45);
    assert_eq!(config.weights.blood_tier, 0.30);
    assert_eq!(config.weights.wait_time, 0.20);
    assert_eq!(config.weights.donor_recency, 0.05);
    assert_eq!(config.weights.tiers.identical, 1.0);
    assert_eq!(config.weights.tiers.compatible, 0.7);
    assert_eq!(config.max_claim_retries, 3);
    config
}

pub(super) fn request_for(store: &InMemoryProfileStore, id: &str) -> crate::matching::RecipientRequest {
    let record = store
        .recipient(&RecipientId(id.to_string()))
        .expect("store readable")
        .expect("recipient present");
    crate::matching::RecipientRequest::try_from(&record).expect("recipient valid")
}

pub(super) fn build_service(
    store: Arc<InMemoryProfileStore>,
) -> (
    MatchingService<InMemoryProfileStore, MemoryNotifications, MemoryAudit>,
    Arc<MemoryNotifications>,
    Arc<MemoryAudit>,
) {
    let notifications = Arc::new(MemoryNotifications::default());
    let audit = Arc::new(MemoryAudit::default());
    let service = MatchingService::new(store, notifications.clone(), audit.clone(), pinned_config())
        .with_operator_token(Some(OPERATOR_TOKEN.to_string()));
    (service, notifications, audit)
}

pub(super) fn router_for(store: Arc<InMemoryProfileStore>) -> axum::Router {
    let (service, _, _) = build_service(store);
    matching_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    notices: Mutex<Vec<MatchNotice>>,
}

impl MemoryNotifications {
    pub(super) fn notices(&self) -> Vec<MatchNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationGateway for MemoryNotifications {
    fn notify(&self, notice: MatchNotice) -> Result<(), GatewayError> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    pub(super) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditGateway for MemoryAudit {
    fn record(&self, entry: AuditEntry) -> Result<(), GatewayError> {
        self.entries
            .lock()
            .expect("audit mutex poisoned")
            .push(entry);
        Ok(())
    }
}

pub(super) struct OfflineGateway;

impl NotificationGateway for OfflineGateway {
    fn notify(&self, _notice: MatchNotice) -> Result<(), GatewayError> {
        Err(GatewayError::Transport("smtp offline".to_string()))
    }
}

impl AuditGateway for OfflineGateway {
    fn record(&self, _entry: AuditEntry) -> Result<(), GatewayError> {
        Err(GatewayError::Transport("audit sink offline".to_string()))
    }
}

/// Holds the first `parties` donor scans at a barrier so concurrent allocations
/// all observe the same pool before any of them claims.
pub(super) struct RendezvousStore {
    inner: Arc<InMemoryProfileStore>,
    barrier: Barrier,
    parties: usize,
    scans: AtomicUsize,
}

impl RendezvousStore {
    pub(super) fn new(inner: Arc<InMemoryProfileStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            parties,
            scans: AtomicUsize::new(0),
        }
    }
}

impl ProfileStore for RendezvousStore {
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        let pool = self.inner.eligible_donors(organ_type, capacity)?;
        if self.scans.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait();
        }
        Ok(pool)
    }

    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        self.inner.recipient(id)
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        self.inner.verified_recipients()
    }

    fn claim(&self, claim: ClaimRequest) -> Result<Match, StoreError> {
        self.inner.claim(claim)
    }
}

/// Fails claims for one recipient as if the database dropped the transaction.
pub(super) struct FlakyClaimStore {
    pub(super) inner: Arc<InMemoryProfileStore>,
    pub(super) failing_recipient: RecipientId,
}

impl ProfileStore for FlakyClaimStore {
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        self.inner.eligible_donors(organ_type, capacity)
    }

    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        self.inner.recipient(id)
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        self.inner.verified_recipients()
    }

    fn claim(&self, claim: ClaimRequest) -> Result<Match, StoreError> {
        if claim.recipient_id == self.failing_recipient {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.claim(claim)
    }
}

/// Lists donors without the capacity filter, as a store with a lagging index
/// would, so capacity is only enforced at claim time.
pub(super) struct CapacityBlindStore {
    pub(super) inner: Arc<InMemoryProfileStore>,
}

impl ProfileStore for CapacityBlindStore {
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        _capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        self.inner.eligible_donors(organ_type, u32::MAX)
    }

    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        self.inner.recipient(id)
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        self.inner.verified_recipients()
    }

    fn claim(&self, claim: ClaimRequest) -> Result<Match, StoreError> {
        self.inner.claim(claim)
    }
}

/// Loses every claim to a phantom concurrent allocation and counts the attempts.
pub(super) struct ContendedStore {
    pub(super) inner: Arc<InMemoryProfileStore>,
    pub(super) claims: AtomicUsize,
}

impl ContendedStore {
    pub(super) fn new(inner: Arc<InMemoryProfileStore>) -> Self {
        Self {
            inner,
            claims: AtomicUsize::new(0),
        }
    }

    pub(super) fn claims_issued(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }
}

impl ProfileStore for ContendedStore {
    fn eligible_donors(
        &self,
        organ_type: OrganType,
        capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        self.inner.eligible_donors(organ_type, capacity)
    }

    fn recipient(&self, id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        self.inner.recipient(id)
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        self.inner.verified_recipients()
    }

    fn claim(&self, _claim: ClaimRequest) -> Result<Match, StoreError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict(ClaimConflict::DonorUnavailable))
    }
}

pub(super) struct UnavailableStore;

impl ProfileStore for UnavailableStore {
    fn eligible_donors(
        &self,
        _organ_type: OrganType,
        _capacity: u32,
    ) -> Result<Vec<DonorRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn recipient(&self, _id: &RecipientId) -> Result<Option<RecipientRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn verified_recipients(&self) -> Result<Vec<RecipientRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn claim(&self, _claim: ClaimRequest) -> Result<Match, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}
