use super::common::*;
use std::sync::Arc;

use crate::matching::domain::{RecipientId, UrgencyTier};
use crate::matching::{BatchCoordinator, FailureReason, MatchAllocator, RecipientRecord};

fn coordinator_for(
    store: Arc<crate::matching::InMemoryProfileStore>,
) -> BatchCoordinator<crate::matching::InMemoryProfileStore> {
    let allocator = Arc::new(MatchAllocator::new(store.clone(), pinned_config()));
    BatchCoordinator::new(store, allocator)
}

fn failure_for<'a>(
    failures: &'a [crate::matching::BatchFailure],
    id: &str,
) -> &'a FailureReason {
    &failures
        .iter()
        .find(|failure| failure.recipient_id.0 == id)
        .unwrap_or_else(|| panic!("no failure recorded for {id}"))
        .reason
}

#[test]
fn run_all_matches_backlog_and_is_idempotent() {
    let store = seeded_store(
        vec![
            donor("d-1", "O-", &["kidney"], 30),
            donor("d-2", "A+", &["red_cells"], 60),
        ],
        vec![
            recipient("r-1", "kidney", "B+", UrgencyTier::High, 10),
            recipient("r-2", "red_cells", "AB+", UrgencyTier::Medium, 10),
            recipient("r-3", "lung", "O+", UrgencyTier::Critical, 10),
        ],
    );
    let coordinator = coordinator_for(store.clone());

    let first = coordinator.run_all_at(now()).expect("batch runs");
    assert_eq!(first.created, 2);
    assert_eq!(first.total_eligible, 3);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(failure_for(&first.failures, "r-3"), &FailureReason::NoCandidate);

    let second = coordinator.run_all_at(now()).expect("batch re-runs");
    assert_eq!(second.created, 0);
    assert_eq!(second.total_eligible, 1);
    assert_eq!(store.matches().expect("matches").len(), 2);
}

#[test]
fn most_urgent_recipient_claims_scarce_donor_first() {
    let store = seeded_store(
        vec![donor("d-1", "O-", &["kidney"], 30)],
        vec![
            recipient("r-early-low", "kidney", "O-", UrgencyTier::Low, 300),
            recipient("r-late-critical", "kidney", "O-", UrgencyTier::Critical, 2),
            recipient("r-mid-critical", "kidney", "O-", UrgencyTier::Critical, 40),
        ],
    );

    let summary = coordinator_for(store).run_all_at(now()).expect("batch runs");

    assert_eq!(summary.created, 1);
    assert_eq!(
        summary.matches[0].recipient_id,
        RecipientId("r-mid-critical".to_string())
    );
    assert_eq!(summary.failures.len(), 2);
}

#[test]
fn malformed_recipient_is_reported_without_stopping_the_run() {
    let malformed = RecipientRecord {
        blood_group: "Z+".to_string(),
        ..recipient("r-bad", "kidney", "", UrgencyTier::Critical, 50)
    };
    let store = seeded_store(
        vec![donor("d-1", "O-", &["kidney"], 30)],
        vec![
            malformed,
            recipient("r-good", "kidney", "A-", UrgencyTier::Low, 5),
        ],
    );

    let summary = coordinator_for(store).run_all_at(now()).expect("batch runs");

    assert_eq!(summary.created, 1);
    assert_eq!(summary.total_eligible, 2);
    match failure_for(&summary.failures, "r-bad") {
        FailureReason::Validation { detail } => assert!(detail.contains("Z+")),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn storage_fault_for_one_recipient_is_isolated() {
    let inner = seeded_store(
        vec![
            donor("d-1", "O-", &["kidney"], 30),
            donor("d-2", "O-", &["kidney"], 45),
        ],
        vec![
            recipient("r-1", "kidney", "A+", UrgencyTier::Critical, 10),
            recipient("r-2", "kidney", "A+", UrgencyTier::High, 10),
        ],
    );
    let store = Arc::new(FlakyClaimStore {
        inner: inner.clone(),
        failing_recipient: RecipientId("r-1".to_string()),
    });
    let allocator = Arc::new(MatchAllocator::new(store.clone(), pinned_config()));
    let coordinator = BatchCoordinator::new(store, allocator);

    let summary = coordinator.run_all_at(now()).expect("batch runs");

    assert_eq!(summary.created, 1);
    assert_eq!(summary.matches[0].recipient_id.0, "r-2");
    assert!(matches!(
        failure_for(&summary.failures, "r-1"),
        FailureReason::Infrastructure { .. }
    ));
}

#[test]
fn unreadable_backlog_fails_the_run() {
    let allocator = Arc::new(MatchAllocator::new(
        Arc::new(UnavailableStore),
        pinned_config(),
    ));
    let coordinator = BatchCoordinator::new(Arc::new(UnavailableStore), allocator);
    assert!(coordinator.run_all_at(now()).is_err());
}

#[test]
fn batch_summary_serializes_failure_kinds() {
    let store = seeded_store(
        Vec::new(),
        vec![recipient("r-1", "bone_marrow", "A+", UrgencyTier::High, 3)],
    );
    let summary = coordinator_for(store).run_all_at(now()).expect("batch runs");

    let payload = serde_json::to_value(&summary).expect("summary serializes");
    assert_eq!(payload["created"], 0);
    assert_eq!(payload["total_eligible"], 1);
    assert_eq!(payload["failures"][0]["reason"]["kind"], "no_candidate");
}
