use super::common::*;
use std::sync::Arc;
use std::thread;

use crate::matching::domain::{Availability, DonorId, RequestStatus, UrgencyTier};
use crate::matching::{
    AllocationError, AllocationOutcome, CapacityPolicy, ClaimConflict, ClaimRequest,
    Compatibility, InMemoryProfileStore, MatchAllocator, MatchingConfig, OrganType, ProfileStore,
    RecipientId, ScoringWeights, StoreError,
};

fn kidney_scenario() -> Arc<crate::matching::InMemoryProfileStore> {
    seeded_store(
        vec![
            donor("D1", "O-", &["kidney"], 10),
            donor("D2", "AB+", &["kidney"], 200),
        ],
        vec![recipient("R1", "kidney", "AB+", UrgencyTier::Critical, 30)],
    )
}

#[test]
fn identical_group_outranks_universal_donor() {
    let store = kidney_scenario();
    let allocator = MatchAllocator::new(store.clone(), pinned_config());
    let request = request_for(&store, "R1");

    let ranked = allocator.rank(&request, now()).expect("rank succeeds");
    let order: Vec<&str> = ranked.iter().map(|c| c.donor.id.0.as_str()).collect();
    assert_eq!(order, vec!["D2", "D1"]);
    assert_eq!(ranked[0].compatibility, Compatibility::Identical);
    assert_eq!(ranked[1].compatibility, Compatibility::Compatible);

    let expected_d2 = 0.45 + 0.30 + 0.20 + 0.05 * (1.0 - 200.0 / 365.0);
    let expected_d1 = 0.45 + 0.30 * 0.7 + 0.20 + 0.05 * (1.0 - 10.0 / 365.0);
    assert!((ranked[0].score.total - expected_d2).abs() < 1e-9);
    assert!((ranked[1].score.total - expected_d1).abs() < 1e-9);

    let outcome = allocator
        .allocate_at(&request, now())
        .expect("allocation runs");
    let record = outcome.matched().expect("R1 is matched");
    assert_eq!(record.donor_id, DonorId("D2".to_string()));
    assert_eq!(record.organ_type, OrganType::Kidney);
    assert!((record.score - expected_d2).abs() < 1e-9);
}

#[test]
fn flattening_blood_tiers_lets_recency_decide() {
    let store = kidney_scenario();
    let mut weights = ScoringWeights::default();
    weights.tiers.compatible = 1.0;
    let config = MatchingConfig {
        weights,
        ..MatchingConfig::default()
    };
    let allocator = MatchAllocator::new(store.clone(), config);

    let ranked = allocator
        .rank(&request_for(&store, "R1"), now())
        .expect("rank succeeds");
    assert_eq!(ranked[0].donor.id, DonorId("D1".to_string()));
}

#[test]
fn equal_scores_fall_back_to_lowest_donor_id() {
    let store = seeded_store(
        vec![
            donor("d-b", "A+", &["lung"], 40),
            donor("d-a", "A+", &["lung"], 40),
        ],
        vec![recipient("r-1", "lung", "A+", UrgencyTier::High, 5)],
    );
    let allocator = MatchAllocator::new(store.clone(), pinned_config());
    let request = request_for(&store, "r-1");

    let first = allocator.rank(&request, now()).expect("rank");
    let second = allocator.rank(&request, now()).expect("rank");
    assert_eq!(first, second);
    assert_eq!(first[0].donor.id, DonorId("d-a".to_string()));
    assert_eq!(first[0].score.total, first[1].score.total);
}

#[test]
fn empty_platelet_pool_leaves_store_untouched() {
    let mut paused = donor("d-paused", "B+", &["platelets"], 20);
    paused.availability = Availability::Paused;
    let mut unverified = donor("d-unverified", "B+", &["platelets"], 20);
    unverified.verified = false;

    let store = seeded_store(
        vec![paused, unverified, donor("d-kidney", "B+", &["kidney"], 20)],
        vec![recipient("R2", "blood_platelets", "B+", UrgencyTier::High, 3)],
    );
    let donors_before = store.donors().expect("donors readable");
    let allocator = MatchAllocator::new(store.clone(), pinned_config());

    let outcome = allocator
        .allocate_at(&request_for(&store, "R2"), now())
        .expect("allocation runs");

    assert_eq!(outcome, AllocationOutcome::NoCandidate);
    assert!(store.matches().expect("matches readable").is_empty());
    assert_eq!(store.donors().expect("donors readable"), donors_before);
    assert_eq!(request_for(&store, "R2").status, RequestStatus::Verified);
}

#[test]
fn renewable_donor_serves_several_recipients_up_to_capacity() {
    let store = seeded_store(
        vec![donor("d-1", "AB+", &["plasma"], 15)],
        vec![
            recipient("r-1", "plasma", "O+", UrgencyTier::High, 9),
            recipient("r-2", "plasma", "A-", UrgencyTier::High, 8),
            recipient("r-3", "plasma", "B+", UrgencyTier::High, 7),
        ],
    );
    let config = MatchingConfig {
        capacity: CapacityPolicy::new(1).with_override(OrganType::Plasma, 2),
        ..pinned_config()
    };
    let allocator = MatchAllocator::new(store.clone(), config);

    for id in ["r-1", "r-2"] {
        let outcome = allocator
            .allocate_at(&request_for(&store, id), now())
            .expect("allocation runs");
        assert!(outcome.matched().is_some(), "{id} should be matched");
    }

    let third = allocator
        .allocate_at(&request_for(&store, "r-3"), now())
        .expect("allocation runs");
    assert_eq!(third, AllocationOutcome::NoCandidate);
    assert_eq!(store.matches().expect("matches").len(), 2);
}

#[test]
fn concurrent_allocations_never_share_a_solid_organ_donor() {
    let inner = seeded_store(
        vec![donor("d-1", "O-", &["kidney"], 30)],
        vec![
            recipient("r-1", "kidney", "A+", UrgencyTier::Critical, 12),
            recipient("r-2", "kidney", "B+", UrgencyTier::Critical, 11),
        ],
    );
    let store = Arc::new(RendezvousStore::new(inner.clone(), 2));
    let allocator = MatchAllocator::new(store, pinned_config());
    let first = request_for(&inner, "r-1");
    let second = request_for(&inner, "r-2");

    let outcomes: Vec<AllocationOutcome> = thread::scope(|scope| {
        let handles = [&first, &second].map(|request| {
            let allocator = &allocator;
            scope.spawn(move || allocator.allocate_at(request, now()).expect("allocation runs"))
        });
        handles
            .into_iter()
            .map(|handle| handle.join().expect("allocation thread panicked"))
            .collect()
    });

    let matched = outcomes.iter().filter(|o| o.matched().is_some()).count();
    assert_eq!(matched, 1);
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        AllocationOutcome::Conflict {
            attempts: 1,
            reason: ClaimConflict::DonorUnavailable,
        }
    )));
    assert_eq!(inner.matches().expect("matches").len(), 1);
}

#[test]
fn losing_a_race_falls_back_to_the_next_donor() {
    let inner = seeded_store(
        vec![
            donor("d-best", "A+", &["kidney"], 30),
            donor("d-next", "O+", &["kidney"], 30),
        ],
        vec![
            recipient("r-1", "kidney", "A+", UrgencyTier::High, 12),
            recipient("r-2", "kidney", "A+", UrgencyTier::High, 11),
        ],
    );
    let store = Arc::new(RendezvousStore::new(inner.clone(), 2));
    let allocator = MatchAllocator::new(store, pinned_config());
    let first = request_for(&inner, "r-1");
    let second = request_for(&inner, "r-2");

    let outcomes: Vec<AllocationOutcome> = thread::scope(|scope| {
        let handles = [&first, &second].map(|request| {
            let allocator = &allocator;
            scope.spawn(move || allocator.allocate_at(request, now()).expect("allocation runs"))
        });
        handles
            .into_iter()
            .map(|handle| handle.join().expect("allocation thread panicked"))
            .collect()
    });

    let mut donors: Vec<String> = outcomes
        .iter()
        .map(|outcome| outcome.matched().expect("both recipients matched").donor_id.0.clone())
        .collect();
    donors.sort();
    assert_eq!(donors, vec!["d-best", "d-next"]);
}

#[test]
fn stale_recipient_snapshot_reports_conflict_without_retrying() {
    let store = seeded_store(
        vec![
            donor("d-1", "O-", &["lung"], 30),
            donor("d-2", "O-", &["lung"], 60),
        ],
        vec![recipient("r-1", "lung", "O-", UrgencyTier::Medium, 20)],
    );
    let allocator = MatchAllocator::new(store.clone(), pinned_config());
    let snapshot = request_for(&store, "r-1");

    allocator
        .allocate_at(&snapshot, now())
        .expect("first allocation")
        .matched()
        .expect("first allocation matches");

    match allocator.allocate_at(&snapshot, now()).expect("second allocation") {
        AllocationOutcome::Conflict { attempts, reason } => {
            assert_eq!(attempts, 1);
            assert_eq!(
                reason,
                ClaimConflict::RecipientNotEligible {
                    status: RequestStatus::Matched
                }
            );
        }
        other => panic!("expected recipient conflict, got {other:?}"),
    }
    assert_eq!(store.matches().expect("matches").len(), 1);
}

#[test]
fn storage_faults_surface_as_errors() {
    let seeded = seeded_store(
        Vec::new(),
        vec![recipient("r-1", "kidney", "A+", UrgencyTier::Low, 1)],
    );
    let request = request_for(&seeded, "r-1");
    let allocator = MatchAllocator::new(Arc::new(UnavailableStore), pinned_config());

    match allocator.allocate_at(&request, now()) {
        Err(AllocationError::Store(StoreError::Unavailable(_))) => {}
        other => panic!("expected storage error, got {other:?}"),
    }
}

fn plasma_heavy_config() -> MatchingConfig {
    MatchingConfig {
        capacity: CapacityPolicy::new(1).with_override(OrganType::Plasma, 3),
        ..pinned_config()
    }
}

/// Three identical-group donors each holding one plasma match, plus a free
/// kidney-only donor ranked below them.
fn donors_busy_with_plasma() -> Arc<InMemoryProfileStore> {
    let store = seeded_store(
        vec![
            donor("d-a", "A+", &["kidney", "plasma"], 30),
            donor("d-b", "A+", &["kidney", "plasma"], 30),
            donor("d-c", "A+", &["kidney", "plasma"], 30),
            donor("d-free", "O+", &["kidney"], 30),
        ],
        vec![
            recipient("p-a", "plasma", "A+", UrgencyTier::Medium, 5),
            recipient("p-b", "plasma", "A+", UrgencyTier::Medium, 5),
            recipient("p-c", "plasma", "A+", UrgencyTier::Medium, 5),
            recipient("r-kidney", "kidney", "A+", UrgencyTier::Critical, 20),
        ],
    );
    for (donor_id, recipient_id) in [("d-a", "p-a"), ("d-b", "p-b"), ("d-c", "p-c")] {
        store
            .claim(ClaimRequest {
                donor_id: DonorId(donor_id.to_string()),
                recipient_id: RecipientId(recipient_id.to_string()),
                organ_type: OrganType::Plasma,
                score: 0.5,
                capacity: 3,
                claimed_at: now(),
            })
            .expect("plasma claim commits");
    }
    store
}

#[test]
fn donor_busy_with_another_product_is_not_offered_for_a_solid_organ() {
    let store = seeded_store(
        vec![donor("d-multi", "O-", &["kidney", "plasma"], 30)],
        vec![
            recipient("r-plasma", "plasma", "O-", UrgencyTier::High, 10),
            recipient("r-kidney", "kidney", "A+", UrgencyTier::Critical, 10),
        ],
    );
    let allocator = MatchAllocator::new(store.clone(), plasma_heavy_config());

    allocator
        .allocate_at(&request_for(&store, "r-plasma"), now())
        .expect("plasma allocation runs")
        .matched()
        .expect("plasma recipient matched");
    let donor_after = store
        .donor(&DonorId("d-multi".to_string()))
        .expect("store readable")
        .expect("donor present");
    assert_eq!(donor_after.availability, Availability::Active);

    let kidney = request_for(&store, "r-kidney");
    assert!(allocator.rank(&kidney, now()).expect("rank succeeds").is_empty());
    assert_eq!(
        allocator.allocate_at(&kidney, now()).expect("kidney allocation runs"),
        AllocationOutcome::NoCandidate
    );
}

#[test]
fn busy_donors_do_not_starve_a_free_one() {
    let store = donors_busy_with_plasma();
    let allocator = MatchAllocator::new(store.clone(), plasma_heavy_config());

    let outcome = allocator
        .allocate_at(&request_for(&store, "r-kidney"), now())
        .expect("allocation runs");
    let record = outcome.matched().expect("kidney recipient matched");
    assert_eq!(record.donor_id, DonorId("d-free".to_string()));
}

#[test]
fn capacity_refusals_at_claim_time_do_not_spend_attempts() {
    let inner = donors_busy_with_plasma();
    let store = Arc::new(CapacityBlindStore {
        inner: inner.clone(),
    });
    let allocator = MatchAllocator::new(store, plasma_heavy_config());
    let request = request_for(&inner, "r-kidney");

    let ranked = allocator.rank(&request, now()).expect("rank succeeds");
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[3].donor.id, DonorId("d-free".to_string()));

    let outcome = allocator.allocate_at(&request, now()).expect("allocation runs");
    let record = outcome.matched().expect("kidney recipient matched");
    assert_eq!(record.donor_id, DonorId("d-free".to_string()));
}

fn contended_pool() -> Arc<InMemoryProfileStore> {
    seeded_store(
        (1..=5)
            .map(|n| donor(&format!("d-{n}"), "O-", &["kidney"], 30 + n))
            .collect(),
        vec![recipient("r-1", "kidney", "B+", UrgencyTier::High, 14)],
    )
}

#[test]
fn contention_stops_at_the_configured_retry_bound() {
    let inner = contended_pool();
    let request = request_for(&inner, "r-1");

    let store = Arc::new(ContendedStore::new(inner.clone()));
    let allocator = MatchAllocator::new(store.clone(), pinned_config());
    assert_eq!(
        allocator.allocate_at(&request, now()).expect("allocation runs"),
        AllocationOutcome::Conflict {
            attempts: 3,
            reason: ClaimConflict::DonorUnavailable,
        }
    );
    assert_eq!(store.claims_issued(), 3);

    let store = Arc::new(ContendedStore::new(inner.clone()));
    let single_shot = MatchingConfig {
        max_claim_retries: 1,
        ..pinned_config()
    };
    let allocator = MatchAllocator::new(store.clone(), single_shot);
    assert_eq!(
        allocator.allocate_at(&request, now()).expect("allocation runs"),
        AllocationOutcome::Conflict {
            attempts: 1,
            reason: ClaimConflict::DonorUnavailable,
        }
    );
    assert_eq!(store.claims_issued(), 1);
    assert!(inner.matches().expect("matches").is_empty());
}
