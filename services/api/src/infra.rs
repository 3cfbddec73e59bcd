use donor_match::config::MatchingSettings;
use donor_match::error::AppError;
use donor_match::matching::{
    AuditEntry, AuditGateway, GatewayError, InMemoryProfileStore, MatchNotice, MatchingService,
    NotificationGateway, RosterImporter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiMatchingService =
    MatchingService<InMemoryProfileStore, TracingNotificationGateway, TracingAuditGateway>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Delivers match notices to the structured log until a messaging adapter is wired in.
#[derive(Debug, Default, Clone)]
pub(crate) struct TracingNotificationGateway;

impl NotificationGateway for TracingNotificationGateway {
    fn notify(&self, notice: MatchNotice) -> Result<(), GatewayError> {
        info!(
            target: "donor_match_api::notifications",
            party = ?notice.party,
            match_id = %notice.match_id,
            donor_id = %notice.donor_id,
            recipient_id = %notice.recipient_id,
            organ_type = %notice.organ_type,
            "match notice dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct TracingAuditGateway;

impl AuditGateway for TracingAuditGateway {
    fn record(&self, entry: AuditEntry) -> Result<(), GatewayError> {
        let details = serde_json::to_string(&entry.details)
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        info!(
            target: "donor_match_api::audit",
            action = ?entry.action,
            actor = %entry.actor,
            recorded_at = %entry.recorded_at.to_rfc3339(),
            %details,
            "audit entry recorded"
        );
        Ok(())
    }
}

/// Builds a profile store, seeding it when both roster paths are present.
pub(crate) fn load_store(
    donors: Option<&Path>,
    recipients: Option<&Path>,
) -> Result<Arc<InMemoryProfileStore>, AppError> {
    let store = InMemoryProfileStore::new();
    match (donors, recipients) {
        (Some(donors), Some(recipients)) => {
            RosterImporter::seed(&store, donors, recipients)?;
        }
        (None, None) => info!("no rosters configured; starting with an empty profile store"),
        _ => info!("both MATCH_DONORS_CSV and MATCH_RECIPIENTS_CSV are required to seed; skipping"),
    }
    Ok(Arc::new(store))
}

pub(crate) fn matching_service(
    store: Arc<InMemoryProfileStore>,
    settings: &MatchingSettings,
) -> ApiMatchingService {
    MatchingService::new(
        store,
        Arc::new(TracingNotificationGateway),
        Arc::new(TracingAuditGateway),
        settings.engine_config(),
    )
    .with_operator_token(settings.operator_token.clone())
}
