use crate::cli::ServeArgs;
use crate::infra::{load_store, matching_service, AppState};
use crate::routes::with_matching_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use donor_match::config::AppConfig;
use donor_match::error::AppError;
use donor_match::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = load_store(
        config.matching.donors_csv.as_deref(),
        config.matching.recipients_csv.as_deref(),
    )?;
    if config.matching.operator_token.is_none() {
        warn!("MATCH_OPERATOR_TOKEN unset; batch allocation requests will be refused");
    }
    let service = Arc::new(matching_service(store, &config.matching));

    let app = with_matching_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "donor matching service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
