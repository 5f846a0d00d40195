use crate::cli::ServeArgs;
use crate::infra::{AppState, LoggingNotifier};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use partner_onboarding::config::AppConfig;
use partner_onboarding::error::AppError;
use partner_onboarding::telemetry;
use partner_onboarding::workflows::onboarding::{
    InMemoryApplicationRepository, InMemoryBlobStore, OnboardingService,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(OnboardingService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
        Arc::new(LoggingNotifier),
        config.onboarding.clone(),
    ));
    let notification_worker = service.spawn_notification_worker();

    let app = with_onboarding_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        token_ttl_hours = config.onboarding.token_ttl_hours,
        notify_poll_secs = config.onboarding.notification_poll_secs,
        "partner onboarding service ready"
    );

    let served = axum::serve(listener, app).await;
    notification_worker.shutdown().await;
    served?;
    Ok(())
}
