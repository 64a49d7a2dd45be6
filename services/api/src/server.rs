use crate::cli::ServeArgs;
use crate::infra::{
    seed_portfolio, AppState, InMemoryBillingStore, InMemoryDirectory,
    InMemoryNotificationPublisher,
};
use crate::routes::with_billing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use domus_billing::billing::BillingService;
use domus_billing::config::AppConfig;
use domus_billing::error::AppError;
use domus_billing::telemetry;
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

    let store = Arc::new(InMemoryBillingStore::default());
    let directory = Arc::new(InMemoryDirectory::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    seed_portfolio(&directory, &store);
    let billing_service = Arc::new(BillingService::new(
        store,
        directory,
        notifier,
        config.billing.clone(),
    ));

    let app = with_billing_routes(billing_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "billing engine ready (demo portfolio seeded)");

    axum::serve(listener, app).await?;
    Ok(())
}
