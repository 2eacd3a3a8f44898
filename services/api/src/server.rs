use crate::cli::ServeArgs;
use crate::demo::seeded_store;
use crate::infra::{AppState, LoggingSender, UnconfiguredGenerator};
use crate::routes::with_automation_routes;
use crate::scheduler::spawn_scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use counsel_flow::config::AppConfig;
use counsel_flow::error::AppError;
use counsel_flow::telemetry;
use counsel_flow::workflows::automation::{AutomationService, InMemoryStore};
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

    let store = if args.seed_demo {
        seeded_store(Utc::now())
    } else {
        InMemoryStore::new()
    };
    let service = Arc::new(AutomationService::new(
        Arc::new(store),
        Arc::new(LoggingSender::default()),
        Arc::new(UnconfiguredGenerator),
        config.automation.clone(),
    ));

    let _scheduler = config
        .scheduler
        .interval
        .map(|every| spawn_scheduler(service.clone(), every));

    let app = with_automation_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "counsel flow automation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
