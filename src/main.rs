use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lab_reservation::approval::ApprovalService;
use lab_reservation::audit::AuditRecorder;
use lab_reservation::config::Config;
use lab_reservation::dashboard::admin_dashboard;
use lab_reservation::database::{self, SqliteStore};
use lab_reservation::gateway::{GatewayConfig, ReservationGateway};
use lab_reservation::models::{Actor, RequestStatus, UserRole};
use lab_reservation::query::{
    query, PageRequest, QueryContext, QueryCriteria, RequestFacet, RequestSortField, SortSpec,
};
use lab_reservation::seed;
use lab_reservation::traits::{Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lab reservation service");

    let db = database::init(&config.database_url).await?;
    database::migrate(&db).await?;

    let store = Arc::new(SqliteStore::new(db));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let today = clock.today(config.timezone);
    let recorder = AuditRecorder::new(
        Actor::new("system", UserRole::Admin),
        "127.0.0.1",
        "server",
    );

    if seed::seed_if_empty(&*store, &*store, &*store, &*clock, &recorder, today).await? {
        info!("Seeded sample data");
    }

    let approvals = ApprovalService::new(store.clone(), clock.clone(), config.timezone);
    let gateway = ReservationGateway::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        approvals,
        GatewayConfig::from(&config),
    );

    let requests = gateway.list_requests().await?;
    let labs = gateway.list_labs().await?;
    let audit = gateway.list_audit_entries().await?;
    let ctx = QueryContext::new(config.timezone, today);

    let dashboard = admin_dashboard(&requests, &labs, &audit, &ctx, 5);
    info!(
        "Labs: {}/{} available; requests: {} pending, {} approved, {} rejected, {} cancelled",
        dashboard.labs_available,
        dashboard.labs_total,
        dashboard.counts.pending,
        dashboard.counts.approved,
        dashboard.counts.rejected,
        dashboard.counts.cancelled
    );
    info!("Sessions today: {}", dashboard.todays_sessions.len());

    let pending = query(
        &requests,
        &QueryCriteria::new().facet(RequestFacet::Status(RequestStatus::Pending)),
        SortSpec::desc(RequestSortField::RequestedOn),
        PageRequest::first(config.requests_page_size),
        &ctx,
    );
    for request in &pending.visible {
        info!(
            "Pending #{}: {} / {} {} ({})",
            request.id, request.lab_name, request.date, request.time_slot, request.requester_name
        );
    }
    if pending.total_pages > 1 {
        warn!(
            "{} more pending request(s) not shown",
            pending.total_count - pending.visible.len()
        );
    }

    info!("Lab reservation service shutting down");
    Ok(())
}
