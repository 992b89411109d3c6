use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::Extension,
    routing::{delete, get, post},
};
use serde::Serialize;
use sysinfo::System;
use workmarket::config::Config;
use workmarket::dispatch::aggregator::Aggregator;
use workmarket::dispatch::allocator::Allocator;
use workmarket::dispatch::handlers::{
    handle_next_chunk, handle_record_chunk, handle_record_progress,
};
use workmarket::dispatch::protocol::{
    ENDPOINT_NEXT_CHUNK, ENDPOINT_RECORD_CHUNK, ENDPOINT_RECORD_PROGRESS,
};
use workmarket::dispatch::settler::Settler;
use workmarket::liveness::handlers::{handle_heartbeat, handle_worker_online};
use workmarket::liveness::protocol::{ENDPOINT_HEARTBEAT, ENDPOINT_WORKER_ONLINE};
use workmarket::liveness::tracker::HeartbeatTracker;
use workmarket::store::memory::MarketStore;
use workmarket::tasks::handlers::{
    handle_claim_task, handle_create_task, handle_delete_task, handle_drop_task,
    handle_list_tasks, handle_reinvoke_task, handle_revoke_task, handle_task_results,
};
use workmarket::tasks::protocol::{
    ENDPOINT_TASKS, ENDPOINT_TASK_CLAIM, ENDPOINT_TASK_DROP, ENDPOINT_TASK_REINVOKE,
    ENDPOINT_TASK_RESULTS, ENDPOINT_TASK_REVOKE,
};
use workmarket::tasks::service::TaskService;
use workmarket::tasks::types::now_ms;
use workmarket::wallet::handlers::{
    handle_create_checkout_session, handle_deposit, handle_me, handle_stripe_webhook,
    handle_withdraw,
};
use workmarket::wallet::ledger::WalletLedger;
use workmarket::wallet::protocol::{
    ENDPOINT_ME, ENDPOINT_STRIPE_CHECKOUT, ENDPOINT_STRIPE_WEBHOOK, ENDPOINT_WALLET_DEPOSIT,
    ENDPOINT_WALLET_WITHDRAW,
};
use workmarket::wallet::stripe::StripeClient;

use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Arc::new(Config::from_env());
    tracing::info!("Starting marketplace node on {}", config.bind_addr);
    tokio::fs::create_dir_all(&config.data_dir).await?;

    // 1. State store and accounting:
    let store = MarketStore::new();
    let ledger = WalletLedger::new(store.clone(), &config);
    let stripe = StripeClient::new(&config);

    // 2. Liveness and task lifecycle:
    let tracker = HeartbeatTracker::new(config.worker_timeout_ms);
    let tasks = TaskService::new(store.clone(), config.clone(), tracker.clone());

    // 3. Dispatch engine:
    let allocator = Allocator::new(store.clone(), config.clone(), ledger.clone());
    let settler = Settler::new(ledger.clone());
    let aggregator = Aggregator::new(
        store.clone(),
        tasks.clone(),
        allocator.clone(),
        settler.clone(),
    );

    // 4. HTTP Router:
    let app = Router::new()
        .route("/health/routes", get(handle_routes))
        .route("/health/stats", get(handle_stats))
        // Wallet routes
        .route(ENDPOINT_ME, get(handle_me))
        .route(ENDPOINT_WALLET_DEPOSIT, post(handle_deposit))
        .route(ENDPOINT_WALLET_WITHDRAW, post(handle_withdraw))
        .route(ENDPOINT_STRIPE_CHECKOUT, post(handle_create_checkout_session))
        .route(ENDPOINT_STRIPE_WEBHOOK, post(handle_stripe_webhook))
        // Task routes
        .route(ENDPOINT_TASKS, post(handle_create_task).get(handle_list_tasks))
        .route(ENDPOINT_TASK_CLAIM, post(handle_claim_task))
        .route(ENDPOINT_TASK_DROP, post(handle_drop_task))
        .route(ENDPOINT_TASK_REVOKE, post(handle_revoke_task))
        .route(ENDPOINT_TASK_REINVOKE, post(handle_reinvoke_task))
        .route("/api/tasks/:id", delete(handle_delete_task))
        .route(ENDPOINT_TASK_RESULTS, get(handle_task_results))
        // Worker routes
        .route(ENDPOINT_NEXT_CHUNK, post(handle_next_chunk))
        .route(ENDPOINT_RECORD_PROGRESS, post(handle_record_progress))
        .route(ENDPOINT_RECORD_CHUNK, post(handle_record_chunk))
        .route(ENDPOINT_HEARTBEAT, post(handle_heartbeat))
        .route(ENDPOINT_WORKER_ONLINE, get(handle_worker_online))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(config.clone()))
        .layer(Extension(store.clone()))
        .layer(Extension(ledger.clone()))
        .layer(Extension(stripe.clone()))
        .layer(Extension(tracker.clone()))
        .layer(Extension(tasks.clone()))
        .layer(Extension(allocator.clone()))
        .layer(Extension(aggregator.clone()));

    // 5. Spawn sweep loops. Lease expiry is detected lazily on every call
    // that touches a task; these ticks only shorten result latency.
    let sweep_tracker = tracker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweep_tracker.sweep(now_ms());
        }
    });

    let sweep_allocator = allocator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweep_allocator.sweep_all_expired().await;
        }
    });

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct RoutesResponse {
    routes: Vec<&'static str>,
}

#[derive(Serialize)]
struct NodeStatsResponse {
    tasks: usize,
    tasks_queued: usize,
    tasks_processing: usize,
    tasks_completed: usize,
    tasks_failed: usize,
    chunk_results: usize,
    chunk_assignments: usize,
    users: usize,
    wallet_transactions: usize,
    platform_earnings: f64,
    workers_online: usize,
    cpu_usage: f32,
    mem_used_mb: u64,
    mem_total_mb: u64,
}

async fn handle_routes() -> axum::Json<RoutesResponse> {
    axum::Json(RoutesResponse {
        routes: vec![
            "/health/routes",
            "/health/stats",
            "/api/me",
            "/api/wallet/deposit",
            "/api/wallet/withdraw",
            "/api/stripe/create-checkout-session",
            "/api/stripe/webhook",
            "/api/tasks",
            "/api/tasks/:id",
            "/api/tasks/:id/claim",
            "/api/tasks/:id/drop",
            "/api/tasks/:id/revoke",
            "/api/tasks/:id/reinvoke",
            "/api/tasks/:id/results",
            "/api/worker/next-chunk",
            "/api/worker/record-progress",
            "/api/worker/record-chunk",
            "/api/worker/heartbeat",
            "/api/worker/online/:id",
        ],
    })
}

async fn handle_stats(
    Extension(store): Extension<Arc<MarketStore>>,
    Extension(ledger): Extension<Arc<WalletLedger>>,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
) -> axum::Json<NodeStatsResponse> {
    let (queued, processing, completed, failed) = store.task_status_counts();
    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();
    let cpu_usage = sys.global_cpu_info().cpu_usage();
    // sysinfo returns bytes for memory values.
    let mem_total_mb = sys.total_memory() / (1024 * 1024);
    let mem_used_mb = sys.used_memory() / (1024 * 1024);

    axum::Json(NodeStatsResponse {
        tasks: store.tasks.len(),
        tasks_queued: queued,
        tasks_processing: processing,
        tasks_completed: completed,
        tasks_failed: failed,
        chunk_results: store.chunk_results.len(),
        chunk_assignments: store.chunk_assignments.len(),
        users: store.users.len(),
        wallet_transactions: store.wallet_transactions.len(),
        platform_earnings: ledger.platform_snapshot().total_earnings.to_major(),
        workers_online: tracker.online_count(),
        cpu_usage,
        mem_used_mb,
        mem_total_mb,
    })
}
