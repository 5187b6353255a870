use axum::http::StatusCode;
use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mod candidates;
mod logger;
mod migrations;
mod policy;
mod pricing;
mod reconciliation;
mod recovery_job;
mod requirements;
mod services;

use flexstart_common::bus::{
    InstanceStoppedEvent, RecoveryEventEnvelope, RecoveryEventType, StartFailureEvent,
    CHANNEL_RECOVERY_EVENTS,
};
use flexstart_providers::mock::MockCloud;
use flexstart_providers::postgres::PostgresDedupStore;
use flexstart_providers::rest::RestProvider;
use flexstart_providers::{
    DedupStore, InstanceDirectory, PolicyStore, PricingCatalog, ShapeCatalog,
};
use policy::PolicyResolver;
use reconciliation::Reconciler;
use recovery_job::{RecoveryEngine, DEFAULT_BATCH_BUDGET};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

struct AppState {
    db: Pool<Postgres>,
    engine: Arc<RecoveryEngine>,
    reconciler: Arc<Reconciler>,
}

struct CloudHandles {
    directory: Arc<dyn InstanceDirectory>,
    catalog: Arc<dyn ShapeCatalog>,
    pricing: Arc<dyn PricingCatalog>,
    policies: Arc<dyn PolicyStore>,
}

fn build_cloud() -> CloudHandles {
    let provider = std::env::var("PROVIDER").unwrap_or_else(|_| "rest".to_string());
    match provider.as_str() {
        "mock" => {
            println!("🎭 Using mock cloud provider");
            let cloud = Arc::new(MockCloud::new());
            CloudHandles {
                directory: cloud.clone(),
                catalog: cloud.clone(),
                pricing: cloud.clone(),
                policies: cloud,
            }
        }
        _ => {
            let base_url = std::env::var("CLOUD_API_URL").expect("CLOUD_API_URL must be set");
            let token = std::env::var("CLOUD_API_TOKEN").expect("CLOUD_API_TOKEN must be set");
            println!("☁️ Using REST cloud provider at {base_url}");
            let cloud = Arc::new(RestProvider::new(base_url, token));
            CloudHandles {
                directory: cloud.clone(),
                catalog: cloud.clone(),
                pricing: cloud.clone(),
                policies: cloud,
            }
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
    let redis_client = redis::Client::open(redis_url.clone()).unwrap();

    // Connect to Postgres
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    // Check connection
    sqlx::query("SELECT 1").execute(&pool).await.unwrap();
    println!("✅ Connected to Database");

    migrations::run_inline_migrations(&pool).await;

    let cloud = build_cloud();
    let region = std::env::var("CLOUD_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let budget = std::env::var("RECOVERY_BUDGET_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_BATCH_BUDGET);

    let dedup: Arc<dyn DedupStore> = Arc::new(PostgresDedupStore::new(pool.clone()));
    let resolver = PolicyResolver::new(
        cloud.policies.clone(),
        PolicyResolver::bundled_policy().expect("bundled policy must parse"),
    );
    let engine = Arc::new(
        RecoveryEngine::new(
            cloud.directory.clone(),
            cloud.catalog.clone(),
            cloud.pricing.clone(),
            dedup,
            resolver,
            region,
        )
        .with_budget(budget),
    );
    let reconciler = Arc::new(Reconciler::new(
        cloud.directory.clone(),
        cloud.catalog.clone(),
    ));

    let state = Arc::new(AppState {
        db: pool,
        engine,
        reconciler,
    });

    // Event Listener (Redis Subscriber), dedicated PubSub connection
    let mut pubsub = redis_client.get_async_pubsub().await.unwrap();
    pubsub.subscribe(CHANNEL_RECOVERY_EVENTS).await.unwrap();
    println!(
        "🎧 Orchestrator listening on Redis channel '{}'...",
        CHANNEL_RECOVERY_EVENTS
    );

    let state_redis = state.clone();
    tokio::spawn(async move {
        use futures_util::StreamExt;
        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let payload: String = msg.get_payload().unwrap_or_default();
            println!("📩 Received Event: {}", payload);

            let envelope = match serde_json::from_str::<RecoveryEventEnvelope>(&payload) {
                Ok(env) => env,
                Err(e) => {
                    eprintln!("⚠️ Malformed event envelope: {e}");
                    continue;
                }
            };

            match envelope.event_type {
                RecoveryEventType::StartFailure => {
                    match serde_json::from_value::<StartFailureEvent>(envelope.payload) {
                        Ok(event) => {
                            let state = state_redis.clone();
                            tokio::spawn(async move {
                                services::process_start_failure(
                                    state.db.clone(),
                                    &state.engine,
                                    event,
                                )
                                .await;
                            });
                        }
                        Err(e) => eprintln!("⚠️ Bad start-failure payload: {e}"),
                    }
                }
                RecoveryEventType::InstanceStopped => {
                    match serde_json::from_value::<InstanceStoppedEvent>(envelope.payload) {
                        Ok(event) => {
                            let state = state_redis.clone();
                            tokio::spawn(async move {
                                services::process_instance_stopped(
                                    state.db.clone(),
                                    &state.reconciler,
                                    event.instance_id,
                                    event.correlation_id,
                                )
                                .await;
                            });
                        }
                        Err(e) => eprintln!("⚠️ Bad instance-stopped payload: {e}"),
                    }
                }
            }
        }
    });

    // Expired dedup rows are dead weight; sweep them in the background.
    let pool_sweeper = state.db.clone();
    tokio::spawn(async move {
        dedup_sweeper_loop(pool_sweeper).await;
    });

    // HTTP server: health/debug plus direct event injection for environments
    // without a Redis bus.
    let app = Router::new()
        .route("/", get(root))
        .route("/status", get(get_status))
        .route("/events/start-failure", post(post_start_failure))
        .route("/events/instance-stopped", post(post_instance_stopped))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8001));
    println!("Orchestrator listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn root() -> &'static str {
    "Flexstart Orchestrator Online (Postgres Backed)"
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pending_dedup: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM start_instance_failures WHERE expires_at > NOW()",
    )
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    let recoveries: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM recovery_logs WHERE action_type = 'INSTANCE_RECOVERY'",
    )
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    Json(json!({
        "active_dedup_entries": pending_dedup,
        "recoveries_logged": recoveries,
    }))
    .into_response()
}

async fn post_start_failure(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StartFailureEvent>,
) -> impl IntoResponse {
    if event.instance_ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "instance_ids must not be empty"})),
        )
            .into_response();
    }

    let results = services::process_start_failure(state.db.clone(), &state.engine, event).await;
    (
        StatusCode::OK,
        Json(json!({
            "status": services::batch_status(&results),
            "results": results,
        })),
    )
        .into_response()
}

async fn post_instance_stopped(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InstanceStoppedEvent>,
) -> impl IntoResponse {
    // Reconciliation polls for minutes; acknowledge and run it off-request.
    let state = state.clone();
    tokio::spawn(async move {
        services::process_instance_stopped(
            state.db.clone(),
            &state.reconciler,
            event.instance_id,
            event.correlation_id,
        )
        .await;
    });
    (StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))).into_response()
}

async fn dedup_sweeper_loop(db: Pool<Postgres>) {
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        match sqlx::query("DELETE FROM start_instance_failures WHERE expires_at <= NOW()")
            .execute(&db)
            .await
        {
            Ok(r) if r.rows_affected() > 0 => {
                println!("🧹 Swept {} expired dedup record(s)", r.rows_affected())
            }
            Ok(_) => {}
            Err(e) => eprintln!("⚠️ Dedup sweep failed: {e}"),
        }
    }
}
