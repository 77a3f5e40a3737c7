use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{DefaultPolicyEvaluator, PolicyEvaluator};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::pickup::PickupConfig;
use crate::routes::{auth, codes, health, withdrawals};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub pickup: Arc<PickupConfig>,
    pub event_bus: EventBus,
    pub policy: Arc<dyn PolicyEvaluator>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtConfig,
        pickup: PickupConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            pickup: Arc::new(pickup),
            event_bus,
            policy: Arc::new(DefaultPolicyEvaluator::new()),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let pickup_config = PickupConfig::from_env()?;

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, pickup_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let code_routes = Router::new()
        .route("/", post(codes::create_code))
        .route("/:code", get(codes::inspect_code))
        .route("/:code/consume", post(codes::consume_code));

    let withdrawal_routes = Router::new()
        .route("/", get(withdrawals::list_withdrawals))
        .route("/manual", post(withdrawals::manual_override));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/pickup-codes", code_routes)
        .nest("/withdrawals", withdrawal_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
