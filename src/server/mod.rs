//! Task protocol server.
//!
//! One server instance hosts one agent role: a public `card` route for
//! discovery plus the authenticated task routes. The worker adapter and the
//! task repository are injected so tests can run the full HTTP surface with
//! stub workers and the orchestrator can target real agent processes.

pub mod repository;
pub mod routes;
pub mod security;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::error::ProtocolError;
use crate::protocol::AgentCard;
use crate::worker::WorkerAdapter;

pub use repository::{InMemoryTaskRepository, TaskRepository};
pub use security::{RateLimiter, SecurityConfig};

/// Shared state for one server instance.
#[derive(Clone)]
pub struct AppState {
    /// Capability descriptor served on the public route.
    pub card: Arc<AgentCard>,
    /// Role definition prepended to every worker prompt.
    pub role_context: Arc<str>,
    /// Task storage.
    pub repository: Arc<dyn TaskRepository>,
    /// External worker bridge.
    pub worker: Arc<dyn WorkerAdapter>,
    /// Security policy applied to mutating routes.
    pub security: Arc<SecurityConfig>,
    /// Sliding-window limiter shared across requests.
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl AppState {
    pub fn new(
        card: AgentCard,
        role_context: impl Into<String>,
        repository: Arc<dyn TaskRepository>,
        worker: Arc<dyn WorkerAdapter>,
        security: SecurityConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            security.requests_per_minute,
            security.requests_per_hour,
        );
        Self {
            card: Arc::new(card),
            role_context: role_context.into().into(),
            repository,
            worker,
            security: Arc::new(security),
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProtocolError::InvalidTaskId(_) | ProtocolError::DangerousInput(_) => {
                StatusCode::BAD_REQUEST
            }
            ProtocolError::MissingApiKey => StatusCode::UNAUTHORIZED,
            ProtocolError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProtocolError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ProtocolError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ProtocolError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Builds the CORS layer from the configured allow-list.
///
/// An empty list emits no CORS headers at all, which keeps browsers out
/// without affecting agent-to-agent traffic.
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-client-id"),
        ])
}

/// Builds the router: public card route plus guarded task routes.
pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/tasks", post(routes::submit_task))
        .route("/tasks/:id", get(routes::get_task))
        .route("/tasks/:id/cancel", post(routes::cancel_task))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security::security_middleware,
        ));

    Router::new()
        .route("/card", get(routes::get_card))
        .merge(guarded)
        .layer(cors_layer(&state.security))
        .with_state(state)
}

/// Binds and serves one agent role until the process is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let host_addr: std::net::IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind host '{}': {}", host, e))?;
    let addr = SocketAddr::from((host_addr, port));

    let name = state.card.name.clone();
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(agent = %name, %addr, "task protocol server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
