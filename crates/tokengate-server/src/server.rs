use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, Request, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokengate_auth::{
    AuthError, AuthState, BearerAuth, ClaimSet, ConfigError, Jwks, TokenParser, TokenService,
    authenticate, refresh_token,
};
use tokengate_auth_memory::InMemoryBlacklist;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Wires the token service, the in-memory blacklist and the request parser
/// from configuration.
pub fn build_state(cfg: &AppConfig) -> Result<AppState, ConfigError> {
    let blacklist = Arc::new(InMemoryBlacklist::with_purge_every_writes(
        cfg.auth.blacklist.purge_every_writes,
    ));
    let service = cfg.auth.build_service(blacklist)?;
    let parser = TokenParser::from_config(&cfg.auth.parser)?;

    Ok(AppState {
        auth: AuthState::new(Arc::new(service)).with_parser(parser),
    })
}

pub fn build_router(state: AppState) -> Router {
    let refresh = Router::new()
        .route("/auth/refresh", post(refreshed))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            refresh_token,
        ));

    let protected = Router::new()
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authenticate,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/auth/logout", post(logout))
        .merge(refresh)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn build_app(cfg: &AppConfig) -> Result<Router, ConfigError> {
    Ok(build_router(build_state(cfg)?))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn jwks(State(state): State<AppState>) -> Json<Jwks> {
    Json(state.auth.service.jwks())
}

/// The new token travels in the `Authorization` response header.
async fn refreshed(BearerAuth(auth): BearerAuth) -> Json<Value> {
    Json(json!({
        "token_type": "Bearer",
        "sub": auth.subject(),
        "jti": auth.token_id(),
        "expires_at": auth.expires_at(),
    }))
}

async fn me(BearerAuth(auth): BearerAuth) -> Json<ClaimSet> {
    Json(auth.claims.as_ref().clone())
}

async fn logout(State(state): State<AppState>, request: Request) -> Result<StatusCode, AuthError> {
    let (parts, _) = request.into_parts();
    let token = state.auth.parser.parse(&parts)?;
    state.auth.service.invalidate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Periodically drops expired blacklist entries. A zero interval disables it.
pub fn spawn_purge_task(service: Arc<TokenService>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = service.purge_expired().await {
                tracing::warn!(error = %e, "Blacklist purge failed");
            }
        }
    }))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> Result<TokengateServer, ConfigError> {
        let state = build_state(&self.config)?;
        let service = state.auth.service.clone();

        Ok(TokengateServer {
            addr: self.addr,
            app: build_router(state),
            service,
            purge_interval: self.config.auth.blacklist.purge_interval,
        })
    }
}

pub struct TokengateServer {
    addr: SocketAddr,
    app: Router,
    service: Arc<TokenService>,
    purge_interval: Duration,
}

impl TokengateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let purge = spawn_purge_task(self.service, self.purge_interval);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = purge {
            handle.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
