use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use keygate_auth::{
    AuthState, GuardChain, GuardState, IssuanceConfig, IssuanceService, JwksState, JwtService,
    LogoutState, RateLimitState, RateLimiter, RevocationList, RotationLedger, SharedClock,
    SigningKeyPair, SystemClock, TokenState, UserDirectory, UsersState, ValidationPipeline,
    config::ConfigError,
    http::{
        jwks_handler, logout_handler, me_handler, refresh_handler, register_handler, token_handler,
    },
    middleware::{authenticated, guard_middleware, rate_limit_middleware, require_role},
    types::ROLE_ADMIN,
};
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

/// Errors raised while assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("auth setup failed: {0}")]
    Auth(#[from] ConfigError),
    #[error("invalid duration for {field}: {message}")]
    Duration { field: &'static str, message: String },
}

/// Shared state for every route. Each handler pulls its slice via `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub token: TokenState,
    pub logout: LogoutState,
    pub users: UsersState,
    pub jwks: JwksState,
    pub rate_limit: RateLimitState,
    pub revocations: Arc<RevocationList>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for TokenState {
    fn from_ref(state: &AppState) -> Self {
        state.token.clone()
    }
}

impl FromRef<AppState> for LogoutState {
    fn from_ref(state: &AppState) -> Self {
        state.logout.clone()
    }
}

impl FromRef<AppState> for UsersState {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl FromRef<AppState> for JwksState {
    fn from_ref(state: &AppState) -> Self {
        state.jwks.clone()
    }
}

/// Wires the credential services from configuration.
pub fn build_state(cfg: &AppConfig, clock: SharedClock) -> Result<AppState, ServerError> {
    let auth_cfg = &cfg.auth;

    let access_lifetime = time::Duration::try_from(auth_cfg.tokens.access_token_lifetime)
        .map_err(|e| ServerError::Duration {
            field: "auth.tokens.access_token_lifetime",
            message: e.to_string(),
        })?;
    let refresh_lifetime = time::Duration::try_from(auth_cfg.tokens.refresh_token_lifetime)
        .map_err(|e| ServerError::Duration {
            field: "auth.tokens.refresh_token_lifetime",
            message: e.to_string(),
        })?;

    let signing_key = SigningKeyPair::from_config(&auth_cfg.signing)?;
    tracing::info!(
        kid = %signing_key.kid,
        alg = %signing_key.algorithm.as_str(),
        "Signing key loaded"
    );
    let jwt = Arc::new(JwtService::new(signing_key));

    let directory = Arc::new(UserDirectory::from_seeds(&auth_cfg.users)?);
    let revocations = Arc::new(RevocationList::in_memory(clock.clone()));
    let ledger = Arc::new(RotationLedger::in_memory(clock.clone(), refresh_lifetime));

    let pipeline = Arc::new(ValidationPipeline::new(
        jwt.clone(),
        revocations.clone(),
        clock.clone(),
        auth_cfg.issuer.clone(),
        auth_cfg.audience.clone(),
    ));

    let issuance = Arc::new(IssuanceService::new(
        jwt.clone(),
        ledger,
        revocations.clone(),
        directory.clone(),
        clock.clone(),
        IssuanceConfig::new(auth_cfg.issuer.clone(), auth_cfg.audience.clone())
            .with_access_token_lifetime(access_lifetime),
    ));

    let limiter = RateLimiter::shared(&auth_cfg.rate_limiting, clock);

    Ok(AppState {
        auth: AuthState::new(pipeline.clone()),
        token: TokenState::new(issuance.clone()),
        logout: LogoutState::new(issuance),
        users: UsersState::new(directory),
        jwks: JwksState::new(jwt),
        rate_limit: RateLimitState::new(limiter, pipeline)
            .with_enabled(auth_cfg.rate_limiting.enabled),
        revocations,
    })
}

pub fn build_app(state: AppState) -> Router {
    let user_guard = GuardState::new(state.auth.clone(), GuardChain::new().stage(authenticated()));
    let admin_guard = GuardState::new(
        state.auth.clone(),
        GuardChain::new()
            .stage(authenticated())
            .stage(require_role(ROLE_ADMIN)),
    );

    // Routes behind the guard chain; the guard inserts the AuthContext.
    let user_routes = Router::new()
        .route("/api/users/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(user_guard, guard_middleware));
    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(handlers::admin_dashboard))
        .route_layer(middleware::from_fn_with_state(admin_guard, guard_middleware));

    Router::new()
        // Credential endpoints
        .route("/api/token", post(token_handler))
        .route("/api/token/refresh", post(refresh_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/users/register", post(register_handler))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/hello", get(handlers::hello))
        .route("/healthz", get(handlers::healthz))
        .merge(user_routes)
        .merge(admin_routes)
        // Middleware stack (order: rate limit -> trace)
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .with_state(state)
}

pub struct KeygateServer {
    addr: SocketAddr,
    app: Router,
    revocations: Arc<RevocationList>,
    sweep_interval: std::time::Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    clock: SharedClock,
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
            clock: SystemClock::shared(),
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

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<KeygateServer, ServerError> {
        self.config.validate().map_err(ServerError::Config)?;
        let state = build_state(&self.config, self.clock)?;
        let revocations = state.revocations.clone();

        Ok(KeygateServer {
            addr: self.addr,
            app: build_app(state),
            revocations,
            sweep_interval: self.config.auth.revocation.sweep_interval,
        })
    }
}

impl KeygateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let sweeper = self.revocations.spawn_sweeper(self.sweep_interval)?;

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.shutdown().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
