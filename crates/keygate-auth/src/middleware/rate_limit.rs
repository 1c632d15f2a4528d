//! Tiered rate-limit middleware.
//!
//! Resolves the caller's [`Identity`], charges one token to its bucket and
//! either forwards the request (tagging the response with
//! `X-Rate-Limit-Type`) or answers 429 with `Retry-After`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::AuthError;
use crate::ratelimit::{Decision, Identity, RateLimiter};
use crate::token::validation::ValidationPipeline;

use super::auth::bearer_token;

/// Response header naming the tier and rate a request was admitted under.
pub const RATE_LIMIT_TYPE_HEADER: HeaderName = HeaderName::from_static("x-rate-limit-type");

/// State for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub pipeline: Arc<ValidationPipeline>,
    pub enabled: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, pipeline: Arc<ValidationPipeline>) -> Self {
        Self {
            limiter,
            pipeline,
            enabled: true,
        }
    }

    /// Turns the middleware into a pass-through.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Resolves the identity a request is charged to.
    ///
    /// A bearer credential that passes validation selects the user or admin
    /// tier; anything else is limited by client IP. Rejecting bad
    /// credentials is left to the route's own authentication.
    pub fn identify(&self, req: &Request<Body>) -> Identity {
        if let Some(claims) = bearer_token(req.headers())
            .and_then(|token| self.pipeline.validate(token).ok())
        {
            return Identity::authenticated(&claims.sub, &claims.roles);
        }

        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Identity::anonymous(req.headers(), peer)
    }
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let identity = state.identify(&request);
    match state.limiter.check_identity(&identity) {
        Decision::Allowed { tier, .. } => {
            let label = state.limiter.policy(tier).describe(tier);
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&label) {
                response.headers_mut().insert(RATE_LIMIT_TYPE_HEADER, value);
            }
            response
        }
        Decision::Denied {
            tier,
            limit,
            retry_after_secs,
        } => {
            debug!(
                tier = %tier,
                key = %identity.key,
                path = %request.uri().path(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            AuthError::rate_limited(tier, limit, retry_after_secs)
                .at(request.uri().path())
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::RateLimitingConfig;
    use crate::ratelimit::{Tier, TierPolicy};
    use crate::token::jwt::{AccessTokenClaims, JwtService, SigningKeyPair};
    use crate::token::revocation::RevocationList;
    use crate::types::ROLE_ADMIN;
    use axum::{Router, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    struct Fixture {
        clock: Arc<ManualClock>,
        jwt: Arc<JwtService>,
        state: RateLimitState,
    }

    fn fixture(limiter: impl FnOnce(Arc<ManualClock>) -> RateLimiter) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let jwt = Arc::new(JwtService::new(SigningKeyPair::from_secret(
            "test",
            b"0123456789abcdef0123456789abcdef",
        )));
        let revocations = Arc::new(RevocationList::in_memory(clock.clone()));
        let pipeline = Arc::new(ValidationPipeline::new(
            jwt.clone(),
            revocations,
            clock.clone(),
            "iss",
            "aud",
        ));
        let limiter = Arc::new(limiter(clock.clone()));
        Fixture {
            clock,
            jwt,
            state: RateLimitState::new(limiter, pipeline),
        }
    }

    fn app(state: RateLimitState) -> Router {
        Router::new()
            .route("/hello", get(|| async { "hi" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn request(forwarded_for: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/hello")
            .header("x-forwarded-for", forwarded_for);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_requests_tagged_and_limited() {
        let f = fixture(|clock| {
            RateLimiter::new(
                clock,
                TierPolicy::per_minute(2),
                TierPolicy::per_minute(5),
                TierPolicy::per_minute(5),
            )
        });
        let app = app(f.state.clone());

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("198.51.100.4", None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get("x-rate-limit-type").unwrap(),
                "IP (2/min)"
            );
        }

        let response = app
            .clone()
            .oneshot(request("198.51.100.4", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");

        f.clock.advance(time::Duration::minutes(1));
        let response = app.oneshot(request("198.51.100.4", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_token_selects_admin_tier() {
        let f = fixture(|clock| RateLimiter::from_config(&RateLimitingConfig::default(), clock));
        let claims = AccessTokenClaims::builder("iss", "root", f.clock.now())
            .audience(vec!["aud".to_string()])
            .roles(vec![ROLE_ADMIN.to_string()])
            .build();
        let token = f.jwt.encode(&claims).unwrap();

        let response = app(f.state.clone())
            .oneshot(request("198.51.100.4", Some(&token)))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-rate-limit-type").unwrap(),
            "ADMIN (1000/min)"
        );
        assert_eq!(f.state.limiter.bucket_count(Tier::Admin), 1);
        assert_eq!(f.state.limiter.bucket_count(Tier::Anonymous), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_falls_back_to_ip() {
        let f = fixture(|clock| RateLimiter::from_config(&RateLimitingConfig::default(), clock));

        let response = app(f.state.clone())
            .oneshot(request("198.51.100.9", Some("not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-rate-limit-type").unwrap(),
            "IP (60/min)"
        );
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let f = fixture(|clock| {
            RateLimiter::new(
                clock,
                TierPolicy::per_minute(1),
                TierPolicy::per_minute(1),
                TierPolicy::per_minute(1),
            )
        });
        let app = app(f.state.clone().with_enabled(false));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request("198.51.100.4", None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-rate-limit-type").is_none());
        }
    }
}
