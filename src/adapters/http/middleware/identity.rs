//! Caller classification middleware and extractors for axum.
//!
//! This module provides:
//! - `identity_middleware` - Layer that classifies the caller and lifts client signals
//! - `CallerIdentity` - Extractor for the classified caller
//! - `ClientInfo` - Extractor for the client's network attributes
//!
//! # Architecture
//!
//! The middleware uses the `IdentityVerifier` port, so the token format and
//! the user store behind it stay outside this crate.
//!
//! ```text
//! Request → identity_middleware → injects Caller + ClientSignals into extensions
//!                                        ↓
//!                                quota_middleware / handlers read them back
//! ```
//!
//! Unlike a login gate this middleware never answers 401. A token that fails
//! verification, or a verifier outage, degrades the caller to
//! `Caller::Unrecognized`, which meters on the strictest policy.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post, middleware};
//! use std::sync::Arc;
//!
//! let verifier: Arc<dyn IdentityVerifier> = Arc::new(InMemoryIdentityVerifier::new());
//!
//! let app = Router::new()
//!     .route("/api/v1/chat", post(chat_handler))
//!     .layer(middleware::from_fn_with_state(verifier, identity_middleware));
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, Extensions},
    middleware::Next,
    response::Response,
};

use crate::domain::fingerprint::ClientSignals;
use crate::domain::foundation::AuthError;
use crate::domain::quota::Caller;
use crate::ports::IdentityVerifier;

/// Identity middleware state - wraps the identity verifier.
pub type IdentityState = Arc<dyn IdentityVerifier>;

/// Client address header names, in trust order.
pub mod headers {
    use super::HeaderName;

    /// Client address set by the CDN edge.
    pub static CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");
    /// Client address set by the reverse proxy.
    pub static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
    /// Forwarded-for chain, leftmost entry is the client.
    pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
}

/// Classifies the caller and records client signals on the request.
///
/// 1. No `Authorization: Bearer` header - `Caller::Anonymous`
/// 2. Token verifies - `Caller::Verified(principal)`
/// 3. Token rejected or verifier unavailable - `Caller::Unrecognized`
pub async fn identity_middleware(
    State(verifier): State<IdentityState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let signals = client_signals(request.headers(), peer);

    let token = bearer_token(request.headers()).map(str::to_owned);
    let caller = match token {
        None => Caller::Anonymous,
        Some(token) => match verifier.verify(&token).await {
            Ok(principal) => Caller::Verified(principal),
            Err(e) => {
                log_verification_failure(&e);
                Caller::unrecognized(e.to_string())
            }
        },
    };

    request.extensions_mut().insert(caller);
    request.extensions_mut().insert(signals);
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn log_verification_failure(error: &AuthError) {
    if error.is_transient() {
        tracing::warn!(error = %error, "identity verifier unavailable, metering caller as unrecognized");
    } else {
        tracing::debug!(error = %error, "bearer token rejected, metering caller as unrecognized");
    }
}

/// Lifts the client address and user-agent headers into `ClientSignals`.
pub fn client_signals(headers: &HeaderMap, peer: Option<IpAddr>) -> ClientSignals {
    let read = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned)
    };

    ClientSignals {
        peer_ip: peer,
        cdn_ip: read(&headers::CF_CONNECTING_IP),
        real_ip: read(&headers::X_REAL_IP),
        forwarded_for: read(&headers::X_FORWARDED_FOR),
        user_agent: read(&header::USER_AGENT),
    }
}

/// Caller recorded by `identity_middleware`, or `Anonymous` when it did not run.
pub(crate) fn caller_from(extensions: &Extensions) -> Caller {
    extensions.get::<Caller>().cloned().unwrap_or(Caller::Anonymous)
}

/// Signals recorded by `identity_middleware`, or read straight off the request.
pub(crate) fn signals_from(headers: &HeaderMap, extensions: &Extensions) -> ClientSignals {
    match extensions.get::<ClientSignals>() {
        Some(signals) => signals.clone(),
        None => {
            let peer = extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip());
            client_signals(headers, peer)
        }
    }
}

/// Extractor for the classified caller.
///
/// # Example
///
/// ```ignore
/// async fn my_handler(CallerIdentity(caller): CallerIdentity) -> impl IntoResponse {
///     caller.tier().to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

impl<S> axum::extract::FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move { Ok(CallerIdentity(caller_from(&parts.extensions))) })
    }
}

/// Extractor for the client's network attributes.
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientSignals);

impl<S> axum::extract::FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move { Ok(ClientInfo(signals_from(&parts.headers, &parts.extensions))) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::InMemoryIdentityVerifier;
    use crate::domain::quota::QuotaTier;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    async fn echo_tier(CallerIdentity(caller): CallerIdentity) -> String {
        caller.tier().as_str().to_string()
    }

    async fn echo_ip(ClientInfo(signals): ClientInfo) -> String {
        signals.resolve_ip_string()
    }

    fn app(verifier: InMemoryIdentityVerifier) -> Router {
        let state: IdentityState = Arc::new(verifier);
        Router::new()
            .route("/tier", get(echo_tier))
            .route("/ip", get(echo_ip))
            .layer(middleware::from_fn_with_state(state, identity_middleware))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn tier_for(verifier: InMemoryIdentityVerifier, auth: Option<&str>) -> String {
        let mut builder = HttpRequest::builder().uri("/tier");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app(verifier)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Classification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn no_token_is_anonymous() {
        let tier = tier_for(InMemoryIdentityVerifier::new(), None).await;
        assert_eq!(tier, QuotaTier::LifetimeLimited.as_str());
    }

    #[tokio::test]
    async fn unlocked_principal_is_unlimited() {
        let verifier = InMemoryIdentityVerifier::new().with_user("tok", "user-1", true);
        let tier = tier_for(verifier, Some("Bearer tok")).await;
        assert_eq!(tier, QuotaTier::Unlimited.as_str());
    }

    #[tokio::test]
    async fn locked_principal_is_daily_limited() {
        let verifier = InMemoryIdentityVerifier::new().with_user("tok", "user-1", false);
        let tier = tier_for(verifier, Some("Bearer tok")).await;
        assert_eq!(tier, QuotaTier::DailyLimited.as_str());
    }

    #[tokio::test]
    async fn bad_token_degrades_instead_of_401() {
        let tier = tier_for(InMemoryIdentityVerifier::new(), Some("Bearer nope")).await;
        assert_eq!(tier, QuotaTier::LifetimeLimited.as_str());
    }

    #[tokio::test]
    async fn verifier_outage_degrades_to_lifetime() {
        let verifier = InMemoryIdentityVerifier::new()
            .with_user("tok", "user-1", true)
            .with_error(AuthError::service_unavailable("down"));
        let tier = tier_for(verifier, Some("Bearer tok")).await;
        assert_eq!(tier, QuotaTier::LifetimeLimited.as_str());
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_anonymous() {
        let verifier = InMemoryIdentityVerifier::new().with_user("tok", "user-1", true);
        let tier = tier_for(verifier, Some("Basic tok")).await;
        assert_eq!(tier, QuotaTier::LifetimeLimited.as_str());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signal Extraction Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn ip_comes_from_forwarded_headers() {
        let request = HttpRequest::builder()
            .uri("/ip")
            .header("X-Forwarded-For", "198.51.100.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let response = app(InMemoryIdentityVerifier::new())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "198.51.100.7");
    }

    #[tokio::test]
    async fn ip_is_unknown_without_any_source() {
        let request = HttpRequest::builder().uri("/ip").body(Body::empty()).unwrap();
        let response = app(InMemoryIdentityVerifier::new())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "unknown");
    }

    #[test]
    fn client_signals_reads_every_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "203.0.113.9".parse().unwrap());
        headers.insert("x-real-ip", "203.0.113.8".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        headers.insert("user-agent", "Mozilla/5.0 Firefox".parse().unwrap());
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        let signals = client_signals(&headers, Some(peer));

        assert_eq!(signals.peer_ip, Some(peer));
        assert_eq!(signals.cdn_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(signals.real_ip.as_deref(), Some("203.0.113.8"));
        assert_eq!(signals.forwarded_for.as_deref(), Some("203.0.113.7"));
        assert_eq!(signals.user_agent_str(), "Mozilla/5.0 Firefox");
        assert_eq!(signals.resolve_ip_string(), "203.0.113.9");
    }

    #[test]
    fn missing_extensions_fall_back_to_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.0.2.4".parse().unwrap());
        let extensions = Extensions::new();

        assert_eq!(caller_from(&extensions), Caller::Anonymous);
        assert_eq!(signals_from(&headers, &extensions).resolve_ip_string(), "192.0.2.4");
    }

    #[test]
    fn identity_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IdentityState>();
    }
}
