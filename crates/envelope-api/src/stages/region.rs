//! Optional region gate for device registration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use axum::http::StatusCode;
use envelope_types::errors::ErrorCode;
use reqwest::Client;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};
use crate::stages::client_addr::{UNKNOWN_ADDR, is_direct_loopback};

pub const DEFAULT_REGION_LOOKUP_URL: &str = "https://ipapi.co";

/// Maps a client address to a region name.
#[async_trait]
pub trait RegionResolver: Send + Sync {
    async fn resolve(&self, addr: &str) -> Result<String>;
}

/// Looks regions up over HTTP: `GET {base_url}/{addr}/region/` answers with
/// the bare region name.
#[derive(Debug, Clone)]
pub struct HttpRegionResolver {
    client: Client,
    base_url: String,
}

impl HttpRegionResolver {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build region lookup client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RegionResolver for HttpRegionResolver {
    async fn resolve(&self, addr: &str) -> Result<String> {
        let url = format!("{}/{}/region/", self.base_url, addr);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("region lookup for {addr} failed"))?;

        if !resp.status().is_success() {
            bail!("region lookup for {} returned {}", addr, resp.status());
        }

        let region = resp.text().await?.trim().to_string();
        if region.is_empty() {
            bail!("region lookup for {} returned an empty body", addr);
        }
        Ok(region)
    }
}

/// Resolves every address to the same region.
#[derive(Debug, Clone)]
pub struct StaticResolver(pub String);

#[async_trait]
impl RegionResolver for StaticResolver {
    async fn resolve(&self, _addr: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// The region requests must come from, and how to find out where they do.
#[derive(Clone)]
pub struct RegionGate {
    pub working_region: String,
    pub resolver: Arc<dyn RegionResolver>,
}

impl RegionGate {
    pub fn new(working_region: impl Into<String>, resolver: Arc<dyn RegionResolver>) -> Self {
        Self {
            working_region: working_region.into(),
            resolver,
        }
    }
}

/// Reject callers outside the working region. A no-op when no gate is
/// configured. Callers connecting directly over loopback always pass; the
/// region itself is looked up for the address `ClientAddr` recorded.
pub struct RegionCheck;

#[async_trait]
impl Stage for RegionCheck {
    fn name(&self) -> &'static str {
        "region-check"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        _sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let Some(gate) = ctx.state.region_gate.clone() else {
            return Ok(());
        };
        if is_direct_loopback(req) {
            return Ok(());
        }
        let addr = ctx
            .client_addr
            .clone()
            .unwrap_or_else(|| UNKNOWN_ADDR.to_string());

        let region = ctx
            .within_deadline(gate.resolver.resolve(&addr))
            .await?
            .map_err(TieredError::internal)?;

        if region != gate.working_region {
            return Err(TieredError::server(
                StatusCode::UNAUTHORIZED,
                ErrorCode::OutOfRegion,
                anyhow::anyhow!("{} resolved to {}", addr, region),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::Path;
    use axum::http::{HeaderMap, HeaderValue, Method, Uri};
    use axum::routing::get;
    use tokio::time::Instant;

    use super::*;
    use crate::error::Level;
    use crate::pipeline::Pipeline;
    use crate::stages::ClientAddr;
    use crate::stages::client_addr::FORWARDED_FOR;
    use crate::state::AppState;
    use crate::test_support::{test_state, test_state_gated};

    struct FailingResolver;

    #[async_trait]
    impl RegionResolver for FailingResolver {
        async fn resolve(&self, _addr: &str) -> Result<String> {
            bail!("lookup service unreachable: secret-upstream.internal")
        }
    }

    fn gate(resolver: impl RegionResolver + 'static) -> RegionGate {
        RegionGate::new("home", Arc::new(resolver))
    }

    fn inbound(peer: Option<&str>, forwarded: Option<&str>) -> Inbound {
        let mut headers = HeaderMap::new();
        if let Some(forwarded) = forwarded {
            headers.insert(FORWARDED_FOR, HeaderValue::from_str(forwarded).unwrap());
        }
        Inbound {
            method: Method::POST,
            uri: Uri::from_static("/register-device"),
            headers,
            body: Bytes::new(),
            peer_addr: peer.map(|p| p.parse::<SocketAddr>().unwrap()),
            path_params: Vec::new(),
        }
    }

    async fn check(
        state: &AppState,
        client_addr: Option<&str>,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let deadline = Instant::now() + state.settings.request_timeout;
        let mut ctx = RequestContext::new(state.clone(), deadline);
        ctx.client_addr = client_addr.map(str::to_string);
        let mut sink = ResponseSink::default();
        RegionCheck.run(&mut ctx, &mut sink, req).await
    }

    #[tokio::test]
    async fn disabled_gate_lets_everyone_through() {
        let t = test_state();
        check(&t.state, Some("203.0.113.7"), &inbound(Some("203.0.113.7:5555"), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matching_region_passes_and_other_regions_are_refused() {
        let t = test_state_gated(gate(StaticResolver("home".into())));
        check(&t.state, Some("203.0.113.7"), &inbound(Some("203.0.113.7:5555"), None))
            .await
            .unwrap();

        let t = test_state_gated(gate(StaticResolver("away".into())));
        let err = check(&t.state, Some("203.0.113.7"), &inbound(Some("203.0.113.7:5555"), None))
            .await
            .unwrap_err();
        assert_eq!(err.level, Level::Server);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, ErrorCode::OutOfRegion);
    }

    #[tokio::test]
    async fn unknown_address_is_still_gated() {
        let t = test_state_gated(gate(StaticResolver("away".into())));
        let err = check(&t.state, Some(UNKNOWN_ADDR), &inbound(None, None))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfRegion);

        let err = check(&t.state, None, &inbound(None, None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfRegion);
    }

    #[tokio::test]
    async fn direct_loopback_skips_lookup() {
        let t = test_state_gated(gate(FailingResolver));
        check(&t.state, Some("127.0.0.1"), &inbound(Some("127.0.0.1:5555"), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn forged_loopback_header_is_gated() {
        let t = test_state_gated(gate(StaticResolver("away".into())));
        let err = check(
            &t.state,
            Some("127.0.0.1"),
            &inbound(Some("203.0.113.7:5555"), Some("127.0.0.1")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfRegion);
    }

    #[tokio::test]
    async fn lookup_failure_is_an_opaque_internal_error() {
        let t = test_state_gated(gate(FailingResolver));
        let pipeline = Pipeline::new(t.state.clone()).stage(ClientAddr).stage(RegionCheck);

        let resp = pipeline.execute(inbound(Some("203.0.113.7:5555"), None)).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("secret-upstream"));
    }

    /// Lookup service stand-in: `1.1.1.1` is home, `3.3.3.3` answers with an
    /// empty body, everything else is unknown.
    async fn spawn_lookup_service() -> String {
        async fn region(Path(ip): Path<String>) -> (StatusCode, &'static str) {
            match ip.as_str() {
                "1.1.1.1" => (StatusCode::OK, "home\n"),
                "3.3.3.3" => (StatusCode::OK, "  "),
                _ => (StatusCode::NOT_FOUND, "Undefined"),
            }
        }

        let app = Router::new().route("/{ip}/region/", get(region));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn http_resolver_trims_region_and_rejects_bad_answers() {
        let resolver = HttpRegionResolver::new(spawn_lookup_service().await).unwrap();

        assert_eq!(resolver.resolve("1.1.1.1").await.unwrap(), "home");
        assert!(resolver.resolve("2.2.2.2").await.is_err());
        assert!(resolver.resolve("3.3.3.3").await.is_err());
    }
}
