use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

pub const UNKNOWN_ADDR: &str = "unknown";
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Record where the request came from in `ctx.client_addr`.
///
/// Prefers the first `X-Forwarded-For` hop, then the socket peer. Having
/// neither is only a warning; the address is then recorded as `unknown`.
pub struct ClientAddr;

#[async_trait]
impl Stage for ClientAddr {
    fn name(&self) -> &'static str {
        "client-addr"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        _sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let forwarded = req
            .header(FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match forwarded.or_else(|| req.peer_addr.map(|addr| addr.ip().to_string())) {
            Some(addr) => {
                ctx.client_addr = Some(normalize(&addr));
                Ok(())
            }
            None => {
                ctx.client_addr = Some(UNKNOWN_ADDR.to_string());
                Err(TieredError::warning(anyhow::anyhow!(
                    "no forwarded header or peer address on request"
                )))
            }
        }
    }
}

/// Strip IPv6 brackets and fold IPv6 loopback onto 127.0.0.1.
fn normalize(addr: &str) -> String {
    let bare = addr.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => "127.0.0.1".to_string(),
        Ok(ip) => ip.to_string(),
        Err(_) => addr.to_string(),
    }
}

/// True when the socket peer is loopback and nothing was forwarded on its
/// behalf. Forwarded headers are client-controlled and never count.
pub fn is_direct_loopback(req: &Inbound) -> bool {
    req.header(FORWARDED_FOR).is_none()
        && req
            .peer_addr
            .is_some_and(|addr| addr.ip().to_canonical().is_loopback())
}
