use async_trait::async_trait;
use axum::http::Method;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

/// Header (reads) or form field (writes) carrying the caller's device id.
pub const DEVICE_ID: &str = "deviceid";

/// Pull the device id into `ctx.device_id`.
///
/// GET requests carry it in the `deviceid` header. Mutating requests carry
/// it as a form field and fall back to the header.
pub struct ExtractDeviceId;

#[async_trait]
impl Stage for ExtractDeviceId {
    fn name(&self) -> &'static str {
        "extract-device-id"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        _sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let device_id = if req.method == Method::GET {
            req.header(DEVICE_ID)
        } else {
            ctx.form.get(DEVICE_ID).or_else(|| req.header(DEVICE_ID))
        };

        let device_id = device_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TieredError::missing(DEVICE_ID))?
            .to_string();
        ctx.device_id = Some(device_id);
        Ok(())
    }
}

/// Reject devices without a live credential.
pub struct VerifyDeviceId;

#[async_trait]
impl Stage for VerifyDeviceId {
    fn name(&self) -> &'static str {
        "verify-device-id"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        _sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let device_id = ctx.device_id()?;
        ctx.within_deadline(ctx.state.credentials.verify(device_id))
            .await??;
        Ok(())
    }
}
