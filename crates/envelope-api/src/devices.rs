use async_trait::async_trait;
use envelope_types::api::{OkResponse, RegisterDeviceResponse, Status};

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

/// Issue a fresh token for the device, replacing any earlier one.
pub struct RegisterDevice;

#[async_trait]
impl Stage for RegisterDevice {
    fn name(&self) -> &'static str {
        "register-device"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let device_id = ctx.device_id()?;
        let hash = ctx
            .within_deadline(ctx.state.credentials.issue(device_id))
            .await??;

        sink.ok(&RegisterDeviceResponse {
            hash,
            status: Status::ok(),
        });
        Ok(())
    }
}

/// Confirm that the `hash` field is the token currently registered for the
/// device.
pub struct CheckCredential;

#[async_trait]
impl Stage for CheckCredential {
    fn name(&self) -> &'static str {
        "check-credential"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let hash = ctx.form.require("hash")?;
        let device_id = ctx.device_id()?;
        ctx.within_deadline(ctx.state.credentials.check(device_id, hash))
            .await??;

        sink.ok(&OkResponse::default());
        Ok(())
    }
}
