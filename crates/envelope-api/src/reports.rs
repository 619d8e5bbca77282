use async_trait::async_trait;
use envelope_db::models::ReportOutcome;
use envelope_types::api::OkResponse;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

/// Flag a post. Repeat reports from the same device are all kept.
pub struct ReportPost;

#[async_trait]
impl Stage for ReportPost {
    fn name(&self) -> &'static str {
        "report-post"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let post_id = ctx
            .form
            .require("postid")?
            .parse::<i64>()
            .map_err(|_| TieredError::missing("postid"))?;
        let reason = ctx.form.require("reason")?.to_string();
        let device_id = ctx.device_id()?.to_string();

        let outcome = ctx
            .with_db(move |db| db.report_post(post_id, &device_id, &reason))
            .await?;

        match outcome {
            ReportOutcome::Reported => {
                sink.ok(&OkResponse::default());
                Ok(())
            }
            ReportOutcome::PostNotFound => Err(TieredError::missing("postid")),
        }
    }
}
