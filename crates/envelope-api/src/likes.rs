use async_trait::async_trait;
use axum::http::StatusCode;
use envelope_db::models::LikeOutcome;
use envelope_types::api::{LikeResponse, Status};
use envelope_types::errors::ErrorCode;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

pub struct LikePost;

#[async_trait]
impl Stage for LikePost {
    fn name(&self) -> &'static str {
        "like-post"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let invalid_post =
            || TieredError::client(StatusCode::BAD_REQUEST, ErrorCode::InvalidData).with_field("postid");

        let post_id = ctx
            .form
            .require("postid")?
            .parse::<i64>()
            .map_err(|_| invalid_post())?;
        let device_id = ctx.device_id()?.to_string();

        let (outcome, likes) = ctx
            .with_db(move |db| {
                let outcome = db.like_post(post_id, &device_id)?;
                let likes = match outcome {
                    LikeOutcome::Liked => db.like_count(post_id)?,
                    _ => 0,
                };
                Ok((outcome, likes))
            })
            .await?;

        match outcome {
            LikeOutcome::Liked => {
                sink.ok(&LikeResponse {
                    likes,
                    status: Status::ok(),
                });
                Ok(())
            }
            LikeOutcome::AlreadyLiked => {
                Err(TieredError::client(StatusCode::CONFLICT, ErrorCode::AlreadyLiked))
            }
            LikeOutcome::InvalidPost => Err(invalid_post()),
        }
    }
}
