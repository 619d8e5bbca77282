use async_trait::async_trait;
use envelope_db::models::CommentOutcome;
use envelope_types::api::{CommentResponse, CommentsResponse, Status};
use envelope_types::models::Comment;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

fn post_id(ctx: &RequestContext) -> Result<i64, TieredError> {
    ctx.form
        .require("postid")?
        .parse::<i64>()
        .map_err(|_| TieredError::missing("postid"))
}

pub struct SubmitComment;

#[async_trait]
impl Stage for SubmitComment {
    fn name(&self) -> &'static str {
        "submit-comment"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let post_id = post_id(ctx)?;
        let text = ctx.form.require("comment")?.to_string();
        let device_id = ctx.device_id()?.to_string();
        let timestamp = chrono::Utc::now().timestamp();

        let outcome = ctx
            .with_db(move |db| db.add_comment(post_id, &device_id, &text, timestamp))
            .await?;

        match outcome {
            CommentOutcome::Created { id } => {
                sink.ok(&CommentResponse {
                    comment_id: id,
                    timestamp,
                    status: Status::ok(),
                });
                Ok(())
            }
            CommentOutcome::PostNotFound => Err(TieredError::missing("postid")),
        }
    }
}

/// All comments on a post, oldest first.
pub struct FetchComments;

#[async_trait]
impl Stage for FetchComments {
    fn name(&self) -> &'static str {
        "fetch-comments"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let post_id = post_id(ctx)?;

        let rows = ctx
            .with_db(move |db| db.comments_for_post(post_id))
            .await?
            .ok_or_else(|| TieredError::missing("postid"))?;

        let comments = rows
            .into_iter()
            .map(|row| Comment {
                id: row.id,
                text: row.text,
                timestamp: row.timestamp,
            })
            .collect();

        sink.ok(&CommentsResponse {
            comments,
            status: Status::ok(),
        });
        Ok(())
    }
}
