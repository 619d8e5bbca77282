use async_trait::async_trait;
use envelope_db::models::{NewPost, PostRow};
use envelope_types::api::{FeedResponse, Status, SubmitPostResponse};
use envelope_types::models::FeedPost;

use crate::error::TieredError;
use crate::feed::{self, FeedQuery};
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};
use crate::stages::client_addr::UNKNOWN_ADDR;

/// Append the `post` field to the log, stamped with the server clock.
pub struct SubmitPost;

#[async_trait]
impl Stage for SubmitPost {
    fn name(&self) -> &'static str {
        "submit-post"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        _req: &Inbound,
    ) -> Result<(), TieredError> {
        let text = ctx.form.require("post")?.to_string();
        let device_id = ctx.device_id()?.to_string();
        let ip_addr = ctx
            .client_addr
            .clone()
            .unwrap_or_else(|| UNKNOWN_ADDR.to_string());
        let timestamp = chrono::Utc::now().timestamp();

        let post_id = ctx
            .with_db(move |db| {
                db.insert_post(&NewPost {
                    device_id: &device_id,
                    text: &text,
                    timestamp,
                    ip_addr: &ip_addr,
                })
            })
            .await?;

        sink.ok(&SubmitPostResponse {
            post_id,
            timestamp,
            status: Status::ok(),
        });
        Ok(())
    }
}

/// Serve one feed page for the `{tag}` path parameter.
pub struct FetchFeed;

#[async_trait]
impl Stage for FetchFeed {
    fn name(&self) -> &'static str {
        "fetch-feed"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let tag = req.path_param("tag").unwrap_or_default();
        let query = FeedQuery::parse(
            tag,
            ctx.form.get("limit"),
            ctx.form.get("prop"),
            &ctx.state.settings,
        )?;
        let viewer = ctx.device_id()?.to_string();

        let page = feed::resolve(ctx, query, &viewer).await?;
        let posts = page.into_rows().into_iter().map(to_feed_post).collect();

        sink.ok(&FeedResponse {
            posts,
            status: Status::ok(),
        });
        Ok(())
    }
}

/// Strip server-only columns from a stored post.
fn to_feed_post(row: PostRow) -> FeedPost {
    FeedPost {
        id: row.id,
        text: row.text,
        timestamp: row.timestamp,
        likes: row.likes,
        comments: row.comments,
        reports: row.reports,
        liked: row.liked,
    }
}
