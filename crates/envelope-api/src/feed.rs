//! Feed pagination.
//!
//! `/fetch/latest` returns the newest posts. `/fetch/{postid}?prop=after`
//! walks forward from an anchor post (anchor included) and
//! `/fetch/{postid}?prop=before` walks back from it (anchor excluded).

use envelope_db::models::PostRow;
use tracing::debug;

use crate::error::TieredError;
use crate::pipeline::RequestContext;
use crate::state::Settings;

pub const LATEST_TAG: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    After,
    Before,
}

impl Direction {
    fn parse(prop: &str) -> Option<Self> {
        match prop {
            "after" => Some(Self::After),
            "before" => Some(Self::Before),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedQuery {
    Latest { limit: u32 },
    Anchor { id: i64, limit: u32, direction: Direction },
}

impl FeedQuery {
    /// Build a query from the path tag and the `limit` / `prop` fields.
    ///
    /// The tag is checked before `prop`, so a bad tag is reported even when
    /// `prop` is also missing.
    pub fn parse(
        tag: &str,
        limit: Option<&str>,
        prop: Option<&str>,
        settings: &Settings,
    ) -> Result<Self, TieredError> {
        let limit = page_size(limit, settings);
        if tag == LATEST_TAG {
            return Ok(Self::Latest { limit });
        }

        let id = tag.parse::<i64>().map_err(|_| TieredError::missing("postid"))?;
        let direction = prop
            .and_then(Direction::parse)
            .ok_or_else(|| TieredError::missing("prop"))?;
        Ok(Self::Anchor { id, limit, direction })
    }
}

/// Requested page size, falling back to the default when absent, unparsable
/// or non-positive and clamped to the maximum.
pub fn page_size(raw: Option<&str>, settings: &Settings) -> u32 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(i64::from(settings.max_page_size)) as u32,
        _ => settings.default_page_size,
    }
}

#[derive(Debug)]
pub enum FeedPage {
    Posts(Vec<PostRow>),
    /// The anchor post does not exist. Rendered as an empty page.
    NoAnchor,
}

impl FeedPage {
    pub fn into_rows(self) -> Vec<PostRow> {
        match self {
            Self::Posts(rows) => rows,
            Self::NoAnchor => Vec::new(),
        }
    }
}

/// Run `query` for `viewer`. The anchor lookup and the page read share one
/// store call, so both are bounded by the same deadline check.
pub async fn resolve(
    ctx: &RequestContext,
    query: FeedQuery,
    viewer: &str,
) -> Result<FeedPage, TieredError> {
    let viewer = viewer.to_string();
    ctx.with_db(move |db| match query {
        FeedQuery::Latest { limit } => Ok(FeedPage::Posts(db.latest_posts(limit, &viewer)?)),
        FeedQuery::Anchor { id, limit, direction } => {
            let Some(timestamp) = db.post_timestamp(id)? else {
                debug!("anchor post {} not found", id);
                return Ok(FeedPage::NoAnchor);
            };
            let rows = match direction {
                Direction::After => db.posts_after(id, timestamp, limit, &viewer)?,
                Direction::Before => db.posts_before(id, timestamp, limit, &viewer)?,
            };
            Ok(FeedPage::Posts(rows))
        }
    })
    .await
}
