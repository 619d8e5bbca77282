use serde::{Deserialize, Serialize};

/// A post as it appears in the feed.
///
/// The author's device id and origin address are stored server-side but
/// never leave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(rename = "postid")]
    pub id: i64,
    #[serde(rename = "post")]
    pub text: String,
    pub timestamp: i64,
    pub likes: i64,
    pub comments: i64,
    pub reports: i64,
    /// Whether the requesting device has liked this post.
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "commentid")]
    pub id: i64,
    #[serde(rename = "comment")]
    pub text: String,
    pub timestamp: i64,
}
