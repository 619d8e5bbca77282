use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;
use crate::models::{Comment, FeedPost};

// -- Envelope --

/// `status` / `status_code` pair carried by every response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status: String,
    pub status_code: u16,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            status_code: 200,
        }
    }

    pub fn new(status_code: u16, reason: &str) -> Self {
        Self {
            status: reason.to_string(),
            status_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    #[serde(flatten)]
    pub status: Status,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { status: Status::ok() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    /// Name of the missing or invalid request field, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(flatten)]
    pub status: Status,
}

// -- Devices --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceResponse {
    pub hash: String,
    #[serde(flatten)]
    pub status: Status,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPostResponse {
    #[serde(rename = "postid")]
    pub post_id: i64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub likes: i64,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<FeedPost>,
    #[serde(flatten)]
    pub status: Status,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    #[serde(rename = "commentid")]
    pub comment_id: i64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
    #[serde(flatten)]
    pub status: Status,
}
