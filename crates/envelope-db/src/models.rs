//! Database row types. These map directly to SQLite rows.
//! Distinct from envelope-types wire models so the DB layer can carry
//! columns that never leave the server (device ids, origin addresses).

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub device_id: String,
    pub text: String,
    pub timestamp: i64,
    pub ip_addr: String,
    pub likes: i64,
    pub reports: i64,
    pub comments: i64,
    /// Whether the viewing device has liked the post.
    pub liked: bool,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub device_id: String,
    pub text: String,
    pub timestamp: i64,
}

/// Post about to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub device_id: &'a str,
    pub text: &'a str,
    pub timestamp: i64,
    pub ip_addr: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
    InvalidPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Reported,
    PostNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOutcome {
    Created { id: i64 },
    PostNotFound,
}
