use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable machine-readable error codes returned in the `error_code` field.
///
/// Clients switch on these, so the serialized names must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A value in the request is present but unusable (e.g. unknown post id on like).
    InvalidData,
    /// Store or transport failure. Details are only logged.
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
    /// The request body could not be decoded.
    ParsingError,
    /// Caller resolved to a region other than the working region.
    OutOfRegion,
    /// The device id has no live credential.
    NotRegistered,
    /// A required field is missing, or refers to something that does not exist.
    NotFound,
    /// The request deadline elapsed.
    Timeout,
    /// The supplied credential does not match the stored one.
    Expired,
    /// The device already liked this post.
    AlreadyLiked,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "INVALID_DATA",
            Self::Internal => "INTERNAL_ERROR",
            Self::ParsingError => "PARSING_ERROR",
            Self::OutOfRegion => "OUT_OF_REGION",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Expired => "EXPIRED",
            Self::AlreadyLiked => "ALREADY_LIKED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
