use async_trait::async_trait;
use axum::http::StatusCode;
use envelope_types::errors::ErrorCode;

use crate::error::TieredError;
use crate::pipeline::{Inbound, RequestContext, ResponseSink, Stage};

/// Decoded query string and urlencoded body, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First value for `name`, or a missing-field error when it is absent
    /// or empty.
    pub fn require(&self, name: &'static str) -> Result<&str, TieredError> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TieredError::missing(name))
    }
}

/// Merges the query string and an urlencoded body into `ctx.form`.
/// Query pairs come first, so a body can't shadow them.
pub struct ParseForm;

#[async_trait]
impl Stage for ParseForm {
    fn name(&self) -> &'static str {
        "parse-form"
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        _sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError> {
        let parse_error = |e: serde_urlencoded::de::Error| {
            TieredError::client(StatusCode::BAD_REQUEST, ErrorCode::ParsingError).with_cause(e)
        };

        let mut pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(req.uri.query().unwrap_or_default()).map_err(parse_error)?;

        if !req.body.is_empty() {
            let body: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&req.body).map_err(parse_error)?;
            pairs.extend(body);
        }

        ctx.form = Form::from_pairs(pairs);
        Ok(())
    }
}
