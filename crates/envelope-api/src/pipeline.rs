//! Request pipeline.
//!
//! Every endpoint is an ordered list of [`Stage`]s. The engine runs them one
//! after another against a shared [`RequestContext`]; a stage either lets the
//! request continue or returns a [`TieredError`] whose [`Level`] decides what
//! happens next. Exactly one response leaves the pipeline per request.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use envelope_db::Database;
use envelope_types::errors::ErrorCode;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{Level, TieredError};
use crate::stages::form::Form;
use crate::state::AppState;

/// Largest request body accepted. Posts are short; anything bigger is abuse.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Raw inbound request, read once and shared read-only by every stage.
#[derive(Debug)]
pub struct Inbound {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer_addr: Option<SocketAddr>,
    pub path_params: Vec<(String, String)>,
}

impl Inbound {
    pub async fn read(req: Request, path_params: Vec<(String, String)>) -> Result<Self, TieredError> {
        let peer_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            TieredError::client(StatusCode::BAD_REQUEST, ErrorCode::ParsingError).with_cause(e)
        })?;

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            peer_addr,
            path_params,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// State shared by the stages of one request.
pub struct RequestContext {
    pub state: AppState,
    deadline: Instant,
    /// Set by the device id extraction stage.
    pub device_id: Option<String>,
    pub form: Form,
    pub client_addr: Option<String>,
}

impl RequestContext {
    pub fn new(state: AppState, deadline: Instant) -> Self {
        Self {
            state,
            deadline,
            device_id: None,
            form: Form::default(),
            client_addr: None,
        }
    }

    /// Device id resolved by an earlier stage. Asking for it before that
    /// stage ran is a wiring bug, reported as an internal error.
    pub fn device_id(&self) -> Result<&str, TieredError> {
        self.device_id
            .as_deref()
            .ok_or_else(|| TieredError::internal(anyhow::anyhow!("device id requested before it was resolved")))
    }

    /// Await `fut`, giving up when the request deadline passes.
    pub async fn within_deadline<F: Future>(&self, fut: F) -> Result<F::Output, TieredError> {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| TieredError::deadline())
    }

    /// Run blocking DB work off the async runtime, bounded by the deadline.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, TieredError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.state.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));
        match self.within_deadline(task).await? {
            Ok(result) => result.map_err(TieredError::internal),
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                Err(TieredError::internal(e))
            }
        }
    }
}

/// Where the single terminal response of a request is written.
#[derive(Default)]
pub struct ResponseSink {
    response: Option<Response>,
}

impl ResponseSink {
    /// Write `body` as the response. Only the first write counts.
    pub fn send<T: Serialize>(&mut self, status: StatusCode, body: &T) {
        if self.response.is_some() {
            warn!("response already written, dropping second payload ({})", status);
            return;
        }
        self.response = Some((status, Json(body)).into_response());
    }

    pub fn ok<T: Serialize>(&mut self, body: &T) {
        self.send(StatusCode::OK, body);
    }

    pub fn is_written(&self) -> bool {
        self.response.is_some()
    }

    fn into_response(self) -> Response {
        self.response.unwrap_or_else(|| StatusCode::OK.into_response())
    }
}

/// One step of a pipeline.
///
/// A stage either writes the response or returns an error, never both.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &mut RequestContext,
        sink: &mut ResponseSink,
        req: &Inbound,
    ) -> Result<(), TieredError>;
}

/// Ordered list of stages bound to the application state.
#[derive(Clone)]
pub struct Pipeline {
    state: AppState,
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            stages: Vec::new(),
        }
    }

    /// Append `stage` to the end of the chain.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    #[cfg(test)]
    pub(crate) fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Read `req` and run it through the chain.
    pub async fn serve(&self, req: Request, path_params: Vec<(String, String)>) -> Response {
        match Inbound::read(req, path_params).await {
            Ok(inbound) => self.execute(inbound).await,
            Err(err) => {
                let mut sink = ResponseSink::default();
                settle("read-body", None, err, &mut sink);
                sink.into_response()
            }
        }
    }

    pub async fn execute(&self, req: Inbound) -> Response {
        let deadline = Instant::now() + self.state.settings.request_timeout;
        let mut ctx = RequestContext::new(self.state.clone(), deadline);
        let mut sink = ResponseSink::default();

        for stage in &self.stages {
            // A stage that stalls outside a store call still hits the deadline.
            let outcome = tokio::time::timeout_at(deadline, stage.run(&mut ctx, &mut sink, &req))
                .await
                .unwrap_or_else(|_| Err(TieredError::deadline()));

            if let Err(err) = outcome {
                if settle(stage.name(), ctx.device_id.as_deref(), err, &mut sink) {
                    return sink.into_response();
                }
            }
        }

        if !sink.is_written() {
            warn!("{} {}: pipeline finished without a response", req.method, req.uri.path());
        }
        sink.into_response()
    }
}

/// Apply the error policy. Returns true when the chain must stop.
fn settle(stage: &str, device_id: Option<&str>, err: TieredError, sink: &mut ResponseSink) -> bool {
    let err = match err.level {
        Level::Client => err,
        Level::Warning => {
            match device_id {
                Some(device) => warn!("[{}] {}: {}", device, stage, err),
                None => warn!("{}: {}", stage, err),
            }
            return false;
        }
        Level::Server => {
            match device_id {
                Some(device) => error!("[{}] {}: {}", device, stage, err),
                None => error!("{}: {}", stage, err),
            }
            if err.is_deadline() { err.into_timeout() } else { err }
        }
    };

    if sink.is_written() {
        error!("{}: stage wrote a response and also failed with {}", stage, err.code);
    } else {
        sink.send(err.status, &err.body());
    }
    true
}
