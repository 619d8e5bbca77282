use axum::{
    Json, Router,
    extract::{Path, Request, State},
    response::Response,
    routing::{get, post},
};
use envelope_types::api::OkResponse;

use crate::comments::{FetchComments, SubmitComment};
use crate::devices::{CheckCredential, RegisterDevice};
use crate::likes::LikePost;
use crate::pipeline::Pipeline;
use crate::posts::{FetchFeed, SubmitPost};
use crate::reports::ReportPost;
use crate::stages::{ClientAddr, ExtractDeviceId, ParseForm, RegionCheck, VerifyDeviceId};
use crate::state::AppState;

/// Decode the request and resolve the device id.
fn identified(state: &AppState) -> Pipeline {
    Pipeline::new(state.clone())
        .stage(ParseForm)
        .stage(ExtractDeviceId)
}

/// Like [`identified`], and the device must hold a live credential.
fn verified(state: &AppState) -> Pipeline {
    identified(state).stage(VerifyDeviceId)
}

pub fn build_router(state: AppState) -> Router {
    let register_device = identified(&state)
        .stage(ClientAddr)
        .stage(RegionCheck)
        .stage(RegisterDevice);
    let verify_device = identified(&state).stage(CheckCredential);
    let submit_post = verified(&state).stage(ClientAddr).stage(SubmitPost);
    let like_post = verified(&state).stage(LikePost);
    let report = verified(&state).stage(ReportPost);
    let comment = verified(&state).stage(SubmitComment);
    let fetch = verified(&state).stage(FetchFeed);
    let fetch_comments = verified(&state).stage(FetchComments);

    Router::new()
        .route("/health", get(health))
        .route("/register-device", post(run).with_state(register_device))
        .route("/verify-device", get(run).with_state(verify_device))
        .route("/submit-post", post(run).with_state(submit_post))
        .route("/like-post", post(run).with_state(like_post))
        .route("/report", post(run).with_state(report))
        .route("/comment", post(run).with_state(comment))
        .route("/fetch/{tag}", get(run_tagged).with_state(fetch))
        .route("/fetch-comments", get(run).with_state(fetch_comments))
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse::default())
}

async fn run(State(pipeline): State<Pipeline>, req: Request) -> Response {
    pipeline.serve(req, Vec::new()).await
}

async fn run_tagged(
    State(pipeline): State<Pipeline>,
    Path(tag): Path<String>,
    req: Request,
) -> Response {
    pipeline.serve(req, vec![("tag".to_string(), tag)]).await
}
