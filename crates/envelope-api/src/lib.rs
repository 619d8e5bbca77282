//! HTTP surface of the envelope service: the stage pipeline, the stages
//! and the router that wires them to endpoints.

pub mod comments;
pub mod devices;
pub mod error;
pub mod feed;
pub mod likes;
pub mod pipeline;
pub mod posts;
pub mod reports;
pub mod routes;
pub mod stages;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, AppStateInner, Settings};
