//! Wire types shared between the Envelope API and its clients.
//!
//! Everything here is plain serde data; HTTP concerns live in `envelope-api`.

pub mod api;
pub mod errors;
pub mod models;
