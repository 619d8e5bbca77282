//! Stages shared by several endpoints: request decoding, identity and
//! the region gate.

pub mod client_addr;
pub mod form;
pub mod identity;
pub mod region;

pub use client_addr::ClientAddr;
pub use form::ParseForm;
pub use identity::{ExtractDeviceId, VerifyDeviceId};
pub use region::RegionCheck;
