//! Service-specific client implementations
//!
//! This module contains the prediction service client and the HTTP plumbing
//! it runs on.

pub mod prediction;
mod common;

pub use common::{HttpTransport, UserAgent};
