//! API-facing views of the resolved settings.
//!
//! # Submodules
//!
//! - [`client`] - HTTP client options and retry schedule

pub mod client;

pub use client::{api_client_options, ApiClientOptions, BACKOFF_MULTIPLIER};
