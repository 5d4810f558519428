//! Browser-facing views of the resolved settings.
//!
//! # Submodules
//!
//! - [`launch`] - Launch options for the browser automation engine

pub mod launch;

pub use launch::{browser_launch_options, LaunchOptions, Viewport, VIDEO_DIR};
