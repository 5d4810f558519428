//! Browser launch options derived from [`Settings`].
//!
//! The automation engine itself is an external collaborator; this module only
//! maps the `browser` group onto the option set it consumes.
//!
//! # Example
//!
//! ```rust
//! use sockshop_e2e_config::browser::LaunchOptions;
//!
//! let options = LaunchOptions::default()
//!     .headless(true)
//!     .viewport(1280, 720)
//!     .add_arg("--disable-extensions");
//! assert_eq!(options.viewport.width, 1280);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{BrowserName, ScreenshotMode, Settings};

/// Directory videos are written to when recording is enabled.
pub const VIDEO_DIR: &str = "reports/videos";

/// Viewport dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Options handed to the browser engine when launching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Engine to launch.
    pub browser: BrowserName,

    /// Run browser in headless mode (no visible window).
    pub headless: bool,

    /// Delay between operations in milliseconds.
    pub slow_mo: u64,

    /// Timeout for browser operations in milliseconds.
    pub timeout: u64,

    /// Additional browser launch arguments.
    pub args: Vec<String>,

    /// Page viewport.
    pub viewport: Viewport,

    /// Where to record videos; `None` disables recording.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_video_dir: Option<PathBuf>,

    /// Screenshot capture policy.
    pub screenshot_mode: ScreenshotMode,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser: BrowserName::Chromium,
            headless: false,
            slow_mo: 0,
            timeout: 30_000,
            args: Vec::new(),
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            record_video_dir: None,
            screenshot_mode: ScreenshotMode::OnlyOnFailure,
        }
    }
}

impl LaunchOptions {
    /// Sets headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets viewport size.
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Sets operation timeout in milliseconds.
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a browser launch argument.
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Enables video recording into `dir`.
    pub fn record_video(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_video_dir = Some(dir.into());
        self
    }
}

/// Maps the `browser` group onto [`LaunchOptions`].
pub fn browser_launch_options(settings: &Settings) -> LaunchOptions {
    let browser = &settings.browser;
    LaunchOptions {
        browser: browser.name,
        headless: browser.headless,
        slow_mo: browser.slow_mo,
        timeout: browser.timeout,
        args: browser.args.clone(),
        viewport: Viewport {
            width: browser.viewport_width,
            height: browser.viewport_height,
        },
        record_video_dir: browser.record_video.then(|| PathBuf::from(VIDEO_DIR)),
        screenshot_mode: browser.screenshot_mode,
    }
}
