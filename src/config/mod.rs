//! Configuration module for the Sock Shop end-to-end suite.
//!
//! This module resolves a single immutable [`Settings`] value from several
//! ranked sources:
//! - Explicit in-process overrides
//! - Process environment variables (`GROUP__FIELD`)
//! - `.env.local` and `.env` in the working directory
//! - The environment-named defaults file, e.g. `.env.testing`
//! - Hard-coded defaults with a per-environment profile
//!
//! # Example
//!
//! ```rust,no_run
//! use sockshop_e2e_config::config::{safe_view, ConfigResolver};
//!
//! let settings = ConfigResolver::new()?.resolve()?;
//! if settings.is_testing() {
//!     println!("{}", safe_view(&settings)?);
//! }
//! # Ok::<(), sockshop_e2e_config::config::ConfigError>(())
//! ```

mod environment;
mod error;
mod options;
mod redact;
mod resolver;
mod settings;
mod sources;

pub use environment::{EnvironmentInfo, EnvironmentOrigin, FileStatus, SourceFile};
pub use error::{ConfigError, Violation, ViolationKind};
pub use options::{parse_bool, Fallback, OptionKind, OptionSpec, DEVELOPMENT_SECRET_KEY, OPTIONS};
pub use redact::{is_sensitive_key, render_safe, safe_view, safe_view_flat, DumpFormat, MASK};
pub use resolver::{ConfigResolver, Resolution};
pub use settings::{
    ApiSettings, BrowserName, BrowserSettings, DatabaseSettings, Environment, LogFormat, LogLevel,
    LoggingSettings, PerformanceSettings, ReportFormat, ScreenshotMode, SecuritySettings, Settings,
    TestSettings,
};
pub use sources::{parse_env_file, Tier, LOCAL_SECRETS_FILE, LOCAL_SETTINGS_FILE};
