//! # Sock Shop E2E Config
//!
//! Layered configuration for the Sock Shop end-to-end test suite.
//!
//! Browser and API tests read one immutable [`config::Settings`] value,
//! resolved from explicit overrides, the process environment, local `.env`
//! files, an environment-named defaults file and hard-coded defaults.
//!
//! ## Features
//!
//! - **Per-key precedence**: the highest tier that defines a key wins
//! - **Environment profiles**: `development`, `testing` and `production`
//!   defaults, with production policy enforced at validation time
//! - **Collected validation**: every missing or malformed option is
//!   reported in one error
//! - **Redaction**: secrets never appear in dumps or error messages
//! - **Derived views**: browser launch options and API client options
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockshop_e2e_config::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let resolver = ConfigResolver::new()?;
//!     let settings = resolver.settings()?;
//!
//!     let launch = browser_launch_options(&settings);
//!     let client = api_client_options(&settings);
//!     println!("{:?} against {}", launch.browser, client.base_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Tiers, option registry, resolver, validation and redaction
//! - [`browser`]: Launch options for the browser engine
//! - [`api`]: HTTP client options and retry schedule
//! - [`logging`]: Tracing subscriber driven by the `logging` settings
//!
//! ## Configuration
//!
//! Precedence, highest first:
//! 1. Explicit overrides
//! 2. Environment variables (`GROUP__FIELD`, e.g. `API__TIMEOUT`)
//! 3. `.env.local`
//! 4. `.env`
//! 5. `.env.<environment>`
//! 6. Hard-coded defaults and the environment profile
//!
//! See [`config::OPTIONS`] for every recognised key.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Layered settings resolution, validation and redaction.
pub mod config;

/// Browser launch options derived from the settings.
pub mod browser;

/// API client options derived from the settings.
pub mod api;

/// Tracing subscriber setup.
pub mod logging;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Config types
pub use config::{
    safe_view, ConfigError, ConfigResolver, Environment, Resolution, Settings, Tier, Violation,
    ViolationKind,
};

// Derived views
pub use api::{api_client_options, ApiClientOptions};
pub use browser::{browser_launch_options, LaunchOptions, Viewport};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use sockshop_e2e_config::prelude::*;
/// ```
pub mod prelude {
    pub use crate::api::{api_client_options, ApiClientOptions};
    pub use crate::browser::{browser_launch_options, LaunchOptions};
    pub use crate::config::{safe_view, ConfigError, ConfigResolver, Environment, Settings};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_views() {
        use crate::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        let settings = ConfigResolver::in_dir(dir.path())
            .with_env(Vec::<(String, String)>::new())
            .resolve()
            .unwrap();
        assert_eq!(browser_launch_options(&settings).timeout, settings.browser.timeout);
        assert_eq!(api_client_options(&settings).base_url, settings.api.base_url);
    }
}
