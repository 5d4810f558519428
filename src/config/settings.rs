//! Resolved settings for the end-to-end suite.
//!
//! A [`Settings`] value is the immutable result of folding every
//! configuration tier. It is built once per run by
//! [`ConfigResolver`](super::ConfigResolver) and handed to the components
//! that need it, usually behind an `Arc`.
//!
//! # Groups
//!
//! | Group         | Env prefix       | Purpose                              |
//! |---------------|------------------|--------------------------------------|
//! | `browser`     | `BROWSER__`      | browser engine launch parameters     |
//! | `api`         | `API__`          | HTTP client behaviour                |
//! | `database`    | `DATABASE__`     | test data store                      |
//! | `logging`     | `LOGGING__`      | log sinks and verbosity              |
//! | `test`        | `TEST__`         | execution, reporting, feature flags  |
//! | `performance` | `PERFORMANCE__`  | monitoring thresholds                |
//! | `security`    | `SECURITY__`     | keys and tokens (always redacted)    |

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::Violation;
use super::options::DEVELOPMENT_SECRET_KEY;
use super::sources::Tier;

/// Named deployment context selecting the environment defaults file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Development,
    /// CI or dedicated test environment.
    Testing,
    /// Production-like target.
    Production,
}

impl Environment {
    /// Accepted names, lower case.
    pub const NAMES: &'static [&'static str] = &["development", "testing", "production"];

    /// Returns the lower-case name used in file names and variables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "testing" => Ok(Environment::Testing),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "Unknown environment: {}. Valid environments are: {}",
                other,
                Environment::NAMES.join(", ")
            )),
        }
    }
}

/// Supported browser engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserName {
    /// Chromium.
    Chromium,
    /// Firefox.
    Firefox,
    /// WebKit.
    Webkit,
    /// Branded Chrome.
    Chrome,
    /// Safari.
    Safari,
}

impl BrowserName {
    /// Accepted names, lower case.
    pub const NAMES: &'static [&'static str] = &["chromium", "firefox", "webkit", "chrome", "safari"];
}

/// When screenshots are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotMode {
    /// Never.
    Off,
    /// After every test.
    On,
    /// Only after failed tests.
    OnlyOnFailure,
}

impl ScreenshotMode {
    /// Accepted names.
    pub const NAMES: &'static [&'static str] = &["off", "on", "only-on-failure"];
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Accepted names, upper case.
    pub const NAMES: &'static [&'static str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Full format with targets.
    Structured,
    /// Compact single line.
    Simple,
    /// JSON lines.
    Json,
}

impl LogFormat {
    /// Accepted names.
    pub const NAMES: &'static [&'static str] = &["structured", "simple", "json"];
}

/// Report generators understood by the reporting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Json,
    Xml,
    Allure,
    Junit,
}

impl ReportFormat {
    /// Accepted names.
    pub const NAMES: &'static [&'static str] = &["html", "json", "xml", "allure", "junit"];
}

/// Browser launch and behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserSettings {
    /// Browser engine.
    pub name: BrowserName,
    /// Run without a visible window.
    pub headless: bool,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Default operation timeout in milliseconds.
    pub timeout: u64,
    /// Delay inserted between operations, in milliseconds.
    pub slow_mo: u64,
    /// Upper bound on simultaneously running browsers.
    pub max_concurrent_browsers: u32,
    /// Extra command line arguments.
    pub args: Vec<String>,
    /// Record a video per test.
    pub record_video: bool,
    /// Screenshot capture policy.
    pub screenshot_mode: ScreenshotMode,
}

/// HTTP client settings for API tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSettings {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Maximum retry attempts after the first request.
    pub max_retries: u32,
    /// Base retry delay in seconds.
    pub retry_delay: f64,
    /// Verify TLS certificates.
    pub validate_ssl: bool,
    /// Headers sent with every request.
    pub default_headers: BTreeMap<String, String>,
}

/// Test data store connection.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl DatabaseSettings {
    /// PostgreSQL connection string, optionally with the password.
    pub fn connection_string(&self, include_password: bool) -> String {
        match self.password {
            Some(ref password) if include_password => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.username, password, self.host, self.port, self.name
            ),
            _ => format!(
                "postgresql://{}@{}:{}/{}",
                self.username, self.host, self.port, self.name
            ),
        }
    }
}

/// Logging sinks and verbosity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format_type: LogFormat,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub file_path: PathBuf,
    /// Rotate the log file once it exceeds this size.
    pub max_file_size_mb: u64,
    /// Number of rotated files to keep.
    pub backup_count: u32,
    pub correlation_id_enabled: bool,
    pub performance_logging: bool,
}

/// Test execution, reporting and feature flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSettings {
    pub parallel_workers: u32,
    pub cleanup_data: bool,
    pub generate_report: bool,
    pub report_formats: Vec<ReportFormat>,
    pub enable_visual_testing: bool,
    pub enable_accessibility_testing: bool,
    pub enable_performance_testing: bool,
    pub enable_api_contract_testing: bool,
    pub test_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
}

/// Performance monitoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceSettings {
    pub enable_monitoring: bool,
    /// Milliseconds.
    pub page_load_threshold: u64,
    /// Milliseconds.
    pub api_response_threshold: u64,
    /// Megabytes.
    pub memory_usage_threshold: u64,
}

/// Secrets. Every value here is redacted by [`safe_view`](super::safe_view).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySettings {
    pub secret_key: String,
    pub jwt_secret: Option<String>,
    pub jwt_expiry_hours: u32,
    pub api_secret_key: Option<String>,
}

impl fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |v: &Option<String>| v.as_ref().map(|_| "********");
        f.debug_struct("SecuritySettings")
            .field("secret_key", &"********")
            .field("jwt_secret", &masked(&self.jwt_secret))
            .field("jwt_expiry_hours", &self.jwt_expiry_hours)
            .field("api_secret_key", &masked(&self.api_secret_key))
            .finish()
    }
}

/// Complete, validated configuration for one test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub environment: Environment,
    pub debug: bool,
    pub app_name: String,
    pub app_version: String,
    /// Base URL of the application under test.
    pub sock_shop_base_url: String,
    pub browser: BrowserSettings,
    pub api: ApiSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub test: TestSettings,
    pub performance: PerformanceSettings,
    pub security: SecuritySettings,
}

impl Settings {
    /// Returns true when running against production.
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Returns true when running in the testing environment.
    pub fn is_testing(&self) -> bool {
        self.environment == Environment::Testing
    }

    /// Returns true when running in development.
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Cross-field checks that cannot be expressed per option.
    ///
    /// `tier_of` reports where a key's value came from so violations can
    /// point at the file or variable to edit. `usable` is false for keys
    /// that already failed their own check; rules reading such a key are
    /// skipped.
    pub(crate) fn validate(
        &self,
        tier_of: impl Fn(&str) -> Option<Tier>,
        usable: impl Fn(&str) -> bool,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        if usable("DATABASE__MIN_CONNECTIONS")
            && usable("DATABASE__MAX_CONNECTIONS")
            && self.database.min_connections > self.database.max_connections
        {
            violations.push(Violation::invalid(
                "DATABASE__MIN_CONNECTIONS",
                tier_of("DATABASE__MIN_CONNECTIONS"),
                format!(
                    "at most DATABASE__MAX_CONNECTIONS ({})",
                    self.database.max_connections
                ),
                Some(self.database.min_connections.to_string()),
            ));
        }

        if self.is_production() && usable("ENVIRONMENT") {
            let mut require = |key: &str, ok: bool, expected: &str, found: String| {
                if usable(key) && !ok {
                    violations.push(Violation::invalid(key, tier_of(key), expected, Some(found)));
                }
            };
            require(
                "BROWSER__HEADLESS",
                self.browser.headless,
                "true in production",
                self.browser.headless.to_string(),
            );
            require("DEBUG", !self.debug, "false in production", self.debug.to_string());
            require(
                "API__VALIDATE_SSL",
                self.api.validate_ssl,
                "true in production",
                self.api.validate_ssl.to_string(),
            );
            require(
                "SECURITY__SECRET_KEY",
                self.security.secret_key != DEVELOPMENT_SECRET_KEY,
                "a production secret key, not the development default",
                "********".to_string(),
            );
        }

        violations
    }

    /// Non-fatal observations about the resolved values.
    pub(crate) fn advisories(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.is_testing() && self.browser.slow_mo > 0 {
            notes.push(format!(
                "BROWSER__SLOW_MO is {}ms in the testing environment; this slows down every test",
                self.browser.slow_mo
            ));
        }
        notes
    }
}
