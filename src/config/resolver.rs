//! Layered configuration resolution.
//!
//! [`ConfigResolver`] folds the configuration tiers into one [`Settings`]
//! value. Lookup is per option key, highest tier first:
//!
//! 1. Explicit overrides ([`ConfigResolver::with_override`])
//! 2. Process environment variables (`GROUP__FIELD`, e.g. `BROWSER__HEADLESS`)
//! 3. `.env.local`
//! 4. `.env`
//! 5. `.env.<environment>`
//! 6. Hard-coded defaults and the environment profile
//!
//! A key missing from one tier falls through to the next even when other
//! keys of the same group were found, so a file may set a single field.
//!
//! # Example
//!
//! ```rust,no_run
//! use sockshop_e2e_config::config::ConfigResolver;
//!
//! let resolver = ConfigResolver::new()?
//!     .with_override("browser.headless", "true");
//! let settings = resolver.settings()?;
//! assert!(settings.browser.headless);
//! # Ok::<(), sockshop_e2e_config::config::ConfigError>(())
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::environment::{
    ci_signal, container_signal, detect, EnvironmentInfo, EnvironmentOrigin, FileStatus, SourceFile,
};
use super::error::{ConfigError, Violation};
use super::options::{builtin_value, lookup, Fallback, OptionSpec, OPTIONS};
use super::redact::{is_sensitive_key, mask_url_password, MASK};
use super::settings::{Environment, Settings};
use super::sources::{
    environment_file_name, load_env_file, normalize_key, process_environment, FileLoad, SourceLayer,
    Tier, LOCAL_SECRETS_FILE, LOCAL_SETTINGS_FILE,
};

/// Settings together with where each value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The validated settings.
    pub settings: Settings,
    /// Tier that supplied each key. Optional keys left unset are absent.
    pub sources: BTreeMap<String, Tier>,
    /// Environment selection and file status.
    pub info: EnvironmentInfo,
    /// Non-fatal problems: skipped files, advisories.
    pub warnings: Vec<String>,
}

/// Builds [`Settings`] from overrides, the process environment and the
/// `.env` files of a working directory.
#[derive(Clone)]
pub struct ConfigResolver {
    root: PathBuf,
    system_root: PathBuf,
    env: BTreeMap<String, String>,
    overrides: SourceLayer,
    detect: bool,
    cache: OnceCell<Arc<Settings>>,
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env = masked(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let overrides = masked(
            self.overrides
                .keys()
                .filter_map(|k| self.overrides.get(k).map(|v| (k, v))),
        );
        f.debug_struct("ConfigResolver")
            .field("root", &self.root)
            .field("system_root", &self.system_root)
            .field("env", &env)
            .field("overrides", &overrides)
            .field("detect", &self.detect)
            .field("cached", &self.cache.get().is_some())
            .finish()
    }
}

/// Copies `pairs` with secrets masked, for debug output.
fn masked<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> BTreeMap<&'a str, String> {
    pairs
        .map(|(key, value)| {
            let sensitive = is_sensitive_key(key)
                || lookup(&normalize_key(key)).map_or(false, OptionSpec::is_sensitive);
            let shown = if sensitive {
                MASK.to_string()
            } else {
                mask_url_password(value).unwrap_or_else(|| value.to_string())
            };
            (key, shown)
        })
        .collect()
}

#[derive(Default)]
struct Report {
    warnings: Vec<String>,
    violations: Vec<Violation>,
    files: Vec<SourceFile>,
}

impl Report {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

struct Gathered {
    layers: Vec<SourceLayer>,
    environment: Environment,
    origin: EnvironmentOrigin,
}

impl ConfigResolver {
    /// Resolver over the current directory and process environment.
    ///
    /// # Errors
    ///
    /// Fails only if the current directory cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::in_dir(std::env::current_dir()?))
    }

    /// Resolver reading files from `root` and the process environment.
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            system_root: PathBuf::from("/"),
            env: process_environment(),
            overrides: SourceLayer::empty(Tier::Override),
            detect: false,
            cache: OnceCell::new(),
        }
    }

    /// Replaces the environment snapshot, mainly for tests.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.cache = OnceCell::new();
        self
    }

    /// Sets an explicit override that beats every other tier.
    ///
    /// `key` may be written `browser.headless`, `browser__headless` or
    /// `BROWSER__HEADLESS`. Unknown keys are ignored with a warning.
    pub fn with_override(mut self, key: &str, value: impl Into<String>) -> Self {
        let normalized = normalize_key(key);
        if lookup(&normalized).is_some() {
            self.overrides.insert(&normalized, value);
            self.cache = OnceCell::new();
        } else {
            warn!(key = %key, "Ignoring override for unknown configuration key");
        }
        self
    }

    /// Filesystem root searched for container marker files, `/` by default.
    pub fn with_system_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.system_root = root.into();
        self.cache = OnceCell::new();
        self
    }

    /// Enables inference of the environment from CI and container signals
    /// when `ENVIRONMENT` is not set in any tier.
    pub fn detect_environment(mut self, enabled: bool) -> Self {
        self.detect = enabled;
        self.cache = OnceCell::new();
        self
    }

    /// Directory the `.env` files are read from.
    pub fn working_dir(&self) -> &Path {
        &self.root
    }

    /// Resolves a fresh, validated [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every violation found.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        self.resolve_detailed().map(|resolution| resolution.settings)
    }

    /// Resolves settings and reports provenance and warnings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every violation found.
    pub fn resolve_detailed(&self) -> Result<Resolution, ConfigError> {
        let mut report = Report::default();
        let gathered = self.gather(&mut report);

        let mut document = Map::new();
        let mut sources = BTreeMap::new();
        // Keys without a usable value; they are filled with a stand-in so
        // the cross-field rules that do not involve them still run.
        let mut padded = HashSet::new();

        for spec in OPTIONS {
            let found = gathered
                .layers
                .iter()
                .find_map(|layer| raw_value(layer, spec).map(|raw| (layer.tier(), raw)));

            let value = match found {
                Some((tier, raw)) => {
                    sources.insert(spec.key.to_string(), tier);
                    spec.kind.coerce(raw).unwrap_or_else(|| {
                        report.violations.push(Violation::invalid(
                            spec.key,
                            Some(tier),
                            spec.kind.expected(),
                            Some(spec.display_value(raw)),
                        ));
                        padded.insert(spec.key);
                        stand_in(spec, gathered.environment)
                    })
                }
                None if spec.fallback == Fallback::Required => {
                    report.violations.push(Violation::missing(spec.key));
                    padded.insert(spec.key);
                    stand_in(spec, gathered.environment)
                }
                None => Value::Null,
            };

            insert_at(&mut document, spec, value);
        }

        let settings: Settings = match serde_json::from_value(Value::Object(document)) {
            Ok(settings) => settings,
            Err(_) if !report.violations.is_empty() => {
                return Err(ConfigError::Invalid(report.violations));
            }
            Err(e) => {
                return Err(ConfigError::Invalid(vec![Violation::invalid(
                    "SETTINGS",
                    None,
                    format!("a complete settings document ({})", e),
                    None,
                )]))
            }
        };

        report.violations.extend(settings.validate(
            |key| sources.get(key).copied(),
            |key| !padded.contains(key),
        ));
        if !report.violations.is_empty() {
            return Err(ConfigError::Invalid(report.violations));
        }

        for advisory in settings.advisories() {
            report.warn(advisory);
        }

        debug!(
            environment = %settings.environment,
            keys = sources.len(),
            "Configuration resolved"
        );

        Ok(Resolution {
            info: self.info(&gathered, report.files),
            settings,
            sources,
            warnings: report.warnings,
        })
    }

    /// Resolves once and returns the cached instance on later calls.
    ///
    /// # Errors
    ///
    /// Returns the resolution error; nothing is cached on failure.
    pub fn settings(&self) -> Result<Arc<Settings>, ConfigError> {
        self.cache
            .get_or_try_init(|| self.resolve().map(Arc::new))
            .map(Arc::clone)
    }

    /// Drops the cached settings and resolves again.
    ///
    /// Instances handed out earlier are unaffected.
    ///
    /// # Errors
    ///
    /// Returns the resolution error.
    pub fn reload(&mut self) -> Result<Arc<Settings>, ConfigError> {
        self.cache = OnceCell::new();
        self.settings()
    }

    /// Effective environment without validating the other options.
    pub fn environment(&self) -> Environment {
        self.gather(&mut Report::default()).environment
    }

    /// Environment diagnostic, available even when validation would fail.
    pub fn environment_info(&self) -> EnvironmentInfo {
        let mut report = Report::default();
        let gathered = self.gather(&mut report);
        self.info(&gathered, report.files)
    }

    fn info(&self, gathered: &Gathered, files: Vec<SourceFile>) -> EnvironmentInfo {
        EnvironmentInfo {
            environment: gathered.environment,
            origin: gathered.origin.clone(),
            ci_signal: ci_signal(&self.env).map(str::to_string),
            container_signal: container_signal(&self.env, &self.system_root).map(str::to_string),
            working_directory: self.root.clone(),
            files,
        }
    }

    /// Loads every tier, choosing the environment before the
    /// environment-named file is read.
    fn gather(&self, report: &mut Report) -> Gathered {
        let environment_layer = self.environment_layer();
        let secrets = self.load_file(Tier::LocalSecrets, Path::new(LOCAL_SECRETS_FILE), report);
        let local = self.load_file(Tier::LocalSettings, Path::new(LOCAL_SETTINGS_FILE), report);

        let (environment, origin) =
            self.select_environment(&[&self.overrides, &environment_layer, &secrets, &local]);

        let mut defaults = self.load_file(
            Tier::EnvironmentDefaults,
            &environment_file_name(environment.as_str()),
            report,
        );
        if defaults.remove("ENVIRONMENT").is_some() {
            report.warn(format!(
                "Ignoring ENVIRONMENT in {}; it cannot select another environment",
                environment_file_name(environment.as_str()).display()
            ));
        }

        Gathered {
            layers: vec![
                self.overrides.clone(),
                environment_layer,
                secrets,
                local,
                defaults,
                builtin_layer(environment),
            ],
            environment,
            origin,
        }
    }

    fn select_environment(&self, layers: &[&SourceLayer]) -> (Environment, EnvironmentOrigin) {
        for layer in layers {
            if let Some(raw) = layer.get("ENVIRONMENT") {
                // An invalid name is reported by validation; keep loading
                // files as development so other problems surface too.
                let environment = raw.parse().unwrap_or_default();
                return (environment, EnvironmentOrigin::Configured { tier: layer.tier() });
            }
        }
        if self.detect {
            detect(&self.env, &self.system_root)
        } else {
            (Environment::Development, EnvironmentOrigin::Default)
        }
    }

    fn environment_layer(&self) -> SourceLayer {
        SourceLayer::from_pairs(
            Tier::Environment,
            self.env
                .iter()
                .filter(|(key, _)| lookup(&normalize_key(key)).is_some())
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )
    }

    fn load_file(&self, tier: Tier, name: &Path, report: &mut Report) -> SourceLayer {
        let path = self.root.join(name);
        let (layer, status) = match load_env_file(&path) {
            FileLoad::Missing => (SourceLayer::empty(tier), FileStatus::Missing),
            FileLoad::Unreadable(reason) => {
                report.warn(format!("Skipping {}: {}", path.display(), reason));
                (SourceLayer::empty(tier), FileStatus::Skipped { reason })
            }
            FileLoad::Parsed(parsed) if parsed.malformed.is_empty() => {
                let ignored: Vec<&String> = parsed.entries.keys().filter(|k| lookup(k).is_none()).collect();
                if !ignored.is_empty() {
                    debug!(path = %path.display(), keys = ?ignored, "Ignoring unknown keys");
                }
                let entries = parsed.entries.len();
                (
                    SourceLayer::from_pairs(tier, parsed.entries),
                    FileStatus::Loaded { entries },
                )
            }
            FileLoad::Parsed(parsed) => {
                for line in &parsed.malformed {
                    let required = line
                        .key
                        .as_deref()
                        .and_then(lookup)
                        .filter(|spec| spec.fallback == Fallback::Required);
                    if let Some(spec) = required {
                        report.violations.push(Violation::unreadable(
                            spec.key,
                            tier,
                            format!("a parsable line in {} ({})", path.display(), line),
                        ));
                    }
                }
                let reason = parsed
                    .malformed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                report.warn(format!("Skipping {}: {}", path.display(), reason));
                (SourceLayer::empty(tier), FileStatus::Skipped { reason })
            }
        };
        report.files.push(SourceFile { tier, path, status });
        layer
    }
}

fn builtin_layer(environment: Environment) -> SourceLayer {
    let mut layer = SourceLayer::from_pairs(
        Tier::Builtin,
        OPTIONS
            .iter()
            .filter_map(|spec| builtin_value(spec, environment).map(|raw| (spec.key, raw))),
    );
    layer.insert("ENVIRONMENT", environment.as_str());
    layer
}

/// Built-in value for `spec`, or a well-typed placeholder when there is none.
fn stand_in(spec: &OptionSpec, environment: Environment) -> Value {
    builtin_value(spec, environment)
        .and_then(|raw| spec.kind.coerce(raw))
        .unwrap_or_else(|| spec.kind.placeholder())
}

/// Canonical key first, then aliases, within a single tier.
fn raw_value<'a>(layer: &'a SourceLayer, spec: &OptionSpec) -> Option<&'a str> {
    layer
        .get(spec.key)
        .or_else(|| spec.aliases.iter().find_map(|alias| layer.get(alias)))
}

fn insert_at(document: &mut Map<String, Value>, spec: &OptionSpec, value: Value) {
    match spec.path() {
        (Some(group), field) => {
            let entry = document
                .entry(group)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ref mut fields) = *entry {
                fields.insert(field, value);
            }
        }
        (None, field) => {
            document.insert(field, value);
        }
    }
}
