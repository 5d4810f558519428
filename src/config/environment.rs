//! Environment selection and the environment diagnostic.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::settings::Environment;
use super::sources::Tier;

/// Variables whose presence marks a CI run.
pub const CI_INDICATORS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "TRAVIS",
    "CIRCLECI",
    "BUILDKITE",
    "AZURE_PIPELINES",
];

/// Variables whose presence marks a container deployment.
pub const CONTAINER_INDICATORS: &[&str] = &["KUBERNETES_SERVICE_HOST", "DOCKER_CONTAINER"];

/// Paths whose presence marks a container deployment, resolved against the
/// filesystem root handed to [`container_signal`].
pub const CONTAINER_MARKERS: &[&str] = &["/.dockerenv", "/var/run/secrets/kubernetes.io"];

/// Where the effective environment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvironmentOrigin {
    /// `ENVIRONMENT` was set in a tier.
    Configured { tier: Tier },
    /// Inferred from an indicator variable.
    Detected { signal: String },
    /// Nothing set; the built-in default applied.
    Default,
}

impl fmt::Display for EnvironmentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentOrigin::Configured { tier } => write!(f, "set by {}", tier),
            EnvironmentOrigin::Detected { signal } => write!(f, "detected from {}", signal),
            EnvironmentOrigin::Default => write!(f, "built-in default"),
        }
    }
}

fn first_present<'a>(env: &BTreeMap<String, String>, names: &[&'a str]) -> Option<&'a str> {
    names
        .iter()
        .copied()
        .find(|name| env.get(*name).map_or(false, |v| !v.is_empty()))
}

/// Returns the first CI indicator set in `env`.
pub fn ci_signal(env: &BTreeMap<String, String>) -> Option<&'static str> {
    first_present(env, CI_INDICATORS)
}

/// Returns the first container indicator set in `env`, then the first
/// container marker present under `system_root`.
pub fn container_signal(env: &BTreeMap<String, String>, system_root: &Path) -> Option<&'static str> {
    first_present(env, CONTAINER_INDICATORS).or_else(|| {
        CONTAINER_MARKERS
            .iter()
            .copied()
            .find(|marker| system_root.join(marker.trim_start_matches('/')).exists())
    })
}

/// Infers an environment when `ENVIRONMENT` is not configured anywhere.
///
/// CI signals select testing, container signals select production, and
/// anything else falls back to development.
pub fn detect(env: &BTreeMap<String, String>, system_root: &Path) -> (Environment, EnvironmentOrigin) {
    if let Some(signal) = ci_signal(env) {
        return (
            Environment::Testing,
            EnvironmentOrigin::Detected {
                signal: signal.to_string(),
            },
        );
    }
    if let Some(signal) = container_signal(env, system_root) {
        return (
            Environment::Production,
            EnvironmentOrigin::Detected {
                signal: signal.to_string(),
            },
        );
    }
    (Environment::Development, EnvironmentOrigin::Default)
}

/// Status of one configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Not present.
    Missing,
    /// Read and used.
    Loaded { entries: usize },
    /// Present but ignored because it could not be parsed.
    Skipped { reason: String },
}

/// One configuration file and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub tier: Tier,
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Diagnostic summary of the environment a resolution ran in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentInfo {
    /// Effective environment.
    pub environment: Environment,
    /// How it was chosen.
    pub origin: EnvironmentOrigin,
    /// CI indicator found in the process environment, if any.
    pub ci_signal: Option<String>,
    /// Container indicator or marker file found, if any.
    pub container_signal: Option<String>,
    /// Directory the source files were read from.
    pub working_directory: PathBuf,
    /// Every file tier that was consulted.
    pub files: Vec<SourceFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn detect_in_empty_root(pairs: &[(&str, &str)]) -> (Environment, EnvironmentOrigin) {
        let root = tempfile::tempdir().unwrap();
        detect(&env(pairs), root.path())
    }

    #[test]
    fn test_detect_ci() {
        let (environment, origin) = detect_in_empty_root(&[("GITHUB_ACTIONS", "true")]);
        assert_eq!(environment, Environment::Testing);
        assert_eq!(
            origin,
            EnvironmentOrigin::Detected {
                signal: "GITHUB_ACTIONS".to_string()
            }
        );
    }

    #[test]
    fn test_ci_wins_over_container() {
        let (environment, _) = detect_in_empty_root(&[("CI", "1"), ("KUBERNETES_SERVICE_HOST", "10.0.0.1")]);
        assert_eq!(environment, Environment::Testing);
    }

    #[test]
    fn test_detect_container() {
        let (environment, origin) = detect_in_empty_root(&[("DOCKER_CONTAINER", "yes")]);
        assert_eq!(environment, Environment::Production);
        assert_eq!(origin.to_string(), "detected from DOCKER_CONTAINER");
    }

    #[test]
    fn test_empty_indicator_ignored() {
        let (environment, origin) = detect_in_empty_root(&[("CI", "")]);
        assert_eq!(environment, Environment::Development);
        assert_eq!(origin, EnvironmentOrigin::Default);
    }

    #[test]
    fn test_detect_container_marker_files() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(container_signal(&env(&[]), root.path()), None);

        std::fs::create_dir_all(root.path().join("var/run/secrets/kubernetes.io")).unwrap();
        assert_eq!(
            container_signal(&env(&[]), root.path()),
            Some("/var/run/secrets/kubernetes.io")
        );

        std::fs::write(root.path().join(".dockerenv"), "").unwrap();
        let (environment, origin) = detect(&env(&[]), root.path());
        assert_eq!(environment, Environment::Production);
        assert_eq!(origin.to_string(), "detected from /.dockerenv");
    }

    #[test]
    fn test_container_variable_wins_over_marker() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(".dockerenv"), "").unwrap();
        assert_eq!(
            container_signal(&env(&[("DOCKER_CONTAINER", "1")]), root.path()),
            Some("DOCKER_CONTAINER")
        );
    }
}
