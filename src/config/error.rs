//! Configuration errors.
//!
//! Resolution never stops at the first bad value: every problem found while
//! folding the tiers is recorded as a [`Violation`] and reported together in
//! [`ConfigError::Invalid`], so a single editing pass can fix them all.

use std::fmt;

use thiserror::Error;

use super::sources::Tier;

/// Errors that can occur during configuration resolution or diagnostics.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more options failed validation.
    #[error("{}", ValidationReport(.0))]
    Invalid(Vec<Violation>),

    /// Failed to access the working directory.
    #[error("Failed to access working directory: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to serialize settings as TOML.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to serialize settings as JSON.
    #[error("Failed to serialize JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ConfigError {
    /// Returns the collected violations, or an empty slice for other errors.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Invalid(violations) => violations,
            _ => &[],
        }
    }

    /// Returns true if any violation refers to `key`.
    pub fn mentions(&self, key: &str) -> bool {
        self.violations().iter().any(|v| v.key == key)
    }
}

/// Category of a single configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A key with no default and no value in any tier.
    MissingRequiredOption,
    /// A resolved value failed its type or range check.
    TypeOrRangeViolation,
    /// A source file could not be parsed at a line naming a required key.
    UnreadableSourceFile,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::MissingRequiredOption => write!(f, "missing required option"),
            ViolationKind::TypeOrRangeViolation => write!(f, "invalid value"),
            ViolationKind::UnreadableSourceFile => write!(f, "unreadable source"),
        }
    }
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Option key in `GROUP__FIELD` form.
    pub key: String,
    /// Tier the offending value came from, if any.
    pub tier: Option<Tier>,
    /// Problem category.
    pub kind: ViolationKind,
    /// Human readable description of the accepted type or range.
    pub expected: String,
    /// Offending raw value, already redacted for sensitive keys.
    pub found: Option<String>,
}

impl Violation {
    pub(crate) fn missing(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tier: None,
            kind: ViolationKind::MissingRequiredOption,
            expected: "a value in any configuration tier".to_string(),
            found: None,
        }
    }

    pub(crate) fn invalid(
        key: impl Into<String>,
        tier: Option<Tier>,
        expected: impl Into<String>,
        found: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            tier,
            kind: ViolationKind::TypeOrRangeViolation,
            expected: expected.into(),
            found,
        }
    }

    pub(crate) fn unreadable(key: impl Into<String>, tier: Tier, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tier: Some(tier),
            kind: ViolationKind::UnreadableSourceFile,
            expected: reason.into(),
            found: None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.kind)?;
        if let Some(ref found) = self.found {
            write!(f, " {:?}", found)?;
        }
        if let Some(tier) = self.tier {
            write!(f, " (from {})", tier)?;
        }
        write!(f, "; expected {}", self.expected)
    }
}

struct ValidationReport<'a>(&'a [Violation]);

impl fmt::Display for ValidationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid configuration ({} problem", self.0.len())?;
        if self.0.len() != 1 {
            write!(f, "s")?;
        }
        write!(f, ")")?;
        for violation in self.0 {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_every_violation() {
        let err = ConfigError::Invalid(vec![
            Violation::missing("SECURITY__SECRET_KEY"),
            Violation::invalid(
                "BROWSER__TIMEOUT",
                Some(Tier::Environment),
                "an integer between 5000 and 300000",
                Some("0".to_string()),
            ),
        ]);

        let message = err.to_string();
        assert!(message.starts_with("Invalid configuration (2 problems)"));
        assert!(message.contains("SECURITY__SECRET_KEY: missing required option"));
        assert!(message.contains("BROWSER__TIMEOUT: invalid value \"0\" (from environment variable)"));
        assert!(message.contains("expected an integer between 5000 and 300000"));
        assert!(err.mentions("BROWSER__TIMEOUT"));
        assert!(!err.mentions("API__TIMEOUT"));
    }

    #[test]
    fn test_violations_empty_for_io_errors() {
        let err = ConfigError::from(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
        assert!(err.violations().is_empty());
    }
}
