//! Configuration sources and the `.env` file format.
//!
//! Every tier is reduced to a [`SourceLayer`]: a flat map from upper-cased
//! option key to the raw string found in that tier. Typing happens later, in
//! the resolver, so each tier can be parsed without knowing the schema.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// File holding local secrets; highest file precedence.
pub const LOCAL_SECRETS_FILE: &str = ".env.local";

/// File holding local overrides.
pub const LOCAL_SETTINGS_FILE: &str = ".env";

/// One ranked source of configuration values.
///
/// Variants are declared from highest to lowest precedence, so the derived
/// ordering matches the lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Explicit in-process overrides.
    Override,
    /// Process environment variables.
    Environment,
    /// `.env.local`
    LocalSecrets,
    /// `.env`
    LocalSettings,
    /// `.env.<environment>`
    EnvironmentDefaults,
    /// Hard-coded defaults including the environment profile.
    Builtin,
}

impl Tier {
    /// All tiers in lookup order.
    pub const ALL: [Tier; 6] = [
        Tier::Override,
        Tier::Environment,
        Tier::LocalSecrets,
        Tier::LocalSettings,
        Tier::EnvironmentDefaults,
        Tier::Builtin,
    ];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Override => write!(f, "explicit override"),
            Tier::Environment => write!(f, "environment variable"),
            Tier::LocalSecrets => write!(f, "{}", LOCAL_SECRETS_FILE),
            Tier::LocalSettings => write!(f, "{}", LOCAL_SETTINGS_FILE),
            Tier::EnvironmentDefaults => write!(f, "environment defaults file"),
            Tier::Builtin => write!(f, "built-in default"),
        }
    }
}

/// Partial mapping of option key to raw value supplied by one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayer {
    tier: Tier,
    values: BTreeMap<String, String>,
}

impl SourceLayer {
    /// Creates an empty layer for `tier`.
    pub fn empty(tier: Tier) -> Self {
        Self {
            tier,
            values: BTreeMap::new(),
        }
    }

    /// Builds a layer from key/value pairs, upper-casing every key.
    pub fn from_pairs<I, K, V>(tier: Tier, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
            .collect();
        Self { tier, values }
    }

    /// Returns the tier this layer belongs to.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Looks up a raw value by upper-cased key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Iterates over keys in this layer.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of keys in this layer.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the layer supplies no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Normalizes a key to the canonical `GROUP__FIELD` upper-case form.
///
/// Dotted keys (`browser.headless`) are accepted as a convenience for
/// explicit overrides.
pub fn normalize_key(key: &str) -> String {
    key.trim().replace('.', "__").to_ascii_uppercase()
}

/// Snapshot of the process environment.
///
/// Variables that are not valid UTF-8 are dropped; no recognised option
/// name can contain them anyway.
pub fn process_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v): (OsString, OsString)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// A line of a `.env` file that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    /// Key named on the line, when one could be identified.
    pub key: Option<String>,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for MalformedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Result of parsing the text of a `.env` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEnvFile {
    /// Successfully parsed assignments, later lines winning.
    pub entries: BTreeMap<String, String>,
    /// Lines that could not be parsed.
    pub malformed: Vec<MalformedLine>,
}

/// Outcome of attempting to load one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLoad {
    /// The file does not exist.
    Missing,
    /// The file exists but could not be read as text.
    Unreadable(String),
    /// The file was read; it may still contain malformed lines.
    Parsed(ParsedEnvFile),
}

/// Reads and parses a `.env`-style file.
pub fn load_env_file(path: &Path) -> FileLoad {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let parsed = parse_env_file(&contents);
            debug!(
                path = %path.display(),
                entries = parsed.entries.len(),
                malformed = parsed.malformed.len(),
                "Loaded configuration file"
            );
            FileLoad::Parsed(parsed)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Configuration file not present");
            FileLoad::Missing
        }
        Err(e) => FileLoad::Unreadable(e.to_string()),
    }
}

/// Path of the environment-named defaults file, e.g. `.env.testing`.
pub fn environment_file_name(environment: &str) -> PathBuf {
    PathBuf::from(format!(".env.{}", environment))
}

/// Parses `KEY=value` lines.
///
/// Supported syntax: blank lines, `#` comments, an optional `export ` prefix,
/// single-quoted values (literal), double-quoted values (with `\n`, `\t`,
/// `\"` and `\\` escapes) and unquoted values with an optional trailing
/// ` # comment`.
pub fn parse_env_file(contents: &str) -> ParsedEnvFile {
    let mut parsed = ParsedEnvFile::default();

    for (index, raw_line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            parsed.malformed.push(MalformedLine {
                line: line_no,
                key: is_valid_key(line).then(|| normalize_key(line)),
                reason: "expected KEY=value".to_string(),
            });
            continue;
        };

        let key = raw_key.trim();
        if !is_valid_key(key) {
            parsed.malformed.push(MalformedLine {
                line: line_no,
                key: None,
                reason: format!("invalid key {:?}", key),
            });
            continue;
        }

        match parse_value(raw_value.trim()) {
            Ok(value) => {
                parsed.entries.insert(normalize_key(key), value);
            }
            Err(reason) => parsed.malformed.push(MalformedLine {
                line: line_no,
                key: Some(normalize_key(key)),
                reason,
            }),
        }
    }

    parsed
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(raw: &str) -> Result<String, String> {
    if let Some(rest) = raw.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => value.push(other),
                    None => break,
                },
                '"' => return trailing_comment_only(&rest[i + 1..]).map(|()| value),
                _ => value.push(c),
            }
        }
        return Err("unterminated double-quoted value".to_string());
    }

    if let Some(rest) = raw.strip_prefix('\'') {
        return match rest.find('\'') {
            Some(end) => trailing_comment_only(&rest[end + 1..]).map(|()| rest[..end].to_string()),
            None => Err("unterminated single-quoted value".to_string()),
        };
    }

    let value = match raw.find(" #") {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    Ok(value.trim_end().to_string())
}

fn trailing_comment_only(rest: &str) -> Result<(), String> {
    let rest = rest.trim_start();
    if rest.is_empty() || rest.starts_with('#') {
        Ok(())
    } else {
        Err("unexpected characters after closing quote".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_assignments() {
        let parsed = parse_env_file(
            "# comment\n\nENVIRONMENT=testing\nexport browser__headless = true\nAPI__BASE_URL=http://x/api # trailing\n",
        );

        assert!(parsed.malformed.is_empty());
        assert_eq!(parsed.entries.get("ENVIRONMENT").map(String::as_str), Some("testing"));
        assert_eq!(parsed.entries.get("BROWSER__HEADLESS").map(String::as_str), Some("true"));
        assert_eq!(parsed.entries.get("API__BASE_URL").map(String::as_str), Some("http://x/api"));
    }

    #[test]
    fn test_parse_quoted_values() {
        let parsed = parse_env_file(
            "A=\"hello # not a comment\"\nB='single $quoted'\nC=\"line\\nbreak\" # ok\nD=\n",
        );

        assert!(parsed.malformed.is_empty());
        assert_eq!(parsed.entries["A"], "hello # not a comment");
        assert_eq!(parsed.entries["B"], "single $quoted");
        assert_eq!(parsed.entries["C"], "line\nbreak");
        assert_eq!(parsed.entries["D"], "");
    }

    #[test]
    fn test_parse_reports_malformed_lines() {
        let parsed = parse_env_file("GOOD=1\nJUST_A_WORD\n9BAD=1\nOPEN=\"never closed\nHAS KEY=1\n");

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.malformed.len(), 4);
        assert_eq!(parsed.malformed[0].line, 2);
        assert_eq!(parsed.malformed[0].key.as_deref(), Some("JUST_A_WORD"));
        assert_eq!(parsed.malformed[1].key, None);
        assert_eq!(parsed.malformed[2].key.as_deref(), Some("OPEN"));
        assert!(parsed.malformed[2].reason.contains("unterminated"));
        assert_eq!(parsed.malformed[3].key, None);
    }

    #[test]
    fn test_later_lines_win() {
        let parsed = parse_env_file("X=1\nX=2\n");
        assert_eq!(parsed.entries["X"], "2");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_env_file(&dir.path().join(".env")), FileLoad::Missing);
    }

    #[test]
    fn test_load_non_utf8_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(load_env_file(&path), FileLoad::Unreadable(_)));
    }

    #[test]
    fn test_layer_normalizes_keys() {
        let layer = SourceLayer::from_pairs(Tier::Override, [("browser.headless", "true")]);
        assert_eq!(layer.get("BROWSER__HEADLESS"), Some("true"));
        assert_eq!(layer.tier(), Tier::Override);
    }

    #[test]
    fn test_tier_order_matches_precedence() {
        let mut tiers = Tier::ALL.to_vec();
        tiers.sort();
        assert_eq!(tiers, Tier::ALL.to_vec());
        assert!(Tier::Environment < Tier::LocalSecrets);
        assert!(Tier::LocalSecrets < Tier::LocalSettings);
    }
}
