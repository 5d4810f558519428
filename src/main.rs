//! e2e-config - configuration diagnostics for the Sock Shop suite.
//!
//! Prints the effective environment, a redacted settings dump or the derived
//! browser and API options, and validates the configuration of a working
//! directory.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing::{info, warn};

use sockshop_e2e_config::{
    api::api_client_options,
    browser::browser_launch_options,
    config::{render_safe, ConfigResolver, DumpFormat},
    logging, NAME, VERSION,
};

/// Parses a `KEY=VALUE` override.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .bin_name("e2e-config")
        .version(VERSION)
        .about("Inspect and validate the layered Sock Shop test configuration")
        .long_about(
            "Resolves configuration from, highest precedence first:\n\
             - --set overrides\n\
             - Environment variables (GROUP__FIELD)\n\
             - .env.local\n\
             - .env\n\
             - .env.<environment>\n\
             - Built-in defaults",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dir")
                .short('C')
                .long("dir")
                .value_name("DIR")
                .help("Directory containing the .env files (default: current directory)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("KEY=VALUE")
                .help("Override an option, e.g. --set browser.headless=true")
                .value_parser(parse_assignment)
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("detect")
                .long("detect")
                .help("Infer the environment from CI and container signals when ENVIRONMENT is unset")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .global(true),
        )
        .subcommand(Command::new("env").about("Print the effective environment name"))
        .subcommand(
            Command::new("info")
                .about("Print environment selection and source file status as JSON"),
        )
        .subcommand(
            Command::new("dump")
                .about("Print the resolved settings with secrets masked")
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format")
                        .value_parser(["json", "toml", "env"])
                        .default_value("env"),
                )
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .help("Annotate every key with the tier it came from")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("check").about("Validate the configuration and report every problem"))
        .subcommand(Command::new("launch-options").about("Print browser launch options as JSON"))
        .subcommand(Command::new("api-options").about("Print API client options as JSON"))
}

/// Build a resolver from the global flags
fn build_resolver(matches: &ArgMatches) -> Result<ConfigResolver> {
    let mut resolver = match matches.get_one::<PathBuf>("dir") {
        Some(dir) => ConfigResolver::in_dir(dir),
        None => ConfigResolver::new().context("Failed to determine working directory")?,
    };

    if let Some(assignments) = matches.get_many::<(String, String)>("set") {
        for (key, value) in assignments {
            resolver = resolver.with_override(key, value.clone());
        }
    }

    Ok(resolver.detect_environment(matches.get_flag("detect")))
}

fn run(matches: &ArgMatches) -> Result<()> {
    let resolver = build_resolver(matches)?;

    match matches.subcommand() {
        Some(("env", _)) => {
            println!("{}", resolver.environment());
        }
        Some(("info", _)) => {
            let info = resolver.environment_info();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Some(("dump", sub)) => {
            let format: DumpFormat = sub
                .get_one::<String>("format")
                .map(String::as_str)
                .unwrap_or("env")
                .parse()
                .map_err(anyhow::Error::msg)?;
            let resolution = resolver
                .resolve_detailed()
                .context("Failed to resolve configuration")?;
            let sources = sub.get_flag("sources").then_some(&resolution.sources);
            print!("{}", render_safe(&resolution.settings, format, sources)?);
        }
        Some(("check", _)) => {
            let resolution = resolver
                .resolve_detailed()
                .context("Configuration is invalid")?;
            for warning in &resolution.warnings {
                warn!("{}", warning);
            }
            info!(
                environment = %resolution.settings.environment,
                origin = %resolution.info.origin,
                "Configuration is valid"
            );
            println!(
                "Configuration is valid ({} environment, {} warning(s))",
                resolution.settings.environment,
                resolution.warnings.len()
            );
        }
        Some(("launch-options", _)) => {
            let settings = resolver.settings().context("Failed to resolve configuration")?;
            let options = browser_launch_options(&settings);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Some(("api-options", _)) => {
            let settings = resolver.settings().context("Failed to resolve configuration")?;
            let options = api_client_options(&settings);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Some((other, _)) => anyhow::bail!("Unknown command: {}", other),
        None => anyhow::bail!("No command given"),
    }

    Ok(())
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    logging::init_cli(matches.get_count("verbose"), matches.get_flag("quiet"));

    run(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_dump_parsing() {
        let matches = build_cli()
            .try_get_matches_from(["e2e-config", "dump", "--format", "json", "--sources"])
            .unwrap();

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "dump");
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("json"));
        assert!(sub.get_flag("sources"));
    }

    #[test]
    fn test_cli_repeated_overrides() {
        let matches = build_cli()
            .try_get_matches_from([
                "e2e-config",
                "--set",
                "browser.headless=true",
                "--set",
                "API__TIMEOUT=10",
                "check",
            ])
            .unwrap();

        let sets: Vec<(String, String)> = matches
            .get_many::<(String, String)>("set")
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(
            sets,
            vec![
                ("browser.headless".to_string(), "true".to_string()),
                ("API__TIMEOUT".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_rejects_bad_input() {
        assert!(build_cli()
            .try_get_matches_from(["e2e-config", "--set", "novalue", "env"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["e2e-config", "dump", "--format", "yaml"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["e2e-config", "-v", "-q", "env"])
            .is_err());
    }

    #[test]
    fn test_parse_assignment_keeps_equals_in_value() {
        assert_eq!(
            parse_assignment("DATABASE__PASSWORD=a=b").unwrap(),
            ("DATABASE__PASSWORD".to_string(), "a=b".to_string())
        );
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_build_resolver_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = dir.path().to_string_lossy().into_owned();
        let matches = build_cli()
            .try_get_matches_from([
                "e2e-config",
                "--dir",
                dir_arg.as_str(),
                "--set",
                "ENVIRONMENT=testing",
                "env",
            ])
            .unwrap();

        let resolver = build_resolver(&matches).unwrap();
        assert_eq!(resolver.working_dir(), dir.path());
        assert_eq!(
            resolver.environment(),
            sockshop_e2e_config::config::Environment::Testing
        );
    }
}
