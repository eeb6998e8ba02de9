//! wasm-host CLI entry point.
//!
//! Validates modules against a configured engine and prints the effective
//! configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasm_host_common::{ConfigFile, HostConfig};
use wasm_host_core::{Engine, VERSION};

/// Isolated, fuel-metered WebAssembly embedding host
#[derive(Parser)]
#[command(name = "wasm-host", version = wasm_host_core::VERSION_STR)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "WASM_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "WASM_HOST_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Validates modules (`.wasm` or `.wat`) under the configured feature gates
    Validate {
        /// Modules to validate; defaults to the `[[modules]]` of the config file
        paths: Vec<PathBuf>,
    },

    /// Prints the effective configuration as TOML
    Config,

    /// Prints the host version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    match cli.command {
        Command::Validate { paths } => {
            let paths = if paths.is_empty() {
                config_file.modules.iter().map(|m| PathBuf::from(&m.path)).collect()
            } else {
                paths
            };
            validate_all(&config_file.runtime, &paths)
        }
        Command::Config => {
            let toml = config_file.to_toml().context("Failed to render configuration")?;
            print!("{toml}");
            Ok(())
        }
        Command::Version => {
            println!("wasm-host {VERSION}");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,wasm_host=debug".into()),
    );

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn validate_all(config: &HostConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    if paths.is_empty() {
        bail!("No modules to validate. Pass paths or list [[modules]] in the config file");
    }

    let engine = Engine::new(&config.engine);
    info!(modules = paths.len(), "Validating modules");

    let mut failures = 0_usize;
    for path in paths {
        if let Err(e) = validate_one(&engine, path) {
            failures += 1;
            warn!(path = %path.display(), "Validation failed");
            eprintln!("{}: {e:#}", path.display());
        }
    }

    if failures > 0 {
        bail!("{failures} of {} modules failed validation", paths.len());
    }
    Ok(())
}

fn validate_one(engine: &Engine, path: &Path) -> anyhow::Result<()> {
    // Binary input passes through unchanged
    let wasm = wat::parse_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let summary = engine
        .validate(&wasm)
        .with_context(|| format!("Invalid module {}", path.display()))?;

    println!(
        "{}: ok (hash {}, {} validated, {} deferred, {} custom sections)",
        path.display(),
        summary.content_hash(),
        summary.validated_functions(),
        summary.deferred_functions(),
        summary.custom_sections().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_json_flag() {
        let cli = Cli::try_parse_from(["wasm-host", "version", "--log-json"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Command::Version));

        let cli = Cli::try_parse_from(["wasm-host", "config"]).unwrap();
        assert!(!cli.log_json);
    }

    #[test]
    fn test_validate_paths() {
        let cli = Cli::try_parse_from(["wasm-host", "validate", "a.wasm", "b.wat"]).unwrap();

        let Command::Validate { paths } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(paths, vec![PathBuf::from("a.wasm"), PathBuf::from("b.wat")]);
    }
}
