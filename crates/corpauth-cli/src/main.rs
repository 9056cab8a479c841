//! corpauth - corpus authorization decisions
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`CORPAUTH_*`)
//! 3. Local config (`--config`, or `CORPAUTH_CONFIG`)
//! 4. System config (`/etc/corpauth/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Request environment
//!
//! `decide` reads the identity the way a CGI handler would: `REMOTE_USER`,
//! `REMOTE_ADDR`, `PATH_INFO` and `HTTP_*` variables of the process
//! environment. `--var` and `--header` add to or override them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use corpauth_runtime::{AuthConfig, AuthService, ConfigLoader, ServiceError};
use corpauth_types::{ErrorCode, RequestArgs, RequestEnv};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// corpauth - corpus authorization decisions
#[derive(Parser, Debug)]
#[command(name = "corpauth")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Local configuration file (also: CORPAUTH_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip the system configuration file
    #[arg(long)]
    no_system_config: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide one authorization request and print the decision JSON
    Decide {
        /// Request arguments as a JSON object; `-` reads stdin
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,

        /// Environment variable for the request (KEY=VALUE, repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Request header (Name=Value, repeatable)
        #[arg(long = "header", value_name = "NAME=VALUE")]
        headers: Vec<String>,

        /// Ignore the process environment
        #[arg(long)]
        clean_env: bool,
    },

    /// List corpora whose licence requires authorization
    Protected,

    /// Print the effective configuration (passwords masked)
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_config_file(path);
    }
    if args.no_system_config {
        loader = loader.skip_system_config();
    }
    let config = loader
        .load()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    // Filter: --debug > RUST_LOG env > config logging.level
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
        Command::Protected => {
            let service = build_service(&config)?;
            match service.protected_corpora(request_env(&[], &[], false)?) {
                Ok(corpora) => print_json(&json!(corpora)),
                Err(e) => fail(&e),
            }
        }
        Command::Decide {
            args: request_args,
            vars,
            headers,
            clean_env,
        } => {
            let request_args = parse_request_args(request_args.as_deref())?;
            let env = request_env(&vars, &headers, clean_env)?;
            let service = build_service(&config)?;
            match service.handle(request_args, env) {
                Ok(decision) => print_json(&decision),
                Err(e) => fail(&e),
            }
        }
    }
}

fn build_service(config: &AuthConfig) -> Result<AuthService> {
    let service = AuthService::from_config(config).context("failed to start service")?;
    tracing::debug!(plugins = ?service.pipeline().plugin_names(), "service ready");
    Ok(service)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a machine-readable error and exits with status 1.
fn fail(err: &ServiceError) -> Result<()> {
    let body = json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "recoverable": err.is_recoverable(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    std::process::exit(1);
}

fn parse_request_args(raw: Option<&str>) -> Result<RequestArgs> {
    let text = match raw {
        None => return Ok(RequestArgs::new()),
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request arguments from stdin")?;
            buf
        }
        Some(s) => s.to_string(),
    };
    let value: Value = serde_json::from_str(&text).context("request arguments are not JSON")?;
    match RequestArgs::from_json(&value) {
        Some(args) => Ok(args),
        None => bail!("request arguments must be a JSON object"),
    }
}

fn is_request_var(key: &str) -> bool {
    matches!(key, "REMOTE_USER" | "REMOTE_ADDR" | "PATH_INFO") || key.starts_with("HTTP_")
}

fn request_env(vars: &[String], headers: &[String], clean: bool) -> Result<RequestEnv> {
    let mut env = RequestEnv::new();
    if !clean {
        for (key, value) in std::env::vars().filter(|(k, _)| is_request_var(k)) {
            if key == "PATH_INFO" {
                env = env.with_path(value.clone());
            }
            env = env.with_var(key, value);
        }
    }
    for pair in vars {
        let (key, value) = split_pair(pair)?;
        if key == "PATH_INFO" {
            env = env.with_path(value);
        }
        env = env.with_var(key, value);
    }
    for pair in headers {
        let (name, value) = split_pair(pair)?;
        env = env.with_header(name, value);
    }
    Ok(env)
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("expected KEY=VALUE, got '{pair}'"),
    }
}
