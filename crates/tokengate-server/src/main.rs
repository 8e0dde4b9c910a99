mod cli;

use std::env;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokengate_auth::token::{GeneratedKeyPair, generate_secret};
use tokengate_auth::{SigningAlgorithm, TokenCodec};
use tokengate_server::config::AppConfig;
use tokengate_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use tokengate_server::{ServerBuilder, build_state};

use cli::{Cli, Commands, InspectArgs, IssueArgs, KeygenArgs};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TOKENGATE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (tokengate.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TOKENGATE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    tokengate_server::observability::init_tracing();

    let cli = Cli::parse();

    // Key generation never needs a configuration file.
    if let Some(Commands::Keygen(args)) = &cli.command {
        if let Err(e) = keygen(args) {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    let (config_path, source) = resolve_config_path(cli.config.as_deref());

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    tokengate_server::observability::apply_logging_level(&cfg.logging.level);

    if let Err(e) = run(cli.command, cfg).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, cfg: AppConfig) -> Result<()> {
    match command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let server = ServerBuilder::new()
                .with_config(cfg)
                .build()
                .context("failed to initialize token service")?;
            server.run().await?;
        }
        Commands::Issue(args) => issue(&args, &cfg)?,
        Commands::Inspect(args) => inspect(&args, &cfg)?,
        Commands::Keygen(args) => keygen(&args)?,
        Commands::Config => {
            let rendered = toml::to_string_pretty(&cfg.redacted())
                .context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}

fn resolve_config_path(cli_path: Option<&str>) -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    if let Some(path) = cli_path {
        return (path.to_string(), ConfigSource::CliArgument);
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("TOKENGATE_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default to tokengate.toml
    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}

fn issue(args: &IssueArgs, cfg: &AppConfig) -> Result<()> {
    let mut claims = Map::new();
    for pair in &args.claims {
        let (key, value) = parse_claim(pair)?;
        claims.insert(key, value);
    }

    let state = build_state(cfg)?;
    let issued = state.auth.service.issue(&args.subject, claims)?;
    println!("{}", issued.token);
    tracing::debug!(
        jti = ?issued.claims.token_id(),
        expires_in = issued.expires_in(OffsetDateTime::now_utc().unix_timestamp()),
        "Token minted"
    );
    Ok(())
}

fn parse_claim(pair: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("claim must be KEY=VALUE, got {pair:?}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("claim name must not be empty in {pair:?}");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn inspect(args: &InspectArgs, cfg: &AppConfig) -> Result<()> {
    let codec = cfg.auth.build_codec()?;
    let claims = codec.decode(args.token.trim())?;

    let validator = cfg.auth.token_config().validator();
    let status = match validator.validate(&claims, OffsetDateTime::now_utc().unix_timestamp()) {
        Ok(()) => "valid".to_string(),
        Err(e) => e.to_string(),
    };

    println!("{}", serde_json::to_string_pretty(&claims)?);
    println!("status: {status}");
    Ok(())
}

fn keygen(args: &KeygenArgs) -> Result<()> {
    let algorithm: SigningAlgorithm = args.algorithm.parse()?;

    if algorithm.is_hmac() {
        println!("{}", generate_secret());
        return Ok(());
    }

    let pair = GeneratedKeyPair::generate(algorithm)?;
    match &args.out {
        Some(dir) => write_key_pair(dir, &pair),
        None => {
            print!("{}", pair.private_pem);
            print!("{}", pair.public_pem);
            Ok(())
        }
    }
}

fn write_key_pair(dir: &Path, pair: &GeneratedKeyPair) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let private_path = dir.join("signing.pem");
    let public_path = dir.join("signing.pub.pem");
    std::fs::write(&private_path, &pair.private_pem)
        .with_context(|| format!("writing {}", private_path.display()))?;
    std::fs::write(&public_path, &pair.public_pem)
        .with_context(|| format!("writing {}", public_path.display()))?;
    eprintln!(
        "Wrote {} and {}",
        private_path.display(),
        public_path.display()
    );
    Ok(())
}
