use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tokengate")]
#[command(about = "Bearer token issue, refresh and revocation service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (overrides TOKENGATE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// Mint a token for a subject
    Issue(IssueArgs),
    /// Decode and validate a token without consulting the blacklist
    Inspect(InspectArgs),
    /// Generate signing key material
    Keygen(KeygenArgs),
    /// Print the effective configuration with secrets masked
    Config,
}

#[derive(clap::Args)]
pub struct IssueArgs {
    /// Subject (`sub` claim)
    pub subject: String,

    /// Custom claim as key=value; the value is parsed as JSON when possible
    #[arg(long = "claim", value_name = "KEY=VALUE")]
    pub claims: Vec<String>,
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Compact JWT
    pub token: String,
}

#[derive(clap::Args)]
pub struct KeygenArgs {
    /// Signing algorithm
    #[arg(short, long, default_value = "HS256")]
    pub algorithm: String,

    /// Directory for `signing.pem` and `signing.pub.pem`; printed when omitted
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}
