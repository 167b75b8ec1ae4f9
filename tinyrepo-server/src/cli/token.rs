//! `tinyrepo token`: issue and inspect access tokens offline.

use clap::{Args, Subcommand};

use crate::auth::jwt::{self, Claims};
use crate::config::jwt_secret_from_env;

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Sign a new token with JWT_SECRET.
    Create {
        /// Who the token is for; recorded in the claims only.
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        namespace: String,
        /// Request paths the token may access, e.g. `/tools`.
        #[arg(long, default_value = "/")]
        prefix: String,
        /// Lifetime in hours. Tokens never expire when omitted.
        #[arg(long)]
        ttl_hours: Option<i64>,
    },
    /// Verify a token's signature and print its claims.
    Inspect { token: String },
}

pub fn run(args: TokenArgs) -> anyhow::Result<()> {
    let secret = jwt_secret_from_env()?;
    match args.command {
        TokenCommand::Create {
            name,
            namespace,
            prefix,
            ttl_hours,
        } => {
            let token = create(&secret, &name, &namespace, &prefix, ttl_hours)?;
            println!("{}", token);
        }
        TokenCommand::Inspect { token } => {
            let claims = inspect(&secret, &token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }
    Ok(())
}

fn create(
    secret: &[u8],
    name: &str,
    namespace: &str,
    prefix: &str,
    ttl_hours: Option<i64>,
) -> anyhow::Result<String> {
    let name = if name.is_empty() { UNKNOWN_NAME } else { name };
    if let Some(hours) = ttl_hours {
        anyhow::ensure!(hours > 0, "--ttl-hours must be positive, got {}", hours);
    }
    jwt::issue_token(secret, name, namespace, prefix, ttl_hours.map(chrono::Duration::hours))
}

fn inspect(secret: &[u8], token: &str) -> anyhow::Result<Claims> {
    jwt::validate_token(secret, token.trim()).map_err(|e| anyhow::anyhow!("invalid token: {}", e))
}
