use chrono::Duration;
use clap::Subcommand;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::{utils::output_success, OutputFormat};
use crate::config::AppConfig;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Mint a signed development token with the configured secret")]
    Mint {
        #[arg(long, help = "Subject (user id) the token identifies")]
        sub: String,
        #[arg(long = "role", help = "Role to grant; repeat for several")]
        roles: Vec<String>,
        #[arg(long, help = "Email claim")]
        email: Option<String>,
        #[arg(long, help = "Lifetime in minutes (defaults to JWT_EXPIRY_MINUTES)")]
        ttl_minutes: Option<i64>,
    },
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Mint { sub, roles, email, ttl_minutes } => {
            let config = AppConfig::from_env();
            let ttl = ttl_minutes.unwrap_or(config.auth.token_expiry_minutes);
            if ttl <= 0 {
                anyhow::bail!("--ttl-minutes must be positive");
            }

            let mut claims = Claims::new(sub, roles, Duration::minutes(ttl));
            if let Some(email) = email {
                claims = claims.with_email(email);
            }
            let token = generate_jwt(&claims, &config.auth.jwt_secret, config.jwt_algorithm()?)?;

            match output_format {
                OutputFormat::Text => println!("{}", token),
                OutputFormat::Json => output_success(
                    &output_format,
                    "Token minted",
                    Some(json!({ "token": token, "sub": claims.sub, "roles": claims.roles, "exp": claims.exp })),
                )?,
            }
            Ok(())
        }
    }
}
