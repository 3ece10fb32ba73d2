pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "uigisc")]
#[command(about = "UIGISC CLI - operator tools for the document API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Development token management")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },

    #[command(about = "Resource definition checks")]
    Resources {
        #[command(subcommand)]
        cmd: commands::resources::ResourcesCommands,
    },

    #[command(about = "Create the admin account and sample data in the configured store")]
    Seed {
        #[arg(long, default_value = "admin@uigisc.com")]
        admin_email: String,
        #[arg(long)]
        admin_password: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Token { cmd } => commands::token::handle(cmd, output_format).await,
        Commands::Resources { cmd } => commands::resources::handle(cmd, output_format).await,
        Commands::Seed { admin_email, admin_password } => {
            commands::seed::handle(admin_email, admin_password, output_format).await
        }
    }
}
