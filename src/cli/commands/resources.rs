use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::{utils::{output_error, output_success}, OutputFormat};
use crate::resources::ResourceRegistry;

#[derive(Subcommand)]
pub enum ResourcesCommands {
    #[command(about = "Load a resources file and report what it defines")]
    Check {
        #[arg(help = "Path to the resources YAML file")]
        file: PathBuf,
    },
}

pub async fn handle(cmd: ResourcesCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ResourcesCommands::Check { file } => {
            let registry = match ResourceRegistry::load(&file) {
                Ok(registry) => registry,
                Err(e) => {
                    output_error(&output_format, &e.to_string(), Some("INVALID_RESOURCES"))?;
                    anyhow::bail!("{} is not a valid resources file", file.display());
                }
            };

            let summary: Vec<_> = registry
                .iter()
                .map(|r| json!({ "name": r.name, "fields": r.schema.fields.len(), "rules": r.policy.rules().len() }))
                .collect();

            if let OutputFormat::Text = output_format {
                for resource in registry.iter() {
                    println!(
                        "{:<20} {:>3} fields {:>3} rules",
                        resource.name,
                        resource.schema.fields.len(),
                        resource.policy.rules().len()
                    );
                }
            }
            output_success(
                &output_format,
                &format!("{} resources defined in {}", registry.len(), file.display()),
                Some(json!({ "resources": summary })),
            )
        }
    }
}
