use anyhow::Context;
use serde_json::json;

use crate::accounts::seed::seed;
use crate::app::{build_accounts, StoreBackend};
use crate::cli::{utils::output_success, OutputFormat};
use crate::config::AppConfig;
use crate::resources::ResourceRegistry;

pub async fn handle(admin_email: String, admin_password: String, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    config.validate().context("invalid configuration")?;

    let registry = ResourceRegistry::load(&config.resources_file)
        .with_context(|| format!("loading resources from {}", config.resources_file.display()))?;
    let backend = StoreBackend::connect(&config).await?;

    let Some(accounts) = build_accounts(&config, &registry, backend.shared())? else {
        backend.close().await;
        anyhow::bail!("password accounts are not enabled for this configuration");
    };

    let report = seed(&accounts, &admin_email, &admin_password).await;
    backend.close().await;
    let report = report?;

    output_success(
        &output_format,
        &format!(
            "Seed complete: admin {}, {} opportunities added",
            if report.admin_created { "created" } else { "already present" },
            report.opportunities_created
        ),
        Some(json!({ "report": report })),
    )
}
