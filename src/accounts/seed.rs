// Initial data for a fresh store: the admin account and sample opportunities

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::AccountService;
use crate::filter::DocumentQuery;
use crate::mediator::MediatorError;
use crate::schema::{validate, ValidationMode};

const SAMPLE_OPPORTUNITIES: [(&str, &str); 4] = [
    ("Bitnest", "Decentralized savings circles with transparent on-chain rewards."),
    ("OlyLife", "Wellness devices and a referral program around them."),
    ("Reach Solar", "Community solar installations with shared returns."),
    ("Xtrends", "Trading education and market signal subscriptions."),
];

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedReport {
    pub admin_created: bool,
    pub opportunities_created: usize,
}

/// Safe to run repeatedly: existing data is left alone
pub async fn seed(accounts: &AccountService, admin_email: &str, admin_password: &str) -> Result<SeedReport, MediatorError> {
    let mut report = SeedReport {
        admin_created: accounts.ensure_account(admin_email, admin_password, "admin").await?,
        ..SeedReport::default()
    };
    if report.admin_created {
        info!("Created admin account {}", admin_email);
    }

    let Some(opportunities) = accounts.opportunities() else {
        return Ok(report);
    };

    let store = accounts.store().clone();
    let storage = accounts.storage();
    let any = DocumentQuery::all().with_limit(1);
    let existing = storage
        .run("query", || store.query(&opportunities.name, &any).take(1).try_collect::<Vec<_>>())
        .await?;
    if !existing.is_empty() {
        return Ok(report);
    }

    for (order, (name, description)) in SAMPLE_OPPORTUNITIES.iter().enumerate() {
        let payload = validate(
            &opportunities.schema,
            &json!({
                "name": name,
                "description": description,
                "status": "published",
                "order": order + 1,
            }),
            ValidationMode::Create,
        )?;
        storage
            .run("insert", || store.insert(&opportunities.name, None, payload.clone()))
            .await?;
        report.opportunities_created += 1;
    }
    info!("Seeded {} opportunities", report.opportunities_created);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AccountSettings, Login, CREDENTIALS};
    use crate::auth::password::MIN_COST;
    use crate::resources::ResourceRegistry;
    use crate::store::{MemoryDocumentStore, StoragePolicy};
    use chrono::Duration;
    use jsonwebtoken::Algorithm;
    use std::sync::Arc;

    fn accounts(store: &MemoryDocumentStore) -> AccountService {
        let registry = ResourceRegistry::load("config/resources.yaml").unwrap();
        let settings = AccountSettings {
            jwt_secret: "seed-test-secret".to_string(),
            algorithm: Algorithm::HS256,
            token_ttl: Duration::minutes(5),
            password_cost: MIN_COST,
            admin_emails: vec![],
            allow_registration: true,
        };
        AccountService::new(&registry, Arc::new(store.clone()), StoragePolicy::default(), settings)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn seeds_once() {
        let store = MemoryDocumentStore::new();
        let accounts = accounts(&store);

        let first = seed(&accounts, "admin@example.com", "change-me-now").await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                admin_created: true,
                opportunities_created: 4
            }
        );

        let second = seed(&accounts, "admin@example.com", "change-me-now").await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.stored_count("opportunities").await, 4);
        assert_eq!(store.stored_count(CREDENTIALS).await, 1);
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in_as_admin() {
        let store = MemoryDocumentStore::new();
        let accounts = accounts(&store);
        seed(&accounts, "admin@example.com", "change-me-now").await.unwrap();

        let session = accounts
            .login(Login {
                email: "admin@example.com".to_string(),
                password: "change-me-now".to_string(),
            })
            .await
            .unwrap();
        assert!(session.user.has_role("admin"));
    }
}
