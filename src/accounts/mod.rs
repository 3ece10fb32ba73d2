// Password accounts: registration and login issue the same bearer tokens the
// authentication gate verifies.

pub mod seed;

use chrono::Duration;
use futures::{StreamExt, TryStreamExt};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::password::{hash_password_blocking, verify_password_blocking, PasswordError};
use crate::auth::{generate_jwt, Claims, Identity};
use crate::config::{AppConfig, ConfigError};
use crate::filter::DocumentQuery;
use crate::mediator::MediatorError;
use crate::resources::{Resource, ResourceRegistry};
use crate::schema::{
    validate, FieldSpec, FieldType, FieldViolation, ResourceSchema, SchemaError, ValidatedPayload, ValidationError,
    ValidationMode,
};
use crate::store::{Document, DocumentStore, StoragePolicy, StoreError};

/// Collection holding password hashes. It is not a registered resource, so
/// the data API cannot reach it.
pub const CREDENTIALS: &str = "_credentials";

/// Resource holding the public profile of each account
pub const PROFILES: &str = "users";

const MIN_PASSWORD_CHARS: usize = 8;
const INVALID_LOGIN: &str = "Invalid email or password";

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

/// A freshly issued bearer token and the identity it carries
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: Identity,
}

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub jwt_secret: String,
    pub algorithm: Algorithm,
    pub token_ttl: Duration,
    pub password_cost: u32,
    pub admin_emails: Vec<String>,
    pub allow_registration: bool,
}

impl AccountSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            jwt_secret: config.auth.jwt_secret.clone(),
            algorithm: config.jwt_algorithm()?,
            token_ttl: Duration::minutes(config.auth.token_expiry_minutes),
            password_cost: config.auth.password_cost,
            admin_emails: config.auth.admin_emails.iter().map(|e| e.to_lowercase()).collect(),
            allow_registration: config.auth.allow_registration,
        })
    }

    fn role_for(&self, email: &str) -> &'static str {
        if self.admin_emails.iter().any(|admin| admin == email) {
            "admin"
        } else {
            "user"
        }
    }
}

pub struct AccountService {
    store: Arc<dyn DocumentStore>,
    profiles: Arc<Resource>,
    websites: Option<Arc<Resource>>,
    opportunities: Option<Arc<Resource>>,
    credentials: ResourceSchema,
    storage: StoragePolicy,
    settings: AccountSettings,
}

impl AccountService {
    /// `None` when the registry defines no `users` resource to hold profiles
    pub fn new(
        registry: &ResourceRegistry,
        store: Arc<dyn DocumentStore>,
        storage: StoragePolicy,
        settings: AccountSettings,
    ) -> Result<Option<Self>, SchemaError> {
        let Some(profiles) = registry.get(PROFILES) else {
            return Ok(None);
        };

        let text = || FieldSpec::new(FieldType::String).required();
        let credentials = ResourceSchema::new()
            .field("email", text())
            .field("password_hash", text())
            .field("subject", text())
            .field("role", text())
            .compile()?;

        Ok(Some(Self {
            store,
            profiles,
            websites: registry.get("websites"),
            opportunities: registry.get("opportunities"),
            credentials,
            storage,
            settings,
        }))
    }

    pub async fn register(&self, registration: Registration) -> Result<Session, MediatorError> {
        if !self.settings.allow_registration {
            return Err(MediatorError::Forbidden("Registration is disabled".to_string()));
        }

        let email = normalize_email(&registration.email);
        let role = self.settings.role_for(&email);
        let subdomain = registration.subdomain.as_deref().map(|s| s.trim().to_lowercase());

        let mut profile = Map::new();
        profile.insert("email".into(), json!(email));
        profile.insert("role".into(), json!(role));
        profile.insert("is_verified".into(), json!(true));
        if let Some(subdomain) = &subdomain {
            profile.insert("subdomain".into(), json!(subdomain));
        }
        if let Some(name) = &registration.name {
            profile.insert("name".into(), json!(name.trim()));
        }
        if let Some(mobile) = &registration.mobile {
            profile.insert("mobile".into(), json!(mobile.trim()));
        }

        let mut violations = Vec::new();
        if registration.password.chars().count() < MIN_PASSWORD_CHARS {
            violations.push(FieldViolation::new(
                "password",
                format!("must have at least {} characters", MIN_PASSWORD_CHARS),
            ));
        }
        let profile = match validate(&self.profiles.schema, &Value::Object(profile), ValidationMode::Create) {
            Ok(profile) if violations.is_empty() => profile,
            Ok(_) => return Err(ValidationError { violations }.into()),
            Err(err) => {
                violations.extend(err.violations);
                return Err(ValidationError { violations }.into());
            }
        };

        if self.find_one(CREDENTIALS, "email", json!(email)).await?.is_some() {
            return Err(ValidationError::single("email", "is already registered").into());
        }
        if let Some(subdomain) = &subdomain {
            if self.find_one(PROFILES, "subdomain", json!(subdomain)).await?.is_some() {
                return Err(ValidationError::single("subdomain", "is already taken").into());
            }
        }

        let subject = self
            .create_account(&email, registration.password, role, profile)
            .await?;

        if let (Some(websites), Some(subdomain)) = (&self.websites, &subdomain) {
            self.create_website(websites, &subject, subdomain).await?;
        }

        info!("Registered account {} ({})", subject, role);
        self.issue(subject, email, role)
    }

    pub async fn login(&self, login: Login) -> Result<Session, MediatorError> {
        let email = normalize_email(&login.email);
        let invalid = || MediatorError::Unauthenticated(INVALID_LOGIN.to_string());

        let Some(account) = self.find_one(CREDENTIALS, "email", json!(email)).await? else {
            return Err(invalid());
        };
        let (Some(hash), Some(subject)) = (text_field(&account, "password_hash"), text_field(&account, "subject")) else {
            error!("Credential record {} is incomplete", account.id);
            return Err(MediatorError::Internal("credential record is incomplete".to_string()));
        };

        let matches = verify_password_blocking(login.password, hash.to_string())
            .await
            .map_err(internal)?;
        if !matches {
            return Err(invalid());
        }

        let role = text_field(&account, "role").unwrap_or("user").to_string();
        let subject = subject.to_string();
        self.issue(subject, email, &role)
    }

    /// Create the account unless one already exists for `email`. Returns
    /// whether it was created.
    pub async fn ensure_account(&self, email: &str, password: &str, role: &str) -> Result<bool, MediatorError> {
        let email = normalize_email(email);
        if self.find_one(CREDENTIALS, "email", json!(email)).await?.is_some() {
            return Ok(false);
        }
        let profile = validate(
            &self.profiles.schema,
            &json!({ "email": email, "role": role, "is_verified": true }),
            ValidationMode::Create,
        )?;
        self.create_account(&email, password.to_string(), role, profile).await?;
        Ok(true)
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub(crate) fn storage(&self) -> StoragePolicy {
        self.storage
    }

    pub(crate) fn opportunities(&self) -> Option<&Arc<Resource>> {
        self.opportunities.as_ref()
    }

    async fn create_account(
        &self,
        email: &str,
        password: String,
        role: &str,
        profile: ValidatedPayload,
    ) -> Result<String, MediatorError> {
        let password_hash = hash_password_blocking(password, self.settings.password_cost)
            .await
            .map_err(internal)?;
        let subject = Uuid::new_v4().to_string();

        let credential = validate(
            &self.credentials,
            &json!({ "email": email, "password_hash": password_hash, "subject": subject, "role": role }),
            ValidationMode::Create,
        )
        .map_err(|e| MediatorError::Internal(format!("credential record rejected: {}", e)))?;

        let store = self.store.clone();
        self.storage
            .run("insert", || store.insert(PROFILES, Some(&subject), profile.clone()))
            .await?;
        self.storage
            .run("insert", || store.insert(CREDENTIALS, Some(&subject), credential.clone()))
            .await?;
        Ok(subject)
    }

    async fn create_website(&self, websites: &Resource, subject: &str, subdomain: &str) -> Result<(), MediatorError> {
        let payload = validate(
            &websites.schema,
            &json!({ "subdomain": subdomain, "status": "active" }),
            ValidationMode::Create,
        )?;
        let store = self.store.clone();
        self.storage
            .run("insert", || store.insert(&websites.name, Some(subject), payload.clone()))
            .await?;
        Ok(())
    }

    async fn find_one(&self, resource: &str, field: &str, value: Value) -> Result<Option<Document>, StoreError> {
        let query = DocumentQuery::field_equals(field, value).with_limit(1);
        let docs = self
            .storage
            .run("query", || self.store.query(resource, &query).take(1).try_collect::<Vec<_>>())
            .await?;
        Ok(docs.into_iter().next())
    }

    fn issue(&self, subject: String, email: String, role: &str) -> Result<Session, MediatorError> {
        let claims = Claims::new(subject, vec![role.to_string()], self.settings.token_ttl).with_email(email);
        let access_token = generate_jwt(&claims, &self.settings.jwt_secret, self.settings.algorithm)
            .map_err(|e| MediatorError::Internal(e.to_string()))?;
        Ok(Session {
            access_token,
            token_type: "bearer",
            user: claims.into_identity(),
        })
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn text_field<'a>(doc: &'a Document, name: &str) -> Option<&'a str> {
    doc.fields.get(name).and_then(|v| v.as_str())
}

fn internal(err: PasswordError) -> MediatorError {
    error!("{}", err);
    MediatorError::Internal(err.to_string())
}
