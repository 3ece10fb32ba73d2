// Resource registry: schemas and policy rules loaded from configuration

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::policy::{Policy, Rule};
use crate::schema::{ResourceSchema, SchemaError};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Cannot read resources file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid resources file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Resource already registered: {0}")]
    Duplicate(String),

    #[error("Resource '{resource}': {source}")]
    Schema {
        resource: String,
        #[source]
        source: SchemaError,
    },
}

/// A registered resource. Immutable once registered.
#[derive(Debug)]
pub struct Resource {
    pub name: String,
    pub schema: ResourceSchema,
    pub policy: Policy,
}

#[derive(Debug, Deserialize)]
struct ResourceDefinition {
    #[serde(flatten)]
    schema: ResourceSchema,
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct ResourcesFile {
    #[serde(default)]
    resources: BTreeMap<String, ResourceDefinition>,
    /// Evaluated after each resource's own rules
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, Arc<Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_yaml(&text)?;
        tracing::info!("Loaded {} resources from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ResourceError> {
        let file: ResourcesFile = serde_yaml::from_str(text)?;
        let mut registry = Self::new();
        for (name, definition) in file.resources {
            let mut rules = definition.rules;
            rules.extend(file.rules.iter().cloned());
            registry.register(name, definition.schema, Policy::new(rules))?;
        }
        Ok(registry)
    }

    /// Add a resource. Names are lowercase identifiers and cannot be reused.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: ResourceSchema,
        policy: Policy,
    ) -> Result<Arc<Resource>, ResourceError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ResourceError::InvalidName(name));
        }
        if self.resources.contains_key(&name) {
            return Err(ResourceError::Duplicate(name));
        }
        let schema = schema.compile().map_err(|source| ResourceError::Schema {
            resource: name.clone(),
            source,
        })?;

        let resource = Arc::new(Resource {
            name: name.clone(),
            schema,
            policy,
        });
        self.resources.insert(name, resource.clone());
        Ok(resource)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    name.len() <= 63
        && name.chars().next().map_or(false, |c| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::types::Operation;

    const YAML: &str = r#"
resources:
  items:
    fields:
      name: { type: string, required: true, max: 100 }
      order: { type: integer, default: 0 }
    rules:
      - effect: allow
        operations: [read, query]
  notes:
    allow_extra: true
rules:
  - effect: allow
    roles: [admin]
"#;

    #[test]
    fn loads_schemas_and_orders_rules() {
        let registry = ResourceRegistry::from_yaml(YAML).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["items", "notes"]);

        let items = registry.get("items").unwrap();
        assert_eq!(items.schema.get("name").map(|f| f.field_type), Some(FieldType::String));
        assert_eq!(items.policy.rules().len(), 2);
        assert_eq!(items.policy.rules()[0].operations, crate::policy::Selector::Only([Operation::Read, Operation::Query].into()));

        let notes = registry.get("notes").unwrap();
        assert!(notes.schema.allow_extra);
        assert_eq!(notes.policy.rules().len(), 1);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn rejects_bad_definitions() {
        let bad_pattern = "resources:\n  items:\n    fields:\n      code: { type: string, pattern: \"[\" }\n";
        assert!(matches!(ResourceRegistry::from_yaml(bad_pattern), Err(ResourceError::Schema { .. })));

        let bad_name = "resources:\n  Bad-Name: {}\n";
        assert!(matches!(ResourceRegistry::from_yaml(bad_name), Err(ResourceError::InvalidName(_))));

        assert!(matches!(ResourceRegistry::from_yaml("resources: [1, 2]"), Err(ResourceError::Parse(_))));
    }

    #[test]
    fn names_cannot_be_reused() {
        let mut registry = ResourceRegistry::new();
        registry.register("items", ResourceSchema::new(), Policy::default()).unwrap();
        assert!(matches!(
            registry.register("items", ResourceSchema::new(), Policy::default()),
            Err(ResourceError::Duplicate(_))
        ));
    }

    #[test]
    fn bundled_resources_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/resources.yaml");
        let registry = ResourceRegistry::load(path).unwrap();
        for name in ["users", "opportunities", "websites", "news_media", "event_highlights", "site_settings", "page_content"] {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
    }
}
