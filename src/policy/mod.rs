// Authorization policy: ordered rules, first match wins, default deny

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::auth::Identity;
use crate::types::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// `"*"` or an explicit list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T: Ord> {
    Any,
    Only(BTreeSet<T>),
}

impl<T: Ord> Selector<T> {
    pub fn contains(&self, item: &T) -> bool {
        match self {
            Selector::Any => true,
            Selector::Only(items) => items.contains(item),
        }
    }
}

impl<T: Ord> Default for Selector<T> {
    fn default() -> Self {
        Selector::Any
    }
}

impl<'de, T> Deserialize<'de> for Selector<T>
where
    T: Ord + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Wildcard(String),
            List(Vec<T>),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Wildcard(s) if s == "*" => Ok(Selector::Any),
            Raw::Wildcard(s) => Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list, got \"{}\"",
                s
            ))),
            Raw::List(items) => Ok(Selector::Only(items.into_iter().collect())),
        }
    }
}

/// One authorization rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule {
    pub effect: Effect,
    /// Any-of; empty matches every authenticated identity
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub resources: Selector<String>,
    #[serde(default)]
    pub operations: Selector<Operation>,
    /// Match only when the identity created the target document
    #[serde(default)]
    pub owner_only: bool,
}

impl Rule {
    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    fn new(effect: Effect) -> Self {
        Self {
            effect,
            roles: BTreeSet::new(),
            resources: Selector::Any,
            operations: Selector::Any,
            owner_only: false,
        }
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = Selector::Only(resources.into_iter().map(Into::into).collect());
        self
    }

    pub fn operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = Selector::Only(operations.into_iter().collect());
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    /// Everything except ownership
    fn matches_request(&self, identity: &Identity, resource: &str, operation: Operation) -> bool {
        (self.roles.is_empty() || self.roles.iter().any(|r| identity.has_role(r)))
            && self.resources.contains(&resource.to_string())
            && self.operations.contains(&operation)
    }

    /// Ownership only applies to operations on an existing document
    fn is_ownership_check(&self, operation: Operation) -> bool {
        self.owner_only && operation.targets_document()
    }
}

/// What is known about the target document's owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership<'a> {
    /// No lookup was needed or made
    Unknown,
    /// The document does not exist
    Absent,
    /// The document exists; `None` when it was created without an owner
    Owner(Option<&'a str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Forbidden { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Ordered rule list evaluated top to bottom
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    rules: Vec<Rule>,
}

impl Policy {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether evaluating this request could depend on the document owner.
    /// The caller looks the owner up only when this is true.
    pub fn needs_owner(&self, identity: &Identity, resource: &str, operation: Operation) -> bool {
        for rule in &self.rules {
            if !rule.matches_request(identity, resource, operation) {
                continue;
            }
            if rule.is_ownership_check(operation) {
                return true;
            }
            // An unconditional match decides before any ownership rule is reached
            return false;
        }
        false
    }

    pub fn evaluate(
        &self,
        identity: &Identity,
        resource: &str,
        operation: Operation,
        ownership: Ownership<'_>,
    ) -> Decision {
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.matches_request(identity, resource, operation) {
                continue;
            }
            if rule.is_ownership_check(operation) {
                let owned = matches!(ownership, Ownership::Owner(Some(owner)) if owner == identity.subject);
                if !owned {
                    continue;
                }
            }

            tracing::debug!(
                "Rule {} ({:?}) decided {} on {} for {}",
                index,
                rule.effect,
                operation,
                resource,
                identity.subject
            );
            return match rule.effect {
                Effect::Allow => Decision::Allowed,
                Effect::Deny => Decision::Forbidden {
                    reason: format!("{} on {} denied by policy", operation, resource),
                },
            };
        }

        Decision::Forbidden {
            reason: format!("No rule allows {} on {}", operation, resource),
        }
    }
}
