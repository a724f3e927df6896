//! Role model - hierarchy levels, explicit grants, and conditional rules.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for a conditional grant rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    In,
    Range,
}

/// A single predicate evaluated against the request context.
///
/// `field` is a dotted path into the context object. For `In` the configured
/// value is an array; for `Range` it is `{"min": .., "max": ..}` with
/// inclusive numeric bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, op: ConditionOp, value: Value) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
        }
    }

    /// Evaluate against a request context. A missing field fails the
    /// condition regardless of operator.
    pub fn holds(&self, context: &Value) -> bool {
        let actual = match lookup(context, &self.field) {
            Some(v) => v,
            None => return false,
        };

        match self.op {
            ConditionOp::Equals => actual == &self.value,
            ConditionOp::NotEquals => actual != &self.value,
            ConditionOp::In => match self.value.as_array() {
                Some(allowed) => allowed.contains(actual),
                None => false,
            },
            ConditionOp::Range => {
                let n = match actual.as_f64() {
                    Some(n) => n,
                    None => return false,
                };
                let min = self.value.get("min").and_then(Value::as_f64);
                let max = self.value.get("max").and_then(Value::as_f64);
                min.map_or(true, |min| min <= n) && max.map_or(true, |max| n <= max)
            }
        }
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// An explicit permission grant on a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub resource: String,
    pub actions: HashSet<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// When set, the grant is resource-scoped: the target's owner attribute
    /// must match the acting identity unless the role bypasses ownership.
    #[serde(default)]
    pub owner_field: Option<String>,
}

impl Grant {
    pub fn new<const N: usize>(resource: &str, actions: [&str; N]) -> Self {
        Self {
            resource: resource.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            conditions: Vec::new(),
            owner_field: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn owned_by(mut self, owner_field: &str) -> Self {
        self.owner_field = Some(owner_field.to_string());
        self
    }

    pub fn covers(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.actions.contains(action)
    }
}

/// Role definition.
///
/// Lower `level` means more privileged; level 1 is the super-admin tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub level: i32,
    pub can_create_subordinates: bool,
    #[serde(default)]
    pub bypass_ownership: bool,
    pub grants: Vec<Grant>,
}

impl Role {
    pub fn new(name: &str, level: i32) -> Self {
        Self {
            name: name.to_string(),
            level,
            can_create_subordinates: false,
            bypass_ownership: false,
            grants: Vec::new(),
        }
    }

    pub fn with_subordinate_creation(mut self) -> Self {
        self.can_create_subordinates = true;
        self
    }

    pub fn with_ownership_bypass(mut self) -> Self {
        self.bypass_ownership = true;
        self
    }

    pub fn grant(mut self, grant: Grant) -> Self {
        self.grants.push(grant);
        self
    }

    /// First grant covering (resource, action), in declaration order.
    pub fn find_grant(&self, resource: &str, action: &str) -> Option<&Grant> {
        self.grants.iter().find(|g| g.covers(resource, action))
    }
}

/// Registry of role definitions.
///
/// Roles are configuration-time entities; the catalog is built once at
/// startup and shared read-only across requests.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: HashMap<String, Role>,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_role(&mut self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// The most privileged level defined in the catalog.
    pub fn min_level(&self) -> Option<i32> {
        self.roles.values().map(|r| r.level).min()
    }

    /// Whether `level` is the most privileged level defined.
    pub fn is_most_privileged(&self, level: i32) -> bool {
        self.min_level() == Some(level)
    }
}
