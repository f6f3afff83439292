//! Resource references as Ansible passes them.
//!
//! Playbooks hand us ids as numbers, numeric strings or `{id: ...}` objects,
//! names as strings or `{name: ...}` objects, and either of those as lists.
//! Everything is normalised here, once, into [`Identity`] and [`ResourceRef`]
//! so the reconciliation code never inspects raw JSON.

use std::fmt;

use hc_infra::types::ResourceId;
use serde_json::Value;

use crate::error::{ModuleError, Result};

/// A single way of addressing a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    ById(ResourceId),
    ByName(String),
}

/// Lookup descriptor: try the id first, fall back to the name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRef {
    pub id: Option<ResourceId>,
    pub name: Option<String>,
}

impl ResourceRef {
    pub fn by_id(id: ResourceId) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }

    /// Parse a reference to a catalog item (image, ISO, server, SSH key).
    ///
    /// Numeric strings are tried as an id before falling back to the name.
    /// Returns `None` when the value has no usable shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let parsed = match value {
            Value::Number(_) => Self {
                id: id_of(value),
                name: None,
            },
            Value::String(s) => Self {
                id: id_of(value),
                name: (!s.trim().is_empty()).then(|| s.trim().to_string()),
            },
            Value::Object(map) => Self {
                id: map.get("id").and_then(id_of),
                name: map.get("name").and_then(name_of),
            },
            _ => return None,
        };
        (!parsed.is_empty()).then_some(parsed)
    }
}

impl From<Identity> for ResourceRef {
    fn from(identity: Identity) -> Self {
        match identity {
            Identity::ById(id) => Self::by_id(id),
            Identity::ByName(name) => Self::by_name(name),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.id) {
            (Some(name), _) => f.write_str(name),
            (None, Some(id)) => write!(f, "{id}"),
            (None, None) => f.write_str("<unnamed>"),
        }
    }
}

fn id_of(value: &Value) -> Option<ResourceId> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("id").and_then(id_of),
        _ => None,
    };
    id.filter(|id| *id > 0)
}

fn name_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(name_of),
        _ => None,
    }
}

fn scalars(field: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::Bool(_) => Err(ModuleError::Validation(format!(
            "'{field}' unknown format: {value}"
        ))),
        other => Ok(vec![other.clone()]),
    }
}

/// Parse an `id` field: a single id or a list of them.
pub fn parse_ids(value: &Value) -> Result<Vec<ResourceId>> {
    scalars("id", value)?
        .iter()
        .map(|item| {
            id_of(item)
                .ok_or_else(|| ModuleError::Validation(format!("'id' unknown format: {item}")))
        })
        .collect()
}

/// Parse a `name` field: a single name or a list of them.
pub fn parse_names(value: &Value) -> Result<Vec<String>> {
    scalars("name", value)?
        .iter()
        .map(|item| {
            name_of(item)
                .ok_or_else(|| ModuleError::Validation(format!("'name' unknown format: {item}")))
        })
        .collect()
}

/// Parse a single optional id, e.g. the `id` of a floating IP.
pub fn parse_id(value: &Value) -> Result<Option<ResourceId>> {
    match value {
        Value::Null => Ok(None),
        other => id_of(other)
            .map(Some)
            .ok_or_else(|| ModuleError::Validation(format!("'id' unknown format: {other}"))),
    }
}

/// Every requested identity, ids first.
pub fn parse_identities(id: &Value, name: &Value) -> Result<Vec<Identity>> {
    let ids = parse_ids(id)?.into_iter().map(Identity::ById);
    let names = parse_names(name)?.into_iter().map(Identity::ByName);
    Ok(ids.chain(names).collect())
}

/// Turn identities into lookup targets.
///
/// Exactly one id plus exactly one name address the same server: it is
/// looked up by id and renamed to the name. Any other mix yields one
/// target per identity.
pub fn targets(identities: Vec<Identity>) -> Vec<ResourceRef> {
    if let [Identity::ById(id), Identity::ByName(name)] = identities.as_slice() {
        return vec![ResourceRef {
            id: Some(*id),
            name: Some(name.clone()),
        }];
    }
    identities.into_iter().map(ResourceRef::from).collect()
}
