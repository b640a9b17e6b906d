//! CloudFormation-style template types emitted for the provisioning tool.
//!
//! These types are serialised as JSON and consumed by the external
//! provisioning tool; nothing in this repository interprets them beyond the
//! structural validation pass. `BTreeMap` keeps the emitted JSON
//! deterministic across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::DeclError;

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// One stack's declaration: a named set of resources plus exported outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    /// An empty template with the standard format version.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: "2010-09-09".into(),
            description: description.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource under `logical_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeclError::DuplicateLogicalId`] if the id is already taken —
    /// a silent overwrite would drop a declared resource.
    pub fn insert(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<(), DeclError> {
        let id = logical_id.into();
        if self.resources.contains_key(&id) {
            return Err(DeclError::DuplicateLogicalId(id));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    /// Add an output under `name`, replacing any previous output of that name.
    pub fn add_output(&mut self, name: impl Into<String>, output: Output) {
        self.outputs.insert(name.into(), output);
    }

    /// Iterate over resources of the given `Type`, in logical-id order.
    pub fn resources_of_kind<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> {
        self.resources.iter().filter(move |(_, r)| r.kind == kind)
    }

    /// The names of all exported outputs.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A single declared resource: its provider type, properties, and lifecycle
/// options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    /// Set the teardown policy for this resource.
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    /// Add an explicit ordering edge to another resource in the same stack.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }
}

/// What the provisioning tool does with a resource when its stack is torn
/// down. `Delete` is destructive: the resource and its data are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A stack output, optionally exported so later stacks can import it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Export", skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    /// An output exported under `name` for cross-stack import.
    pub fn exported(value: Value, name: impl Into<String>) -> Self {
        Self {
            value,
            export: Some(Export { name: name.into() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Intrinsic builders
// ---------------------------------------------------------------------------

/// Reference to another resource in the same stack.
pub fn ref_to(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// Attribute of another resource in the same stack.
pub fn get_att(logical_id: &str, attr: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attr] })
}

/// Import of a value exported by an earlier stack.
pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// The `index`-th availability zone of whatever region the declaration is
/// applied in. Keeps the templates environment-agnostic: no account or
/// region is baked in.
pub fn select_az(index: usize) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

/// Dynamic reference to one JSON key of a Secrets Manager secret declared in
/// the same stack. The secret value itself never appears in the template.
pub fn secret_value(secret_logical_id: &str, key: &str) -> Value {
    json!({
        "Fn::Sub":
            format!("{{{{resolve:secretsmanager:${{{secret_logical_id}}}:SecretString:{key}}}}}")
    })
}
