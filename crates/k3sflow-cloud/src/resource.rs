//! Resource declarations

use crate::token::Reference;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Metadata key carrying the construct path of a synthesized resource
pub const PATH_METADATA_KEY: &str = "k3sflow:path";

/// Build a logical id from construct path components.
///
/// The readable part keeps only ASCII alphanumerics; an 8-digit uppercase
/// hex digest of the full path keeps ids unique when two paths collapse to
/// the same readable text (`k3s-vpc` vs `k3svpc`).
pub fn logical_id(components: &[&str]) -> String {
    let readable: String = components
        .iter()
        .flat_map(|c| c.chars())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let digest = digest_hex(components.join("/").as_bytes(), 4);
    format!("{}{}", readable, digest)
}

/// Uppercase hex of the first `len` bytes of the SHA-256 of `data`
pub fn digest_hex(data: &[u8], len: usize) -> String {
    Sha256::digest(data)
        .iter()
        .take(len)
        .map(|b| format!("{:02X}", b))
        .collect()
}

/// A single declared resource inside a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Key of the resource within its template
    pub logical_id: String,

    /// CloudFormation type (e.g., "AWS::EC2::Instance")
    pub resource_type: String,

    /// Construct path (`Stack/construct/child`)
    pub path: String,

    /// Resource properties, possibly containing reference tokens
    pub properties: Map<String, Value>,

    /// Explicit ordering dependencies on other resources in the same stack
    pub depends_on: BTreeSet<String>,
}

impl Resource {
    pub fn new(
        logical_id: impl Into<String>,
        resource_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            path: path.into(),
            properties: Map::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the property only when a value is present
    pub fn with_optional_property(
        mut self,
        key: impl Into<String>,
        value: Option<impl Into<Value>>,
    ) -> Self {
        if let Some(value) = value {
            self.properties.insert(key.into(), value.into());
        }
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a property value as a specific type
    pub fn get_property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Append to a list-valued property, creating it if needed
    pub fn push_property(&mut self, key: &str, value: impl Into<Value>) {
        let entry = self
            .properties
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(value.into());
        } else {
            *entry = Value::Array(vec![value.into()]);
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.insert(logical_id.into());
        self
    }

    pub fn add_dependency(&mut self, logical_id: impl Into<String>) {
        self.depends_on.insert(logical_id.into());
    }

    /// `Ref` to this resource
    pub fn reference(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    /// `Fn::GetAtt` on this resource
    pub fn attribute(&self, attribute: &str) -> Reference {
        Reference::get_att(&self.logical_id, attribute)
    }
}
