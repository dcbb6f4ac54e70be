//! References between constructs and their string tokens
//!
//! A [`Reference`] points at something whose value is only known once the
//! provisioning engine applies the template: a resource id, an attribute, or
//! a value exported by another stack. References can be embedded in plain
//! strings as tokens; [`resolve_tokens`] turns such strings back into
//! `Fn::Join` expressions during synthesis.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::LazyLock;

/// Pseudo parameter holding the partition (`aws`, `aws-cn`, ...)
pub const AWS_PARTITION: &str = "AWS::Partition";

/// Pseudo parameter holding the deployment region
pub const AWS_REGION: &str = "AWS::Region";

/// Pseudo parameter holding the deployment account id
pub const AWS_ACCOUNT_ID: &str = "AWS::AccountId";

static TOKEN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{Token\[(Ref|GetAtt|Import):([^\]]+)\]\}")
        .expect("token pattern is valid")
});

/// A late-bound value inside a template
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// `{"Ref": logical_id}`
    Ref(String),
    /// `{"Fn::GetAtt": [logical_id, attribute]}`
    GetAtt {
        logical_id: String,
        attribute: String,
    },
    /// `{"Fn::ImportValue": export_name}`
    ImportValue(String),
}

impl Reference {
    pub fn to_ref(logical_id: impl Into<String>) -> Self {
        Reference::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Reference::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn import(export_name: impl Into<String>) -> Self {
        Reference::ImportValue(export_name.into())
    }

    /// Render as a CloudFormation intrinsic
    pub fn to_json(&self) -> Value {
        match self {
            Reference::Ref(id) => json!({ "Ref": id }),
            Reference::GetAtt {
                logical_id,
                attribute,
            } => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            Reference::ImportValue(name) => json!({ "Fn::ImportValue": name }),
        }
    }

    /// Encode as a token that can be embedded in a string
    pub fn to_token_string(&self) -> String {
        match self {
            Reference::Ref(id) => format!("${{Token[Ref:{}]}}", id),
            Reference::GetAtt {
                logical_id,
                attribute,
            } => format!("${{Token[GetAtt:{}.{}]}}", logical_id, attribute),
            Reference::ImportValue(name) => format!("${{Token[Import:{}]}}", name),
        }
    }

    /// Logical id of the resource or parameter this reference targets, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Reference::Ref(id) => Some(id),
            Reference::GetAtt { logical_id, .. } => Some(logical_id),
            Reference::ImportValue(_) => None,
        }
    }

    fn from_token(kind: &str, body: &str) -> Option<Self> {
        match kind {
            "Ref" => Some(Reference::to_ref(body)),
            "GetAtt" => body
                .split_once('.')
                .map(|(id, attr)| Reference::get_att(id, attr)),
            "Import" => Some(Reference::import(body)),
            _ => None,
        }
    }

    fn from_intrinsic(map: &serde_json::Map<String, Value>) -> Option<Self> {
        if map.len() != 1 {
            return None;
        }
        if let Some(Value::String(id)) = map.get("Ref") {
            return Some(Reference::to_ref(id.as_str()));
        }
        if let Some(Value::Array(parts)) = map.get("Fn::GetAtt")
            && let [Value::String(id), Value::String(attr)] = parts.as_slice()
        {
            return Some(Reference::get_att(id.as_str(), attr.as_str()));
        }
        if let Some(Value::String(name)) = map.get("Fn::ImportValue") {
            return Some(Reference::import(name.as_str()));
        }
        None
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token_string())
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        reference.to_json()
    }
}

impl From<&Reference> for Value {
    fn from(reference: &Reference) -> Self {
        reference.to_json()
    }
}

/// Whether a string carries at least one reference token
pub fn contains_token(s: &str) -> bool {
    TOKEN_RE.is_match(s)
}

/// Replace every token in `s` with a fixed placeholder, leaving the literal
/// text. Useful for digests that must not move when a referenced logical id
/// does.
pub fn mask_tokens(s: &str) -> std::borrow::Cow<'_, str> {
    TOKEN_RE.replace_all(s, regex::NoExpand("${Token}"))
}

/// Replace every tokenized string inside `value` with its intrinsic form
pub fn resolve_tokens(value: Value) -> Value {
    match value {
        Value::String(s) => resolve_string(&s),
        Value::Array(items) => Value::Array(items.into_iter().map(resolve_tokens).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_tokens(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Resolve one string.
///
/// A string made of a single token becomes the bare intrinsic; a string
/// mixing literal text and tokens becomes `Fn::Join` with an empty delimiter.
pub fn resolve_string(s: &str) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(reference) = Reference::from_token(&caps[1], &caps[2]) else {
            continue;
        };
        if whole.start() > last {
            parts.push(Value::String(s[last..whole.start()].to_string()));
        }
        parts.push(reference.to_json());
        last = whole.end();
    }

    if parts.is_empty() {
        return Value::String(s.to_string());
    }
    if last < s.len() {
        parts.push(Value::String(s[last..].to_string()));
    }
    if parts.len() == 1 {
        return parts.remove(0);
    }
    json!({ "Fn::Join": ["", parts] })
}

/// Collect every reference appearing in `value`, resolved or still tokenized
pub fn collect_references(value: &Value) -> Vec<Reference> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn walk(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::String(s) => {
            for caps in TOKEN_RE.captures_iter(s) {
                if let Some(reference) = Reference::from_token(&caps[1], &caps[2]) {
                    found.push(reference);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| walk(v, found)),
        Value::Object(map) => {
            if let Some(reference) = Reference::from_intrinsic(map) {
                found.push(reference);
                return;
            }
            map.values().for_each(|v| walk(v, found));
        }
        _ => {}
    }
}

/// `{"Fn::Base64": value}`
pub fn fn_base64(value: impl Into<Value>) -> Value {
    json!({ "Fn::Base64": value.into() })
}

/// `{"Fn::Select": [index, list]}`
pub fn fn_select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::GetAZs": ""}` for the stack's region
pub fn fn_get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// `{"Fn::Join": [delimiter, parts]}`
pub fn fn_join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}
