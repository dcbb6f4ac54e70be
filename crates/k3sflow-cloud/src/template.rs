//! Synthesized CloudFormation template documents

use crate::error::Result;
use crate::resource::PATH_METADATA_KEY;
use crate::token::{Reference, collect_references};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Template format version understood by the provisioning engine
pub const FORMAT_VERSION: &str = "2010-09-09";

/// A synthesized stack template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,

    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

/// A resource entry of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TemplateResource {
    /// Construct path recorded at synthesis, if any
    pub fn construct_path(&self) -> Option<&str> {
        self.metadata.get(PATH_METADATA_KEY).and_then(Value::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A template parameter, resolved by the engine at apply time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateParameter {
    pub fn new(parameter_type: impl Into<String>) -> Self {
        Self {
            parameter_type: parameter_type.into(),
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A stack output, optionally exported for other stacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<TemplateExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateExport {
    pub name: String,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources.get(logical_id)
    }

    /// Resources of one type, ordered by logical id
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&str, &TemplateResource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    /// Find a resource by the construct path it was declared under
    pub fn resource_by_path(&self, path: &str) -> Option<(&str, &TemplateResource)> {
        self.resources
            .iter()
            .find(|(_, r)| r.construct_path() == Some(path))
            .map(|(id, r)| (id.as_str(), r))
    }

    /// Export names declared by this template
    pub fn exports(&self) -> Vec<&str> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.as_str()))
            .collect()
    }

    /// Export names this template imports through `Fn::ImportValue`
    pub fn imports(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resources
            .values()
            .flat_map(|r| collect_references(&Value::Object(r.properties.clone())))
            .chain(
                self.outputs
                    .values()
                    .flat_map(|o| collect_references(&o.value)),
            )
            .filter_map(|r| match r {
                Reference::ImportValue(name) => Some(name),
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_json_shape() {
        let mut template = Template::new(Some("demo".to_string()));
        let mut properties = Map::new();
        properties.insert("CidrBlock".to_string(), json!("10.0.3.0/24"));
        template.resources.insert(
            "Vpc".to_string(),
            TemplateResource {
                resource_type: "AWS::EC2::VPC".to_string(),
                properties,
                depends_on: vec![],
                metadata: Map::new(),
            },
        );

        let value: Value = serde_json::from_str(&template.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Resources"]["Vpc"]["Type"], "AWS::EC2::VPC");
        assert_eq!(value["Resources"]["Vpc"]["Properties"]["CidrBlock"], "10.0.3.0/24");
        assert!(value["Resources"]["Vpc"].get("DependsOn").is_none());
        assert!(value.get("Outputs").is_none());
    }

    #[test]
    fn test_imports_are_collected() {
        let mut template = Template::new(None);
        let mut properties = Map::new();
        properties.insert("GroupId".to_string(), json!({ "Fn::ImportValue": "sgId" }));
        properties.insert(
            "SourceSecurityGroupId".to_string(),
            json!({ "Fn::ImportValue": "sgId" }),
        );
        template.resources.insert(
            "Rule".to_string(),
            TemplateResource {
                resource_type: "AWS::EC2::SecurityGroupIngress".to_string(),
                properties,
                depends_on: vec![],
                metadata: Map::new(),
            },
        );
        assert_eq!(template.imports(), vec!["sgId".to_string()]);
    }
}
