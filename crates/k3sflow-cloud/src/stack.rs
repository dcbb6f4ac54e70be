//! Stacks: independently synthesizable collections of resources

use crate::error::{CloudError, Result};
use crate::resource::{PATH_METADATA_KEY, Resource, logical_id};
use crate::template::{Template, TemplateExport, TemplateOutput, TemplateParameter, TemplateResource};
use crate::token::{Reference, collect_references, resolve_tokens};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Target account and region of a stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self { account, region }
    }

    /// True when neither account nor region is pinned
    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

/// A value a stack publishes for operators or for other stacks
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl Output {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
            export_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_export_name(mut self, export_name: impl Into<String>) -> Self {
        self.export_name = Some(export_name.into());
        self
    }
}

/// Handle to a value exported by another stack.
///
/// Obtained from [`Stack::add_output`]; passing it to [`Stack::import_value`]
/// makes the consumer depend on the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportRef {
    pub producer: String,
    pub export_name: String,
}

impl ExportRef {
    pub fn reference(&self) -> Reference {
        Reference::import(&self.export_name)
    }
}

/// Ordering dependency between two stacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDependency {
    pub stack: String,
    pub reason: String,
}

/// A declarative unit in its declared state
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    environment: Environment,
    description: Option<String>,
    parameters: BTreeMap<String, TemplateParameter>,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, Output>,
    /// export name -> producing stack, when known at declaration time
    imports: BTreeMap<String, Option<String>>,
    dependencies: Vec<StackDependency>,
}

impl Stack {
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            environment,
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            imports: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn dependencies(&self) -> &[StackDependency] {
        &self.dependencies
    }

    /// Export names imported by this stack with their producer, if known
    pub fn imports(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.imports
            .iter()
            .map(|(name, producer)| (name.as_str(), producer.as_deref()))
    }

    /// Export names declared by this stack
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().filter_map(|o| o.export_name.as_deref())
    }

    /// Logical id for a construct path inside this stack
    pub fn logical_id(&self, components: &[&str]) -> String {
        logical_id(components)
    }

    /// Full construct path for components inside this stack
    pub fn path(&self, components: &[&str]) -> String {
        let mut path = self.name.clone();
        for component in components {
            path.push('/');
            path.push_str(component);
        }
        path
    }

    /// Start a resource at `components` with a derived logical id and path
    pub fn new_resource(&self, components: &[&str], resource_type: &str) -> Resource {
        Resource::new(
            self.logical_id(components),
            resource_type,
            self.path(components),
        )
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<Reference> {
        if self.resources.contains_key(&resource.logical_id)
            || self.parameters.contains_key(&resource.logical_id)
        {
            return Err(CloudError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id: resource.logical_id,
            });
        }
        tracing::debug!(
            stack = %self.name,
            logical_id = %resource.logical_id,
            resource_type = %resource.resource_type,
            "Declared resource"
        );
        let reference = resource.reference();
        self.resources.insert(resource.logical_id.clone(), resource);
        Ok(reference)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Result<&mut Resource> {
        self.resources
            .get_mut(logical_id)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{}/{}", self.name, logical_id)))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Declare a template parameter and return a `Ref` to it
    pub fn add_parameter(
        &mut self,
        logical_id: impl Into<String>,
        parameter: TemplateParameter,
    ) -> Result<Reference> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(CloudError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id,
            });
        }
        // Re-declaring an identical parameter is harmless; constructs share them
        if let Some(existing) = self.parameters.get(&logical_id)
            && existing != &parameter
        {
            return Err(CloudError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id,
            });
        }
        self.parameters.insert(logical_id.clone(), parameter);
        Ok(Reference::to_ref(logical_id))
    }

    /// Declare an output; returns a handle when the output is exported
    pub fn add_output(&mut self, id: impl Into<String>, output: Output) -> Result<Option<ExportRef>> {
        let id = id.into();
        if self.outputs.contains_key(&id) {
            return Err(CloudError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id: id,
            });
        }
        if let Some(name) = &output.export_name
            && self.exports().any(|existing| existing == name)
        {
            return Err(CloudError::DuplicateExport(name.clone()));
        }
        let export = output.export_name.as_ref().map(|name| ExportRef {
            producer: self.name.clone(),
            export_name: name.clone(),
        });
        self.outputs.insert(id, output);
        Ok(export)
    }

    /// Import a value exported by another stack and depend on that stack
    pub fn import_value(&mut self, export: &ExportRef) -> Reference {
        self.imports
            .insert(export.export_name.clone(), Some(export.producer.clone()));
        if !self.depends_on(&export.producer) {
            let reason = format!("imports {}", export.export_name);
            self.add_dependency(export.producer.clone(), reason);
        }
        export.reference()
    }

    /// Import by export name alone.
    ///
    /// No dependency is recorded; synthesis fails unless one is declared
    /// with [`Stack::add_dependency`].
    pub fn import_by_name(&mut self, export_name: impl Into<String>) -> Reference {
        let export_name = export_name.into();
        self.imports.entry(export_name.clone()).or_insert(None);
        Reference::import(export_name)
    }

    pub fn add_dependency(&mut self, stack: impl Into<String>, reason: impl Into<String>) {
        let stack = stack.into();
        if stack == self.name || self.depends_on(&stack) {
            return;
        }
        self.dependencies.push(StackDependency {
            stack,
            reason: reason.into(),
        });
    }

    pub fn depends_on(&self, stack: &str) -> bool {
        self.dependencies.iter().any(|d| d.stack == stack)
    }

    fn is_known_target(&self, target: &str) -> bool {
        target.starts_with("AWS::")
            || self.resources.contains_key(target)
            || self.parameters.contains_key(target)
    }

    fn check_references(&self, value: &Value) -> Result<()> {
        for reference in collect_references(value) {
            match &reference {
                Reference::ImportValue(name) => {
                    if !self.imports.contains_key(name) {
                        return Err(CloudError::UnresolvedReference {
                            stack: self.name.clone(),
                            target: format!("import {}", name),
                        });
                    }
                }
                _ => {
                    if let Some(target) = reference.target()
                        && !self.is_known_target(target)
                    {
                        return Err(CloudError::UnresolvedReference {
                            stack: self.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate every reference and render the template
    pub fn synth(&self) -> Result<Template> {
        let mut template = Template::new(self.description.clone());
        template.parameters = self.parameters.clone();

        for resource in self.resources.values() {
            let properties = Value::Object(resource.properties.clone());
            self.check_references(&properties)?;
            for dependency in &resource.depends_on {
                if !self.resources.contains_key(dependency) {
                    return Err(CloudError::UnresolvedReference {
                        stack: self.name.clone(),
                        target: dependency.clone(),
                    });
                }
            }

            let properties = match resolve_tokens(properties) {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            let mut metadata = Map::new();
            metadata.insert(
                PATH_METADATA_KEY.to_string(),
                Value::String(resource.path.clone()),
            );
            template.resources.insert(
                resource.logical_id.clone(),
                TemplateResource {
                    resource_type: resource.resource_type.clone(),
                    properties,
                    depends_on: resource.depends_on.iter().cloned().collect(),
                    metadata,
                },
            );
        }

        for (id, output) in &self.outputs {
            self.check_references(&output.value)?;
            template.outputs.insert(
                id.clone(),
                TemplateOutput {
                    value: resolve_tokens(output.value.clone()),
                    description: output.description.clone(),
                    export: output
                        .export_name
                        .as_ref()
                        .map(|name| TemplateExport { name: name.clone() }),
                },
            );
        }

        tracing::debug!(
            stack = %self.name,
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "Synthesized stack"
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("Base", Environment::default())
    }

    #[test]
    fn test_duplicate_logical_id_rejected() {
        let mut s = stack();
        let r = s.new_resource(&["vpc"], "AWS::EC2::VPC");
        s.add_resource(r.clone()).unwrap();
        assert!(matches!(
            s.add_resource(r),
            Err(CloudError::DuplicateLogicalId { .. })
        ));
    }

    #[test]
    fn test_dangling_reference_fails_synth() {
        let mut s = stack();
        let r = s
            .new_resource(&["subnet"], "AWS::EC2::Subnet")
            .with_property("VpcId", Reference::to_ref("Missing"));
        s.add_resource(r).unwrap();
        assert!(matches!(
            s.synth(),
            Err(CloudError::UnresolvedReference { target, .. }) if target == "Missing"
        ));
    }

    #[test]
    fn test_pseudo_parameters_are_known() {
        let mut s = stack();
        let r = s
            .new_resource(&["role"], "AWS::IAM::Role")
            .with_property("Arn", format!("arn:{}:x", Reference::to_ref("AWS::Partition")));
        s.add_resource(r).unwrap();
        assert!(s.synth().is_ok());
    }

    #[test]
    fn test_synth_resolves_tokens_and_records_path() {
        let mut s = stack();
        let vpc = s.add_resource(s.new_resource(&["vpc"], "AWS::EC2::VPC")).unwrap();
        let subnet = s
            .new_resource(&["subnet"], "AWS::EC2::Subnet")
            .with_property("VpcId", vpc.to_token_string());
        let subnet_id = subnet.logical_id.clone();
        s.add_resource(subnet).unwrap();

        let template = s.synth().unwrap();
        let res = template.resource(&subnet_id).unwrap();
        assert_eq!(res.property("VpcId"), Some(&vpc.to_json()));
        assert_eq!(res.construct_path(), Some("Base/subnet"));
    }

    #[test]
    fn test_exported_output_returns_handle() {
        let mut s = stack();
        let vpc = s.add_resource(s.new_resource(&["vpc"], "AWS::EC2::VPC")).unwrap();
        let export = s
            .add_output("vpcId", Output::new(vpc).with_export_name("vpcId"))
            .unwrap()
            .unwrap();
        assert_eq!(export.producer, "Base");
        assert_eq!(export.export_name, "vpcId");

        let template = s.synth().unwrap();
        assert_eq!(template.exports(), vec!["vpcId"]);
    }

    #[test]
    fn test_duplicate_export_rejected() {
        let mut s = stack();
        s.add_output("a", Output::new(json!("x")).with_export_name("same"))
            .unwrap();
        assert!(matches!(
            s.add_output("b", Output::new(json!("y")).with_export_name("same")),
            Err(CloudError::DuplicateExport(_))
        ));
    }

    #[test]
    fn test_import_value_adds_dependency() {
        let mut consumer = Stack::new("Rules", Environment::default());
        let export = ExportRef {
            producer: "Base".to_string(),
            export_name: "sgId".to_string(),
        };
        let reference = consumer.import_value(&export);
        assert_eq!(reference, Reference::import("sgId"));
        assert!(consumer.depends_on("Base"));
    }

    #[test]
    fn test_unregistered_import_fails_synth() {
        let mut s = stack();
        let r = s
            .new_resource(&["rule"], "AWS::EC2::SecurityGroupIngress")
            .with_property("GroupId", Reference::import("sgId"));
        s.add_resource(r).unwrap();
        assert!(matches!(s.synth(), Err(CloudError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_environment_display() {
        let env = Environment::new(Some("123456789012".into()), None);
        assert_eq!(env.to_string(), "aws://123456789012/unknown-region");
        assert!(Environment::default().is_agnostic());
    }
}
