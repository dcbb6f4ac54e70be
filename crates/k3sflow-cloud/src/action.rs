//! Change planning between two synthesized templates
//!
//! The provisioning engine computes its own change set at apply time; this
//! plan is a preview of what it will see, so operators can spot instance
//! replacements before handing the assembly over.

use crate::app::CloudAssembly;
use crate::template::{Template, TemplateResource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Represents a planned action for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "AWS::EC2::Instance")
    pub resource_type: String,

    /// Logical id in the new template (the old one for deletions)
    pub logical_id: String,

    /// Construct path, when recorded
    pub construct_path: Option<String>,

    /// Description of the action
    pub description: String,

    /// Additional details about the action
    pub details: HashMap<String, serde_json::Value>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Destroy the resource and create a fresh one
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Properties whose change forces the engine to replace a resource
pub fn replacement_properties(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "AWS::EC2::Instance" => &[
            "AvailabilityZone",
            "ImageId",
            "KeyName",
            "NetworkInterfaces",
            "PrivateIpAddress",
            "SubnetId",
        ],
        "AWS::EC2::VPC" => &["CidrBlock", "InstanceTenancy"],
        "AWS::EC2::Subnet" => &["AvailabilityZone", "CidrBlock", "VpcId"],
        "AWS::EC2::SecurityGroup" => &["GroupDescription", "GroupName", "VpcId"],
        "AWS::EC2::SecurityGroupIngress" => &[
            "CidrIp",
            "FromPort",
            "GroupId",
            "IpProtocol",
            "SourceSecurityGroupId",
            "ToPort",
        ],
        "AWS::EC2::KeyPair" => &["KeyFormat", "KeyName", "KeyType", "PublicKeyMaterial"],
        "AWS::EC2::EIP" => &["Domain"],
        "AWS::EC2::NatGateway" => &["AllocationId", "SubnetId"],
        "AWS::EC2::RouteTable" => &["VpcId"],
        "AWS::EC2::Route" => &["DestinationCidrBlock", "RouteTableId"],
        "AWS::EC2::SubnetRouteTableAssociation" => &["RouteTableId", "SubnetId"],
        "AWS::EC2::VPCGatewayAttachment" => &["InternetGatewayId", "VpcId"],
        "AWS::IAM::Role" => &["Path", "RoleName"],
        "AWS::IAM::InstanceProfile" => &["InstanceProfileName", "Path"],
        "AWS::ElasticLoadBalancingV2::LoadBalancer" => &["Name", "Scheme", "Type"],
        "AWS::ElasticLoadBalancingV2::TargetGroup" => {
            &["Name", "Port", "Protocol", "TargetType", "VpcId"]
        }
        "AWS::ElasticLoadBalancingV2::Listener" => &["LoadBalancerArn"],
        _ => &[],
    }
}

/// Plan containing all actions for one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Stack the plan applies to
    pub stack: String,

    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(stack: impl Into<String>, actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            stack: stack.into(),
            actions,
            has_changes,
        }
    }

    pub fn empty(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Compare a previously synthesized template with a new one
    pub fn between(stack: impl Into<String>, previous: Option<&Template>, next: &Template) -> Self {
        let stack = stack.into();
        let empty = Template::new(None);
        let previous = previous.unwrap_or(&empty);

        let previous_by_path: HashMap<&str, &str> = previous
            .resources
            .iter()
            .filter_map(|(id, r)| r.construct_path().map(|p| (p, id.as_str())))
            .collect();

        let mut matched: HashSet<&str> = HashSet::new();
        let mut actions = Vec::new();

        for (logical_id, resource) in &next.resources {
            let old_id = resource
                .construct_path()
                .and_then(|p| previous_by_path.get(p).copied())
                .or_else(|| {
                    previous
                        .resources
                        .contains_key(logical_id)
                        .then_some(logical_id.as_str())
                });

            let Some(old_id) = old_id else {
                actions.push(action(
                    &stack,
                    ActionType::Create,
                    logical_id,
                    resource,
                    "New resource".to_string(),
                    HashMap::new(),
                ));
                continue;
            };
            matched.insert(old_id);
            let Some(old) = previous.resources.get(old_id) else {
                continue;
            };

            let mut details = HashMap::new();
            if old_id != logical_id.as_str() {
                details.insert("previous_logical_id".to_string(), serde_json::json!(old_id));
                actions.push(action(
                    &stack,
                    ActionType::Replace,
                    logical_id,
                    resource,
                    format!("Logical id changed from {}", old_id),
                    details,
                ));
                continue;
            }

            if old.resource_type != resource.resource_type {
                actions.push(action(
                    &stack,
                    ActionType::Replace,
                    logical_id,
                    resource,
                    format!("Type changed from {}", old.resource_type),
                    details,
                ));
                continue;
            }

            let changed = changed_properties(old, resource);
            if changed.is_empty() {
                actions.push(action(
                    &stack,
                    ActionType::NoOp,
                    logical_id,
                    resource,
                    "Unchanged".to_string(),
                    details,
                ));
                continue;
            }

            let forcing: Vec<&str> = replacement_properties(&resource.resource_type)
                .iter()
                .copied()
                .filter(|p| changed.contains(*p))
                .collect();
            details.insert(
                "changed_properties".to_string(),
                serde_json::json!(changed.iter().collect::<Vec<_>>()),
            );
            if forcing.is_empty() {
                actions.push(action(
                    &stack,
                    ActionType::Update,
                    logical_id,
                    resource,
                    format!("Modified: {}", join(&changed)),
                    details,
                ));
            } else {
                actions.push(action(
                    &stack,
                    ActionType::Replace,
                    logical_id,
                    resource,
                    format!("Requires replacement: {}", forcing.join(", ")),
                    details,
                ));
            }
        }

        for (logical_id, resource) in &previous.resources {
            if !matched.contains(logical_id.as_str()) {
                actions.push(action(
                    &stack,
                    ActionType::Delete,
                    logical_id,
                    resource,
                    "Removed from template".to_string(),
                    HashMap::new(),
                ));
            }
        }

        Plan::new(stack, actions)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// One plan per stack of `next`, plus deletion plans for dropped stacks
pub fn plan_assembly(previous: Option<&CloudAssembly>, next: &CloudAssembly) -> Vec<Plan> {
    let mut plans: Vec<Plan> = next
        .stacks
        .iter()
        .map(|s| {
            let old = previous.and_then(|p| p.template(&s.name));
            Plan::between(s.name.clone(), old, &s.template)
        })
        .collect();

    if let Some(previous) = previous {
        let empty = Template::new(None);
        for old in &previous.stacks {
            if next.stack(&old.name).is_none() {
                plans.push(Plan::between(old.name.clone(), Some(&old.template), &empty));
            }
        }
    }
    plans
}

fn action(
    stack: &str,
    action_type: ActionType,
    logical_id: &str,
    resource: &TemplateResource,
    description: String,
    details: HashMap<String, serde_json::Value>,
) -> Action {
    Action {
        id: format!("{}:{}:{}", stack, action_type, logical_id),
        action_type,
        resource_type: resource.resource_type.clone(),
        logical_id: logical_id.to_string(),
        construct_path: resource.construct_path().map(str::to_string),
        description,
        details,
    }
}

fn changed_properties(old: &TemplateResource, new: &TemplateResource) -> BTreeSet<String> {
    old.properties
        .keys()
        .chain(new.properties.keys())
        .filter(|k| old.properties.get(*k) != new.properties.get(*k))
        .cloned()
        .collect()
}

fn join(keys: &BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}
