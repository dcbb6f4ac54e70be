//! IAM roles and instance profiles for EC2

use crate::error::Result;
use k3sflow_cloud::token::AWS_PARTITION;
use k3sflow_cloud::{Reference, Stack};
use serde_json::{Value, json};

/// ARN of an AWS managed policy, partition-aware
pub fn managed_policy_arn(name: &str) -> String {
    format!(
        "arn:{}:iam::aws:policy/{}",
        Reference::to_ref(AWS_PARTITION),
        name
    )
}

#[derive(Debug, Clone)]
pub struct RoleProps {
    /// Service principal, e.g. `ec2.amazonaws.com`
    pub assumed_by: String,
    /// AWS managed policy names
    pub managed_policies: Vec<String>,
}

/// An IAM role
#[derive(Debug, Clone)]
pub struct Role {
    id: String,
    logical_id: String,
}

impl Role {
    pub fn new(stack: &mut Stack, id: &str, props: RoleProps) -> Result<Self> {
        let policies: Vec<String> = props
            .managed_policies
            .iter()
            .map(|name| managed_policy_arn(name))
            .collect();

        let resource = stack
            .new_resource(&[id], "AWS::IAM::Role")
            .with_property(
                "AssumeRolePolicyDocument",
                json!({
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": props.assumed_by },
                    }],
                    "Version": "2012-10-17",
                }),
            )
            .with_property("ManagedPolicyArns", policies);
        let logical_id = resource.logical_id.clone();
        stack.add_resource(resource)?;

        Ok(Self {
            id: id.to_string(),
            logical_id,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn role_name(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    pub fn role_arn(&self) -> Reference {
        Reference::get_att(&self.logical_id, "Arn")
    }

    /// Declare an instance profile wrapping this role under `owner`
    pub fn instance_profile(&self, stack: &mut Stack, owner: &str) -> Result<Reference> {
        let resource = stack
            .new_resource(&[owner, "InstanceProfile"], "AWS::IAM::InstanceProfile")
            .with_property("Roles", json!([Value::from(self.role_name())]));
        tracing::debug!(role = %self.id, owner = %owner, "Declared instance profile");
        Ok(stack.add_resource(resource)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k3sflow_cloud::Environment;

    fn role(stack: &mut Stack) -> Role {
        Role::new(
            stack,
            "k3s-role",
            RoleProps {
                assumed_by: "ec2.amazonaws.com".into(),
                managed_policies: vec!["AmazonSSMManagedInstanceCore".into()],
            },
        )
        .unwrap()
    }

    #[test]
    fn test_managed_policy_uses_partition() {
        let mut stack = Stack::new("Test", Environment::default());
        let role = role(&mut stack);
        let template = stack.synth().unwrap();
        let res = template.resource(role.logical_id()).unwrap();
        assert_eq!(
            res.property("ManagedPolicyArns"),
            Some(&json!([{
                "Fn::Join": ["", [
                    "arn:",
                    { "Ref": "AWS::Partition" },
                    ":iam::aws:policy/AmazonSSMManagedInstanceCore"
                ]]
            }]))
        );
    }

    #[test]
    fn test_instance_profile_references_role() {
        let mut stack = Stack::new("Test", Environment::default());
        let role = role(&mut stack);
        let profile = role.instance_profile(&mut stack, "cp").unwrap();
        let template = stack.synth().unwrap();
        let res = template.resource(profile.target().unwrap()).unwrap();
        assert_eq!(
            res.property("Roles"),
            Some(&json!([{ "Ref": role.logical_id() }]))
        );
    }
}
