//! Application load balancers, listeners and target groups

use crate::error::{AwsError, Result};
use crate::security_group::SecurityGroup;
use crate::vpc::{SubnetType, Vpc};
use k3sflow_cloud::{Reference, Stack};
use serde_json::{Value, json};

/// ELBv2 names: at most 32 characters, alphanumerics and hyphens, no
/// leading or trailing hyphen
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 32
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !valid {
        return Err(AwsError::InvalidName(format!(
            "{} name {:?} must be 1-32 alphanumerics or hyphens, not starting or ending with a hyphen",
            kind, name
        )));
    }
    Ok(())
}

/// Application load balancers must span at least two AZs
pub const MIN_LOAD_BALANCER_SUBNETS: usize = 2;

pub struct LoadBalancerProps<'a> {
    pub vpc: &'a Vpc,
    pub internet_facing: bool,
    pub load_balancer_name: Option<String>,
    pub security_group: &'a SecurityGroup,
}

#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancer {
    id: String,
    logical_id: String,
    vpc_id: Reference,
}

impl ApplicationLoadBalancer {
    pub fn new(stack: &mut Stack, id: &str, props: LoadBalancerProps<'_>) -> Result<Self> {
        if let Some(name) = &props.load_balancer_name {
            validate_name("load balancer", name)?;
        }
        let subnet_type = if props.internet_facing {
            SubnetType::Public
        } else {
            SubnetType::PrivateWithEgress
        };
        let subnets = props.vpc.subnets(subnet_type);
        if subnets.is_empty() {
            return Err(AwsError::NoSubnets {
                vpc: props.vpc.logical_id().to_string(),
                subnet_type: subnet_type.to_string(),
            });
        }
        if subnets.len() < MIN_LOAD_BALANCER_SUBNETS {
            return Err(AwsError::InvalidConfig(format!(
                "load balancer {} needs {} subnets in distinct AZs, vpc has {} {} subnet(s)",
                id,
                MIN_LOAD_BALANCER_SUBNETS,
                subnets.len(),
                subnet_type
            )));
        }

        let mut resource = stack
            .new_resource(&[id], "AWS::ElasticLoadBalancingV2::LoadBalancer")
            .with_property(
                "LoadBalancerAttributes",
                json!([{ "Key": "deletion_protection.enabled", "Value": "false" }]),
            )
            .with_optional_property("Name", props.load_balancer_name.clone())
            .with_property(
                "Scheme",
                if props.internet_facing { "internet-facing" } else { "internal" },
            )
            .with_property(
                "SecurityGroups",
                json!([Value::from(props.security_group.security_group_id())]),
            )
            .with_property(
                "Subnets",
                subnets
                    .iter()
                    .map(|s| Value::from(s.subnet_id()))
                    .collect::<Vec<_>>(),
            )
            .with_property("Type", "application");
        // Internet-facing balancers need the public routes in place first
        if props.internet_facing {
            for subnet in subnets {
                resource.add_dependency(subnet.default_route_id.clone());
            }
        }
        let logical_id = resource.logical_id.clone();
        stack.add_resource(resource)?;

        Ok(Self {
            id: id.to_string(),
            logical_id,
            vpc_id: props.vpc.vpc_id(),
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn load_balancer_arn(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    pub fn dns_name(&self) -> Reference {
        Reference::get_att(&self.logical_id, "DNSName")
    }

    /// Add an HTTP listener. It answers 404 until targets are added.
    pub fn add_listener(&self, stack: &mut Stack, id: &str, port: u16) -> Result<Listener> {
        let resource = stack
            .new_resource(&[&self.id, id], "AWS::ElasticLoadBalancingV2::Listener")
            .with_property(
                "DefaultActions",
                json!([{
                    "FixedResponseConfig": { "StatusCode": "404" },
                    "Type": "fixed-response",
                }]),
            )
            .with_property("LoadBalancerArn", self.load_balancer_arn())
            .with_property("Port", port)
            .with_property("Protocol", "HTTP");
        let logical_id = resource.logical_id.clone();
        stack.add_resource(resource)?;

        Ok(Listener {
            path: vec![self.id.clone(), id.to_string()],
            logical_id,
            vpc_id: self.vpc_id.clone(),
            port,
        })
    }
}

/// An instance registered with a target group
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTarget {
    pub instance_id: Reference,
    pub port: u16,
}

impl InstanceTarget {
    pub fn new(instance_id: Reference, port: u16) -> Self {
        Self { instance_id, port }
    }
}

pub struct AddTargetsProps {
    pub port: u16,
    pub target_group_name: Option<String>,
    pub targets: Vec<InstanceTarget>,
}

#[derive(Debug, Clone)]
pub struct Listener {
    path: Vec<String>,
    logical_id: String,
    vpc_id: Reference,
    port: u16,
}

impl Listener {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Create a target group and make it the listener's default action
    pub fn add_targets(
        &self,
        stack: &mut Stack,
        id: &str,
        props: AddTargetsProps,
    ) -> Result<TargetGroup> {
        if let Some(name) = &props.target_group_name {
            validate_name("target group", name)?;
        }
        let targets: Vec<Value> = props
            .targets
            .iter()
            .map(|t| json!({ "Id": Value::from(&t.instance_id), "Port": t.port }))
            .collect();

        let mut components: Vec<&str> = self.path.iter().map(String::as_str).collect();
        components.extend([id, "Group"]);
        let resource = stack
            .new_resource(&components, "AWS::ElasticLoadBalancingV2::TargetGroup")
            .with_optional_property("Name", props.target_group_name.clone())
            .with_property("Port", props.port)
            .with_property("Protocol", "HTTP")
            .with_property("TargetType", "instance")
            .with_property("Targets", targets)
            .with_property("VpcId", self.vpc_id.clone());
        let logical_id = resource.logical_id.clone();
        let group_arn = stack.add_resource(resource)?;

        stack.resource_mut(&self.logical_id)?.set_property(
            "DefaultActions",
            json!([{ "TargetGroupArn": Value::from(&group_arn), "Type": "forward" }]),
        );

        tracing::debug!(
            listener = %self.logical_id,
            target_group = %logical_id,
            targets = props.targets.len(),
            "Forwarding listener to target group"
        );
        Ok(TargetGroup { logical_id })
    }
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    logical_id: String,
}

impl TargetGroup {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn target_group_arn(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_group::SecurityGroupProps;
    use crate::vpc::VpcProps;
    use k3sflow_cloud::Environment;

    #[test]
    fn test_single_az_rejected() {
        let mut stack = Stack::new("Test", Environment::default());
        let props = VpcProps {
            max_azs: 1,
            ..VpcProps::new("10.0.3.0/24".parse().unwrap())
        };
        let vpc = Vpc::new(&mut stack, "vpc", props).unwrap();
        let sg = SecurityGroup::new(
            &mut stack,
            "sg",
            SecurityGroupProps {
                vpc: &vpc,
                description: "lb".into(),
                allow_all_outbound: true,
            },
        )
        .unwrap();
        let result = ApplicationLoadBalancer::new(
            &mut stack,
            "lb",
            LoadBalancerProps {
                vpc: &vpc,
                internet_facing: true,
                load_balancer_name: None,
                security_group: &sg,
            },
        );
        assert!(matches!(result, Err(AwsError::InvalidConfig(_))));
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("target group", "k3s-control-plane-01-tg").is_ok());
        assert!(validate_name("target group", "-leading").is_err());
        assert!(validate_name("target group", &"x".repeat(33)).is_err());
        assert!(validate_name("target group", "under_score").is_err());
    }

    #[test]
    fn test_listener_forwards_after_targets() {
        let mut stack = Stack::new("Test", Environment::default());
        let vpc = Vpc::new(&mut stack, "vpc", VpcProps::new("10.0.3.0/24".parse().unwrap())).unwrap();
        let sg = SecurityGroup::new(
            &mut stack,
            "sg",
            SecurityGroupProps {
                vpc: &vpc,
                description: "lb".into(),
                allow_all_outbound: true,
            },
        )
        .unwrap();
        let lb = ApplicationLoadBalancer::new(
            &mut stack,
            "lb",
            LoadBalancerProps {
                vpc: &vpc,
                internet_facing: true,
                load_balancer_name: Some("lb".into()),
                security_group: &sg,
            },
        )
        .unwrap();
        let listener = lb.add_listener(&mut stack, "listener", 80).unwrap();
        let group = listener
            .add_targets(
                &mut stack,
                "targets",
                AddTargetsProps {
                    port: 80,
                    target_group_name: Some("tg".into()),
                    targets: vec![InstanceTarget::new(Reference::to_ref("AWS::NoValue"), 80)],
                },
            )
            .unwrap();

        let template = stack.synth().unwrap();
        let l = template.resource(listener.logical_id()).unwrap();
        assert_eq!(
            l.property("DefaultActions"),
            Some(&json!([{ "TargetGroupArn": { "Ref": group.logical_id() }, "Type": "forward" }]))
        );
        let balancer = template.resource(lb.logical_id()).unwrap();
        assert_eq!(balancer.property("Scheme"), Some(&json!("internet-facing")));
        assert_eq!(balancer.depends_on.len(), 2);
    }
}
