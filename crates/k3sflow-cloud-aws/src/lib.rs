//! Typed AWS constructs for k3sflow
//!
//! Each construct declares one or more CloudFormation resources into a
//! [`k3sflow_cloud::Stack`] and hands back a value exposing the references
//! other constructs need (`vpc_id`, `security_group_id`, `private_ip`, ...).
//!
//! - [`Vpc`]: network, subnets, internet and NAT gateways
//! - [`SecurityGroup`]: groups and ingress rules
//! - [`KeyPair`], [`Role`]: access for instances
//! - [`Instance`], [`ElasticIp`]: compute
//! - [`ApplicationLoadBalancer`]: ALB, listeners and target groups

pub mod cidr;
pub mod eip;
pub mod elbv2;
pub mod error;
pub mod iam;
pub mod instance;
pub mod key_pair;
pub mod security_group;
pub mod vpc;

pub use cidr::Ipv4Cidr;
pub use eip::ElasticIp;
pub use elbv2::{
    AddTargetsProps, ApplicationLoadBalancer, InstanceTarget, Listener, LoadBalancerProps,
    TargetGroup,
};
pub use error::{AwsError, Result};
pub use iam::{Role, RoleProps, managed_policy_arn};
pub use instance::{
    ECS_AL2_IMAGE_PARAMETER, Instance, InstanceProps, InstanceType, MachineImage, UserData,
};
pub use key_pair::{KeyPair, KeyPairProps, KeyType};
pub use security_group::{IngressRule, Peer, Port, SecurityGroup, SecurityGroupProps};
pub use vpc::{MAX_AZS, Subnet, SubnetType, Vpc, VpcProps};

/// `Tags` value carrying a single `Name` tag
pub(crate) fn name_tags(name: &str) -> serde_json::Value {
    serde_json::json!([{ "Key": "Name", "Value": name }])
}
