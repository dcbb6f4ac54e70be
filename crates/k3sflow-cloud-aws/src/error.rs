//! AWS construct error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("CIDR {cidr} cannot be split into {count} subnets of at least /28")]
    SubnetTooSmall { cidr: String, count: usize },

    #[error("Instance {instance} uses security group {security_group} from another VPC")]
    CrossVpc {
        instance: String,
        security_group: String,
    },

    #[error("VPC {vpc} has no {subnet_type} subnets")]
    NoSubnets { vpc: String, subnet_type: String },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cloud error: {0}")]
    CloudError(#[from] k3sflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;
