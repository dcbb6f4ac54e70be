//! EC2 instances

use crate::error::{AwsError, Result};
use crate::iam::Role;
use crate::security_group::SecurityGroup;
use crate::vpc::{SubnetType, Vpc};
use k3sflow_cloud::token::{fn_base64, mask_tokens};
use k3sflow_cloud::{Reference, Resource, Stack, TemplateParameter, digest_hex, logical_id};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// SSM parameter publishing the current ECS-optimized Amazon Linux 2 AMI
pub const ECS_AL2_IMAGE_PARAMETER: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id";

const SSM_IMAGE_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>";

/// Instance type such as `t3a.micro`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceType(String);

impl InstanceType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceType {
    fn default() -> Self {
        Self("t3a.micro".to_string())
    }
}

impl FromStr for InstanceType {
    type Err = AwsError;

    fn from_str(s: &str) -> Result<Self> {
        let valid = s.split_once('.').is_some_and(|(family, size)| {
            !family.is_empty()
                && !size.is_empty()
                && family.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && size.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        });
        if !valid {
            return Err(AwsError::InvalidConfig(format!(
                "Invalid instance type: {}",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the instance's image id comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineImage {
    /// ECS-optimized Amazon Linux 2, standard hardware
    EcsOptimizedAmazonLinux2,
    /// Any SSM parameter holding an image id
    SsmParameter(String),
    /// A fixed AMI id
    Ami(String),
}

impl MachineImage {
    /// Resolve to an `ImageId` value, declaring a template parameter when
    /// the image is looked up through SSM
    fn image_id(&self, stack: &mut Stack) -> Result<Value> {
        let parameter_name = match self {
            MachineImage::Ami(id) => return Ok(json!(id)),
            MachineImage::EcsOptimizedAmazonLinux2 => ECS_AL2_IMAGE_PARAMETER,
            MachineImage::SsmParameter(name) => name.as_str(),
        };
        let parameter_id = logical_id(&["SsmParameterValue", parameter_name]);
        let reference = stack.add_parameter(
            parameter_id,
            TemplateParameter::new(SSM_IMAGE_PARAMETER_TYPE).with_default(parameter_name),
        )?;
        Ok(reference.into())
    }
}

/// Boot payload passed through to the instance verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    content: String,
}

impl UserData {
    /// Use `content` as the whole payload; it may embed reference tokens
    pub fn custom(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Hex digest of the payload text. Embedded references count only by
    /// position, so a referenced resource getting a new logical id does not
    /// move the digest.
    pub fn digest(&self) -> String {
        digest_hex(mask_tokens(&self.content).as_bytes(), 8)
    }
}

pub struct InstanceProps<'a> {
    pub vpc: &'a Vpc,
    pub subnet_type: SubnetType,
    pub security_group: &'a SecurityGroup,
    pub instance_type: InstanceType,
    pub machine_image: MachineImage,
    pub key_name: Option<Reference>,
    pub role: Option<&'a Role>,
    pub user_data: UserData,
    /// Fold the payload digest into the logical id so a new payload means
    /// a new instance
    pub user_data_causes_replacement: bool,
    pub detailed_monitoring: bool,
    pub instance_name: Option<String>,
}

/// A declared EC2 instance
#[derive(Debug, Clone)]
pub struct Instance {
    id: String,
    logical_id: String,
    subnet_type: SubnetType,
    user_data: UserData,
}

impl Instance {
    pub fn new(stack: &mut Stack, id: &str, props: InstanceProps<'_>) -> Result<Self> {
        if let Some(group_vpc) = props.security_group.vpc_logical_id()
            && group_vpc != props.vpc.logical_id()
        {
            return Err(AwsError::CrossVpc {
                instance: stack.path(&[id]),
                security_group: props
                    .security_group
                    .logical_id()
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let subnet = props.vpc.select_subnet(props.subnet_type)?;

        let mut logical_id = stack.logical_id(&[id]);
        if props.user_data_causes_replacement {
            logical_id.push_str(&props.user_data.digest());
        }

        let name = props
            .instance_name
            .clone()
            .unwrap_or_else(|| stack.path(&[id]));

        let mut resource = Resource::new(&logical_id, "AWS::EC2::Instance", stack.path(&[id]))
            .with_property("AvailabilityZone", subnet.availability_zone())
            .with_property("ImageId", props.machine_image.image_id(stack)?)
            .with_property("InstanceType", props.instance_type.as_str())
            .with_optional_property("KeyName", props.key_name)
            .with_property("Monitoring", props.detailed_monitoring)
            .with_property(
                "SecurityGroupIds",
                json!([Value::from(props.security_group.security_group_id())]),
            )
            .with_property("SubnetId", subnet.subnet_id())
            .with_property("Tags", json!([{ "Key": "Name", "Value": name }]))
            .with_property("UserData", fn_base64(props.user_data.content()));

        if let Some(role) = props.role {
            let profile = role.instance_profile(stack, id)?;
            resource.set_property("IamInstanceProfile", profile);
            resource.add_dependency(role.logical_id());
        }
        // Instances in private subnets need the egress route before booting
        resource.add_dependency(subnet.default_route_id.clone());

        stack.add_resource(resource)?;

        tracing::debug!(
            instance = %id,
            logical_id = %logical_id,
            subnet_type = %props.subnet_type,
            "Declared instance"
        );

        Ok(Self {
            id: id.to_string(),
            logical_id,
            subnet_type: props.subnet_type,
            user_data: props.user_data,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn subnet_type(&self) -> SubnetType {
        self.subnet_type
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub fn instance_id(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    pub fn private_ip(&self) -> Reference {
        Reference::get_att(&self.logical_id, "PrivateIp")
    }

    pub fn private_dns_name(&self) -> Reference {
        Reference::get_att(&self.logical_id, "PrivateDnsName")
    }

    /// Only meaningful for instances in public subnets
    pub fn public_ip(&self) -> Reference {
        Reference::get_att(&self.logical_id, "PublicIp")
    }
}
