//! EC2 key pairs imported from public key material

use crate::error::{AwsError, Result};
use k3sflow_cloud::{Reference, Stack};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    Rsa,
    #[default]
    Ed25519,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "rsa"),
            KeyType::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl FromStr for KeyType {
    type Err = AwsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rsa" => Ok(KeyType::Rsa),
            "ed25519" => Ok(KeyType::Ed25519),
            other => Err(AwsError::InvalidConfig(format!(
                "Unknown key type: {} (expected rsa or ed25519)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyPairProps {
    pub key_name: String,
    pub key_type: KeyType,
    pub public_key_material: String,
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    logical_id: String,
    key_name: String,
}

impl KeyPair {
    pub fn new(stack: &mut Stack, id: &str, props: KeyPairProps) -> Result<Self> {
        if props.key_name.is_empty() || props.key_name.len() > 255 {
            return Err(AwsError::InvalidName(format!(
                "key pair name must be 1-255 characters: {:?}",
                props.key_name
            )));
        }
        let material = props.public_key_material.trim();
        if material.is_empty() {
            return Err(AwsError::InvalidConfig(format!(
                "key pair {} has no public key material",
                props.key_name
            )));
        }

        let resource = stack
            .new_resource(&[id], "AWS::EC2::KeyPair")
            .with_property("KeyName", props.key_name.as_str())
            .with_property("KeyType", props.key_type.to_string())
            .with_property("PublicKeyMaterial", material);
        let logical_id = resource.logical_id.clone();
        stack.add_resource(resource)?;

        Ok(Self {
            logical_id,
            key_name: props.key_name,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// `Ref` of a key pair resolves to its name
    pub fn key_name(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    pub fn declared_name(&self) -> &str {
        &self.key_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k3sflow_cloud::Environment;
    use serde_json::json;

    #[test]
    fn test_key_pair_properties() {
        let mut stack = Stack::new("Test", Environment::default());
        let key = KeyPair::new(
            &mut stack,
            "k3s-keypair",
            KeyPairProps {
                key_name: "k3s-keypair".into(),
                key_type: KeyType::Ed25519,
                public_key_material: "ssh-ed25519 AAAA test\n".into(),
            },
        )
        .unwrap();

        let res = stack.resource(key.logical_id()).unwrap();
        assert_eq!(res.property("KeyType"), Some(&json!("ed25519")));
        assert_eq!(res.property("PublicKeyMaterial"), Some(&json!("ssh-ed25519 AAAA test")));
        assert_eq!(key.key_name(), Reference::to_ref(key.logical_id()));
    }

    #[test]
    fn test_empty_material_rejected() {
        let mut stack = Stack::new("Test", Environment::default());
        let result = KeyPair::new(
            &mut stack,
            "kp",
            KeyPairProps {
                key_name: "kp".into(),
                key_type: KeyType::Rsa,
                public_key_material: "  ".into(),
            },
        );
        assert!(matches!(result, Err(AwsError::InvalidConfig(_))));
    }

    #[test]
    fn test_key_type_parse() {
        assert_eq!("ed25519".parse::<KeyType>().unwrap(), KeyType::Ed25519);
        assert!("dsa".parse::<KeyType>().is_err());
    }
}
