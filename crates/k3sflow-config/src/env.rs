//! Settings read from the process environment

/// Cluster join token shared by every node
pub const JOIN_TOKEN_VAR: &str = "K3S_TOKEN";
/// Cluster file override
pub const CONFIG_PATH_VAR: &str = "K3SFLOW_CONFIG_PATH";

const ACCOUNT_VARS: &[&str] = &["K3SFLOW_ACCOUNT", "CDK_DEFAULT_ACCOUNT"];
const REGION_VARS: &[&str] = &["K3SFLOW_REGION", "CDK_DEFAULT_REGION", "AWS_REGION"];

/// Values the environment supplies on top of the cluster file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub account: Option<String>,
    pub region: Option<String>,
    pub join_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let overrides = Self {
            account: first_set(ACCOUNT_VARS),
            region: first_set(REGION_VARS),
            join_token: first_set(&[JOIN_TOKEN_VAR]),
        };
        tracing::debug!(
            account = ?overrides.account,
            region = ?overrides.region,
            join_token_set = overrides.join_token.is_some(),
            "Read environment overrides"
        );
        overrides
    }
}

/// First non-empty variable among `names`
fn first_set(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_primary_variables_win() {
        temp_env::with_vars(
            [
                ("K3SFLOW_ACCOUNT", Some("111111111111")),
                ("CDK_DEFAULT_ACCOUNT", Some("222222222222")),
                ("K3SFLOW_REGION", Some("ap-northeast-1")),
                ("K3S_TOKEN", Some("abc123")),
            ],
            || {
                let env = EnvOverrides::from_env();
                assert_eq!(env.account.as_deref(), Some("111111111111"));
                assert_eq!(env.region.as_deref(), Some("ap-northeast-1"));
                assert_eq!(env.join_token.as_deref(), Some("abc123"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_fallback_variables() {
        temp_env::with_vars(
            [
                ("K3SFLOW_ACCOUNT", None),
                ("CDK_DEFAULT_ACCOUNT", Some("222222222222")),
                ("K3SFLOW_REGION", Some("")),
                ("CDK_DEFAULT_REGION", None),
                ("AWS_REGION", Some("us-east-1")),
                ("K3S_TOKEN", None),
            ],
            || {
                let env = EnvOverrides::from_env();
                assert_eq!(env.account.as_deref(), Some("222222222222"));
                assert_eq!(env.region.as_deref(), Some("us-east-1"));
                assert_eq!(env.join_token, None);
            },
        );
    }
}
