//! Node boot payloads
//!
//! Payloads are tera templates with named slots. Rendering is pure: a
//! template and a parameter record in, a new string out.

use crate::error::{ClusterError, Result};
use k3sflow_cloud_aws::Instance;
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

/// Bundled control-plane payload (`{{ token }}`, `{{ api_port }}`)
pub const CONTROL_PLANE_TEMPLATE: &str = include_str!("../assets/user-data-cp.sh");

/// Bundled agent payload (`{{ token }}`, `{{ server_address }}`, `{{ api_port }}`)
pub const AGENT_TEMPLATE: &str = include_str!("../assets/user-data-agent.sh");

#[derive(Debug, Clone, Serialize)]
pub struct ControlPlaneBootParams<'a> {
    pub token: &'a str,
    pub api_port: u16,
}

/// Agent slots.
///
/// Built from the declared control-plane [`Instance`], so agents cannot be
/// rendered before the control plane exists.
#[derive(Debug, Clone, Serialize)]
pub struct AgentBootParams<'a> {
    pub token: &'a str,
    /// Reference token for the control plane's private address
    pub server_address: String,
    pub api_port: u16,
}

impl<'a> AgentBootParams<'a> {
    pub fn new(token: &'a str, control_plane: &Instance, api_port: u16) -> Self {
        Self {
            token,
            server_address: control_plane.private_ip().to_token_string(),
            api_port,
        }
    }
}

pub fn render_control_plane(template: &str, params: &ControlPlaneBootParams<'_>) -> Result<String> {
    render(template, params)
}

pub fn render_agent(template: &str, params: &AgentBootParams<'_>) -> Result<String> {
    render(template, params)
}

fn render<T: Serialize>(template: &str, params: &T) -> Result<String> {
    let context = Context::from_serialize(params)
        .map_err(|e| ClusterError::TemplateRenderError(extract_tera_error_detail(&e)))?;
    let mut tera = Tera::default();
    tera.render_str(template, &context)
        .map_err(|e| ClusterError::TemplateRenderError(extract_tera_error_detail(&e)))
}

/// Read a template override, or fall back to the bundled one
pub fn load_template(path: Option<&Path>, bundled: &str) -> Result<String> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ClusterError::IoError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            // Surface syntax errors against the file rather than at render time
            let mut tera = Tera::default();
            tera.add_raw_template("boot", &content)
                .map_err(|e| ClusterError::TemplateError {
                    file: path.to_path_buf(),
                    message: extract_tera_error_detail(&e),
                })?;
            tracing::debug!(path = %path.display(), "Loaded boot template");
            Ok(content)
        }
        None => Ok(bundled.to_string()),
    }
}

/// Flatten tera's error chain into one message
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        return format!(
            "Unknown slot: `{}`\nHint: boot templates may use token, api_port and (agents) server_address",
            &full_error[start + 10..start + end]
        );
    }
    full_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_control_plane() {
        let out = render_control_plane(
            CONTROL_PLANE_TEMPLATE,
            &ControlPlaneBootParams {
                token: "abc123",
                api_port: 6443,
            },
        )
        .unwrap();
        assert!(out.contains(r#"K3S_TOKEN="abc123""#));
        assert!(out.contains("--https-listen-port 6443"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_render_is_pure() {
        let params = ControlPlaneBootParams {
            token: "one",
            api_port: 6443,
        };
        let first = render_control_plane("t={{ token }}", &params).unwrap();
        let second = render_control_plane("t={{ token }}", &params).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "t=one");
    }

    #[test]
    fn test_reference_token_passes_through() {
        let params = AgentBootParams {
            token: "abc123",
            server_address: "${Token[GetAtt:Cp.PrivateIp]}".to_string(),
            api_port: 6443,
        };
        let out = render_agent(AGENT_TEMPLATE, &params).unwrap();
        assert!(out.contains("K3S_URL=\"https://${Token[GetAtt:Cp.PrivateIp]}:6443\""));
    }

    #[test]
    fn test_unknown_slot_is_error() {
        let params = ControlPlaneBootParams {
            token: "abc123",
            api_port: 6443,
        };
        let err = render_control_plane("{{ server_address }}", &params).unwrap_err();
        assert!(err.to_string().contains("server_address"));
    }

    #[test]
    fn test_load_template_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "echo {{{{ token }}}}").unwrap();
        let content = load_template(Some(file.path()), AGENT_TEMPLATE).unwrap();
        assert_eq!(content, "echo {{ token }}");
        assert_eq!(load_template(None, AGENT_TEMPLATE).unwrap(), AGENT_TEMPLATE);
    }

    #[test]
    fn test_load_template_syntax_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "echo {{{{ token").unwrap();
        assert!(matches!(
            load_template(Some(file.path()), AGENT_TEMPLATE),
            Err(ClusterError::TemplateError { .. })
        ));
    }
}
