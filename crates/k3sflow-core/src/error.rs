use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {path}\nReason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {file}\nReason: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("Template render error: {0}")]
    TemplateRenderError(String),

    #[error("Join token is not set\nHint: export K3S_TOKEN or set join-token in the cluster file")]
    MissingJoinToken,

    #[error(transparent)]
    Aws(#[from] k3sflow_cloud_aws::AwsError),

    #[error(transparent)]
    Cloud(#[from] k3sflow_cloud::CloudError),

    #[error(transparent)]
    Config(#[from] k3sflow_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
