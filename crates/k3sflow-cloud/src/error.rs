//! Construct and synthesis error types

use thiserror::Error;

/// Errors raised while declaring or synthesizing stacks
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Duplicate logical id '{logical_id}' in stack {stack}")]
    DuplicateLogicalId { stack: String, logical_id: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Stack {stack} references undeclared target '{target}'")]
    UnresolvedReference { stack: String, target: String },

    #[error("Stack already exists: {0}")]
    DuplicateStack(String),

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("Dependency cycle between stacks: {0}")]
    DependencyCycle(String),

    #[error("Stack {consumer} imports '{export}' from {producer} but does not depend on it")]
    MissingDependency {
        consumer: String,
        producer: String,
        export: String,
    },

    #[error("Stack {stack} depends on {dependency}, which is not part of the selection")]
    DependencyNotSelected { stack: String, dependency: String },

    #[error("Export name '{0}' is declared more than once")]
    DuplicateExport(String),

    #[error("Stack {consumer} imports '{export}' which no stack exports")]
    UnknownExport { consumer: String, export: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Assembly error: {0}")]
    AssemblyError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
