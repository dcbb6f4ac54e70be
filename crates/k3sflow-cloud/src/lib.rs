//! k3sflow construct engine
//!
//! Declares resources into stacks, validates references between them and
//! synthesizes CloudFormation templates that an external provisioning engine
//! applies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  k3sflow CLI                     │
//! │            (k3sflow synth / diff)                │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                k3sflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   App ─► Stack ─► Resource / Reference    │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Template   │  │  Plan / diff │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ k3sflow-cloud │ │   assembly    │
//! │     -aws      │ │  k3sflow.out  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod app;
pub mod assembly;
pub mod error;
pub mod resource;
pub mod stack;
pub mod template;
pub mod token;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary, plan_assembly};
pub use app::{App, CloudAssembly, SynthesizedStack};
pub use assembly::{AssemblyLock, AssemblyManager, DEFAULT_OUT_DIR, Manifest};
pub use error::{CloudError, Result};
pub use resource::{Resource, digest_hex, logical_id};
pub use stack::{Environment, ExportRef, Output, Stack, StackDependency};
pub use template::{Template, TemplateParameter, TemplateResource};
pub use token::Reference;
