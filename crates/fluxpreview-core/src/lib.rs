//! fluxpreview core - shared types for preview environment automation
//!
//! This crate provides the pure, cluster-independent building blocks:
//! - `ResourceDescriptor`: Fully-qualified Flux resource types and the short-reference resolver
//! - `CorrelationKey`: Label-based grouping of a Kustomization with its OCIRepository
//! - `age`: Resource age computation and compact formatting
//! - `PreviewConfig`: Namespace, timeouts, and GitHub settings

pub mod age;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod labels;

pub use age::{compute_age, compute_age_at, format_age, parse_age_threshold};
pub use config::{GitHubSettings, PreviewConfig};
pub use descriptor::{KUSTOMIZATION, OCI_REPOSITORY, ResourceDescriptor, ResourceRef, resolve};
pub use error::{CoreError, Result};
pub use labels::{CorrelationKey, LabelSelector, subject_id_from_reference};
