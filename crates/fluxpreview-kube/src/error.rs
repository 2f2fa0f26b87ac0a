//! Error types for fluxpreview-kube
//!
//! Status codes are captured once, when a `kube::Error` crosses the
//! `ClusterApi` boundary, so callers never probe error strings.

use std::time::Duration;

use fluxpreview_core::{CoreError, ResourceDescriptor};
use thiserror::Error;

use crate::resource::ReadinessResult;

/// Result type for fluxpreview-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// The object does not exist (404)
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// The caller lacks a capability (403)
    #[error("permission denied: cannot {verb} {resource} in namespace '{namespace}'\nHint: grant '{verb}' on {resource} to the CI service account")]
    PermissionDenied {
        verb: String,
        resource: String,
        namespace: String,
    },

    /// Any other API status response
    #[error("Kubernetes API error ({code} {reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// Transport, configuration, or decoding failure inside the client
    #[error("Kubernetes client error: {0}")]
    Client(#[from] kube::Error),

    /// Deadline exceeded; `pending` lists what was still not ready
    #[error("timed out after {elapsed:?} waiting for {what}{detail}")]
    Timeout {
        what: String,
        elapsed: Duration,
        detail: String,
        pending: Vec<ReadinessResult>,
    },

    /// The watch transport failed in a way that is not worth retrying
    #[error("watch failed: {0}")]
    WatchFailed(String),

    /// A manifest or object is not a managed Flux resource
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Malformed input (reference, duration, configuration)
    #[error(transparent)]
    Input(#[from] CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Build a timeout error, optionally naming why the wait gave up early
    pub fn timeout(
        what: impl Into<String>,
        elapsed: Duration,
        pending: Vec<ReadinessResult>,
        reason: Option<String>,
    ) -> Self {
        let mut detail = String::new();
        if let Some(reason) = reason {
            detail.push_str(&format!(" ({})", reason));
        }
        for p in &pending {
            detail.push_str(&format!("\n  - {}/{}: {}", p.kind, p.name, p.message));
        }
        KubeError::Timeout {
            what: what.into(),
            elapsed,
            detail,
            pending,
        }
    }

    /// Translate a client error, attaching the operation context
    pub fn from_client(
        err: kube::Error,
        verb: &str,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: Option<&str>,
    ) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => KubeError::NotFound {
                kind: descriptor.kind.to_string(),
                name: name.unwrap_or_default().to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 403 => KubeError::PermissionDenied {
                verb: verb.to_string(),
                resource: descriptor.to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(resp) => KubeError::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            other => KubeError::Client(other),
        }
    }

    /// HTTP status code, when the failure came from an API response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            KubeError::NotFound { .. } => Some(404),
            KubeError::PermissionDenied { .. } => Some(403),
            KubeError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Whether a retry might succeed (disconnects, throttling, server errors)
    pub fn is_transient(&self) -> bool {
        match self {
            KubeError::Client(_) | KubeError::WatchFailed(_) => true,
            KubeError::Api { code, .. } => matches!(code, 408 | 409 | 410 | 429) || *code >= 500,
            _ => false,
        }
    }
}
