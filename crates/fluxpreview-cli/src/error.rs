//! CLI error types with exit code handling
//!
//! Library errors are folded into a small set of variants, each with its own
//! exit code, so a CI step can tell a timeout from a typo.

use fluxpreview_core::CoreError;
use fluxpreview_github::GitHubError;
use fluxpreview_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Malformed input or configuration
    #[error("{message}")]
    #[diagnostic(code(fluxpreview::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(fluxpreview::not_found))]
    NotFound { message: String },

    #[error("{message}")]
    #[diagnostic(code(fluxpreview::permission_denied))]
    PermissionDenied {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Readiness or deletion deadline exceeded
    #[error("{message}")]
    #[diagnostic(code(fluxpreview::timeout))]
    Timeout { message: String },

    #[error("Kubernetes error: {message}")]
    #[diagnostic(code(fluxpreview::kube))]
    Kube { message: String },

    #[error("GitHub error: {message}")]
    #[diagnostic(code(fluxpreview::github))]
    GitHub { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(fluxpreview::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(fluxpreview::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::PermissionDenied { .. } => exit_codes::PERMISSION_DENIED,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Kube { .. } | CliError::GitHub { .. } | CliError::Internal { .. } => {
                exit_codes::ERROR
            }
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::from(e),
            other => CliError::input(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Input(core) => CliError::from(core),
            KubeError::NotFound { .. } => CliError::NotFound {
                message: err.to_string(),
            },
            KubeError::PermissionDenied {
                ref verb,
                ref resource,
                ref namespace,
            } => CliError::PermissionDenied {
                message: format!(
                    "permission denied: cannot {} {} in namespace '{}'",
                    verb, resource, namespace
                ),
                help: Some(format!(
                    "grant '{}' on {} to the CI service account",
                    verb, resource
                )),
            },
            KubeError::Timeout { .. } => CliError::Timeout {
                message: err.to_string(),
            },
            KubeError::InvalidResource(message) => CliError::input(message),
            KubeError::Io(e) => CliError::from(e),
            other => CliError::Kube {
                message: other.to_string(),
            },
        }
    }
}

impl From<GitHubError> for CliError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::MissingToken => CliError::input_with_help(
                "no GitHub token configured",
                "set GITHUB_TOKEN or pass --github-token",
            ),
            GitHubError::Input(core) => CliError::from(core),
            GitHubError::InvalidConfig(message) => CliError::input(message),
            GitHubError::Status { status: 403, .. } => CliError::PermissionDenied {
                message: err.to_string(),
                help: Some("the token needs write access to pull requests".to_string()),
            },
            other => CliError::GitHub {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_input_errors_exit_2() {
        let err = CliError::from(KubeError::Input(CoreError::InvalidReference {
            reference: "bad".to_string(),
        }));
        assert_eq!(err.exit_code(), exit_codes::INPUT_ERROR);
        assert!(err.to_string().contains("expected <type>/<name>"));
    }

    #[test]
    fn test_timeout_keeps_pending_detail() {
        let err = CliError::from(KubeError::timeout(
            "Kustomization/pr-1 in namespace 'flux-system'",
            Duration::from_secs(300),
            Vec::new(),
            Some("gave up after 5 retries".to_string()),
        ));
        assert_eq!(err.exit_code(), exit_codes::TIMEOUT);
        assert!(err.to_string().contains("gave up after 5 retries"));
    }

    #[test]
    fn test_permission_denied_has_help() {
        let err = CliError::from(KubeError::PermissionDenied {
            verb: "list".to_string(),
            resource: "kustomizations.kustomize.toolkit.fluxcd.io".to_string(),
            namespace: "flux-system".to_string(),
        });
        assert_eq!(err.exit_code(), exit_codes::PERMISSION_DENIED);
        match err {
            CliError::PermissionDenied { help: Some(help), .. } => assert!(help.contains("grant 'list'")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_token_is_input_error() {
        let err = CliError::from(GitHubError::MissingToken);
        assert_eq!(err.exit_code(), exit_codes::INPUT_ERROR);
    }
}
