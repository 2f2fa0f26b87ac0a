//! fluxpreview configuration
//!
//! Read from `fluxpreview.yaml` (or an explicit path), then overridden by
//! environment variables. Credentials are never part of the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "fluxpreview.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Namespace holding the Flux resources
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Field manager for server-side apply
    #[serde(default = "default_field_manager")]
    pub field_manager: String,

    /// How long to wait for readiness
    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    /// How long to wait for deleted resources to disappear
    #[serde(default = "default_delete_timeout", with = "humantime_serde")]
    pub delete_timeout: Duration,

    /// Pull request label that protects a preview from cleanup
    #[serde(default = "default_protection_label")]
    pub protection_label: String,

    /// GitHub endpoints and repository
    #[serde(default)]
    pub github: GitHubSettings,
}

fn default_namespace() -> String {
    "flux-system".to_string()
}

fn default_field_manager() -> String {
    "fluxpreview".to_string()
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_delete_timeout() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_protection_label() -> String {
    "preview:keep".to_string()
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            field_manager: default_field_manager(),
            ready_timeout: default_ready_timeout(),
            delete_timeout: default_delete_timeout(),
            protection_label: default_protection_label(),
            github: GitHubSettings::default(),
        }
    }
}

/// GitHub endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// `owner/repo`
    #[serde(default)]
    pub repository: Option<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            graphql_url: default_graphql_url(),
            repository: None,
        }
    }
}

impl GitHubSettings {
    /// Split `owner/repo`
    pub fn owner_and_repo(&self) -> Result<(&str, &str)> {
        let repository = self
            .repository
            .as_deref()
            .ok_or_else(|| CoreError::InvalidConfig {
                message: "GitHub repository is not set (use GITHUB_REPOSITORY)".to_string(),
            })?;
        match repository.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok((owner, repo))
            }
            _ => Err(CoreError::InvalidConfig {
                message: format!("GitHub repository '{}' is not owner/repo", repository),
            }),
        }
    }
}

impl PreviewConfig {
    /// Load from `path`, or from `fluxpreview.yaml` when present, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests)
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ns) = lookup("FLUXPREVIEW_NAMESPACE") {
            self.namespace = ns;
        }
        if let Some(repo) = lookup("GITHUB_REPOSITORY") {
            self.github.repository = Some(repo);
        }
        if let Some(url) = lookup("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(url) = lookup("GITHUB_GRAPHQL_URL") {
            self.github.graphql_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "namespace must not be empty".to_string(),
            });
        }
        if self.field_manager.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "fieldManager must not be empty".to_string(),
            });
        }
        if self.ready_timeout.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "readyTimeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
