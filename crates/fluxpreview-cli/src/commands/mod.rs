//! CLI commands

pub mod apply;
pub mod check;
pub mod cleanup;
pub mod status;
pub mod teardown;
pub mod wait;

use std::path::Path;
use std::sync::Arc;

use fluxpreview_core::PreviewConfig;
use fluxpreview_github::{GitHubClient, GitHubProtectionLookup};
use fluxpreview_kube::{KubeClusterApi, LifecycleManager, ReadinessWatcher};
use tracing::{debug, warn};

use crate::error::Result;

/// Settings shared by every command
pub struct Context {
    pub config: PreviewConfig,
    pub github_token: Option<String>,
}

impl Context {
    /// File, then environment, then flags
    pub fn load(
        config_path: Option<&Path>,
        namespace: Option<String>,
        github_token: Option<String>,
    ) -> Result<Self> {
        let mut config = PreviewConfig::load(config_path)?.with_env_overrides();
        if let Some(namespace) = namespace {
            config.namespace = namespace;
        }
        config.validate()?;
        debug!(namespace = %config.namespace, "configuration loaded");
        Ok(Self {
            config,
            github_token,
        })
    }

    pub async fn cluster(&self) -> Result<KubeClusterApi> {
        Ok(KubeClusterApi::try_default().await?)
    }

    pub async fn lifecycle(&self) -> Result<LifecycleManager<KubeClusterApi>> {
        Ok(LifecycleManager::new(self.cluster().await?, &self.config.namespace)
            .with_field_manager(&self.config.field_manager))
    }

    pub async fn watcher(&self) -> Result<ReadinessWatcher<KubeClusterApi>> {
        Ok(ReadinessWatcher::new(self.cluster().await?))
    }

    pub fn github(&self) -> Result<GitHubClient> {
        Ok(GitHubClient::new(
            &self.config.github,
            self.github_token.as_deref(),
        )?)
    }

    /// Protection lookup; without a usable client every preview is unprotected
    pub fn protection(&self) -> Arc<GitHubProtectionLookup> {
        let client = match self.github() {
            Ok(client) => Some(client),
            Err(e) => {
                if self.github_token.is_some() {
                    warn!(error = %e, "GitHub client unavailable, protection check disabled");
                }
                None
            }
        };
        Arc::new(GitHubProtectionLookup::new(
            client,
            &self.config.protection_label,
        ))
    }
}
