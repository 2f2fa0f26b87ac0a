//! Protection marker lookup through pull request labels

use async_trait::async_trait;
use fluxpreview_kube::{ProtectionError, ProtectionLookup};
use serde::Deserialize;

use crate::client::GitHubClient;

#[derive(Deserialize)]
struct Label {
    name: String,
}

/// Protected when the pull request carries `label`
#[derive(Debug, Clone)]
pub struct GitHubProtectionLookup {
    client: Option<GitHubClient>,
    label: String,
}

impl GitHubProtectionLookup {
    /// Without a client every lookup reports `MissingToken`
    pub fn new(client: Option<GitHubClient>, label: impl Into<String>) -> Self {
        Self {
            client,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ProtectionLookup for GitHubProtectionLookup {
    async fn has_marker(&self, subject_id: u64) -> Result<bool, ProtectionError> {
        let client = self.client.as_ref().ok_or(ProtectionError::MissingToken)?;
        let labels: Vec<Label> = client
            .get_json(&format!("issues/{}/labels?per_page=100", subject_id))
            .await
            .map_err(|e| ProtectionError::Lookup(e.to_string()))?;
        Ok(labels.iter().any(|l| l.name == self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxpreview_core::GitHubSettings;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn lookup_with(status: u16, body: serde_json::Value) -> (MockServer, GitHubProtectionLookup) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/issues/42/labels"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        let settings = GitHubSettings {
            api_url: server.uri(),
            graphql_url: format!("{}/graphql", server.uri()),
            repository: Some("acme/shop".to_string()),
        };
        let client = GitHubClient::new(&settings, Some("t")).unwrap();
        (server, GitHubProtectionLookup::new(Some(client), "preview:keep"))
    }

    #[tokio::test]
    async fn test_label_present() {
        let (_server, lookup) =
            lookup_with(200, serde_json::json!([{"name": "bug"}, {"name": "preview:keep"}])).await;
        assert!(lookup.has_marker(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_label_absent() {
        let (_server, lookup) = lookup_with(200, serde_json::json!([{"name": "bug"}])).await;
        assert!(!lookup.has_marker(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_lookup_error() {
        let (_server, lookup) =
            lookup_with(502, serde_json::json!({"message": "Server Error"})).await;
        let err = lookup.has_marker(42).await.unwrap_err();
        assert!(matches!(err, ProtectionError::Lookup(m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_without_token() {
        let lookup = GitHubProtectionLookup::new(None, "preview:keep");
        assert!(matches!(
            lookup.has_marker(42).await,
            Err(ProtectionError::MissingToken)
        ));
    }
}
