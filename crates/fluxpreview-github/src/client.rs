//! Authenticated GitHub REST and GraphQL client

use std::time::Duration;

use fluxpreview_core::GitHubSettings;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{GitHubError, Result};

const USER_AGENT: &str = concat!("fluxpreview/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Client bound to one repository
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    graphql_url: Url,
    token: String,
    owner: String,
    repo: String,
}

#[derive(serde::Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(serde::Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

impl GitHubClient {
    /// Create a client; a missing or empty token is `MissingToken`
    pub fn new(settings: &GitHubSettings, token: Option<&str>) -> Result<Self> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(GitHubError::MissingToken)?;
        let (owner, repo) = settings.owner_and_repo()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_url: Url::parse(&settings.api_url)?,
            graphql_url: Url::parse(&settings.graphql_url)?,
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `{api}/repos/{owner}/{repo}/{path}`
    fn repo_url(&self, path: &str) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        let url = format!(
            "{}/repos/{}/{}/{}",
            base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&url)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN
                && response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .is_some_and(|v| v.as_bytes() == b"0"));
        if rate_limited {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            tracing::warn!(retry_after, "GitHub rate limit hit");
            return Err(GitHubError::RateLimited { retry_after });
        }

        let url = response.url().path().to_string();
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| format!("request to {} failed", url));
        Err(GitHubError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// GET a repository-scoped REST path
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.repo_url(path)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.repo_url(path)?;
        let response = self
            .send(self.request(Method::POST, url).json(body))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.repo_url(path)?;
        let response = self
            .send(self.request(Method::PATCH, url).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// Run a GraphQL document; any reported error fails the call
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self
            .send(
                self.request(Method::POST, self.graphql_url.clone())
                    .json(&body),
            )
            .await?;
        let parsed: GraphQlResponse<T> = response.json().await?;

        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(GitHubError::GraphQl(messages.join("; ")));
        }
        parsed
            .data
            .ok_or_else(|| GitHubError::GraphQl("response has no data".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> GitHubSettings {
        GitHubSettings {
            api_url: server.uri(),
            graphql_url: format!("{}/graphql", server.uri()),
            repository: Some("acme/shop".to_string()),
        }
    }

    #[test]
    fn test_missing_token() {
        let settings = GitHubSettings {
            repository: Some("acme/shop".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            GitHubClient::new(&settings, None),
            Err(GitHubError::MissingToken)
        ));
        assert!(matches!(
            GitHubClient::new(&settings, Some("  ")),
            Err(GitHubError::MissingToken)
        ));
    }

    #[test]
    fn test_repository_required() {
        let err = GitHubClient::new(&GitHubSettings::default(), Some("t")).unwrap_err();
        assert!(err.to_string().contains("GITHUB_REPOSITORY"));
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/issues/3/labels"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "bug"}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&settings(&server), Some("s3cret")).unwrap();
        let labels: serde_json::Value = client.get_json("issues/3/labels").await.unwrap();
        assert_eq!(labels[0]["name"], "bug");
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(&settings(&server), Some("t")).unwrap();
        let err = client
            .get_json::<serde_json::Value>("issues/99/labels")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "GitHub API error: 404 - Not Found");
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("retry-after", "30"),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(&settings(&server), Some("t")).unwrap();
        let err = client
            .get_json::<serde_json::Value>("issues/1/labels")
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::RateLimited { retry_after: 30 }));
    }

    #[tokio::test]
    async fn test_graphql_errors_fail_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(serde_json::json!({"variables": {"id": "IC_1"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{"message": "Could not resolve to a node with the global id of 'IC_1'"}]
            })))
            .mount(&server)
            .await;

        let client = GitHubClient::new(&settings(&server), Some("t")).unwrap();
        let err = client
            .graphql::<serde_json::Value>("mutation { x }", serde_json::json!({"id": "IC_1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::GraphQl(m) if m.contains("IC_1")));
    }
}
