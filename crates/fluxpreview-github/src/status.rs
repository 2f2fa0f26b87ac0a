//! Pull request status comments
//!
//! Each status comment starts with a hidden marker naming the workflow and the
//! revision it reports on. Publishing keeps at most one visible comment per
//! (pull request, workflow): comments for other revisions are minimized as
//! outdated, and the comment for the current revision is edited in place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::GitHubClient;
use crate::error::{GitHubError, Result};

const MARKER_OPEN: &str = "<!-- fluxpreview-status";
const MARKER_CLOSE: &str = "-->";

/// Identity embedded in a status comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMarker {
    pub workflow: String,
    pub revision: String,
}

impl ArtifactMarker {
    pub fn new(workflow: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            revision: revision.into(),
        }
    }

    /// Hidden HTML comment; quotes and `--` are replaced so the marker stays parseable
    pub fn render(&self) -> String {
        format!(
            "{} workflow=\"{}\" revision=\"{}\" {}",
            MARKER_OPEN,
            escape(&self.workflow),
            escape(&self.revision),
            MARKER_CLOSE
        )
    }

    /// Read the marker from a comment body, if it has one
    pub fn parse(body: &str) -> Option<Self> {
        let start = body.find(MARKER_OPEN)? + MARKER_OPEN.len();
        let end = start + body[start..].find(MARKER_CLOSE)?;
        let attrs = &body[start..end];
        Some(Self {
            workflow: attribute(attrs, "workflow")?,
            revision: attribute(attrs, "revision")?,
        })
    }
}

fn escape(value: &str) -> String {
    let mut escaped = value.replace('"', "'");
    while escaped.contains("--") {
        escaped = escaped.replace("--", "-");
    }
    escaped
}

fn attribute(attrs: &str, key: &str) -> Option<String> {
    let needle = format!("{}=\"", key);
    let start = attrs.find(&needle)? + needle.len();
    let len = attrs[start..].find('"')?;
    Some(attrs[start..start + len].to_string())
}

/// A comment on the pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusArtifact {
    /// GraphQL node id
    pub node_id: String,
    /// REST id
    pub id: u64,
    pub url: String,
    pub body: String,
    pub is_minimized: bool,
}

impl StatusArtifact {
    pub fn marker(&self) -> Option<ArtifactMarker> {
        ArtifactMarker::parse(&self.body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishAction {
    Created,
    Updated,
}

/// What `publish` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub id: u64,
    pub url: String,
    pub action: PublishAction,
    /// Older comments hidden during this publish
    pub minimized: usize,
}

/// Comment operations on one repository's pull requests
#[async_trait]
pub trait StatusArtifactApi: Send + Sync {
    /// Every comment on the pull request, including minimized ones
    async fn list(&self, subject_id: u64) -> Result<Vec<StatusArtifact>>;

    async fn create(&self, subject_id: u64, body: &str) -> Result<StatusArtifact>;

    async fn update(&self, artifact: &StatusArtifact, body: &str) -> Result<StatusArtifact>;

    /// Hide a comment as outdated
    async fn minimize(&self, artifact: &StatusArtifact) -> Result<()>;
}

/// Keeps one live status comment per (pull request, workflow)
pub struct StatusArtifactManager<A: StatusArtifactApi> {
    api: A,
}

impl<A: StatusArtifactApi> StatusArtifactManager<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Publish `body` as the status of `revision`
    ///
    /// Minimizing older comments is best effort; failures are logged and the
    /// publish continues.
    pub async fn publish(
        &self,
        subject_id: u64,
        workflow: &str,
        revision: &str,
        body: &str,
    ) -> Result<PublishedArtifact> {
        let wanted = ArtifactMarker::new(escape(workflow), escape(revision));
        let rendered = format!("{}\n{}", wanted.render(), body);

        let ours: Vec<(StatusArtifact, ArtifactMarker)> = self
            .api
            .list(subject_id)
            .await?
            .into_iter()
            .filter_map(|a| a.marker().map(|m| (a, m)))
            .filter(|(_, m)| m.workflow == wanted.workflow)
            .collect();
        debug!(subject_id, workflow, existing = ours.len(), "found status comments");

        let current = ours
            .iter()
            .position(|(a, m)| !a.is_minimized && m.revision == wanted.revision);

        let mut minimized = 0;
        for (idx, (artifact, m)) in ours.iter().enumerate() {
            if artifact.is_minimized || Some(idx) == current {
                continue;
            }
            match self.api.minimize(artifact).await {
                Ok(()) => {
                    info!(subject_id, comment = artifact.id, revision = %m.revision, "minimized outdated status");
                    minimized += 1;
                }
                Err(e) => {
                    warn!(subject_id, comment = artifact.id, error = %e, "failed to minimize status comment");
                }
            }
        }

        let (artifact, action) = match current {
            Some(idx) => {
                let updated = self.api.update(&ours[idx].0, &rendered).await?;
                (updated, PublishAction::Updated)
            }
            None => {
                let created = self.api.create(subject_id, &rendered).await?;
                (created, PublishAction::Created)
            }
        };
        info!(subject_id, workflow, comment = artifact.id, ?action, "published status");

        Ok(PublishedArtifact {
            id: artifact.id,
            url: artifact.url,
            action,
            minimized,
        })
    }
}

/// Comments through the GitHub API: GraphQL to list and minimize, REST to write
#[derive(Debug, Clone)]
pub struct GitHubStatusApi {
    client: GitHubClient,
}

const LIST_COMMENTS: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $cursor: String) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      comments(first: 100, after: $cursor) {
        nodes { id databaseId url body isMinimized }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}
"#;

const MINIMIZE_COMMENT: &str = r#"
mutation($id: ID!) {
  minimizeComment(input: { subjectId: $id, classifier: OUTDATED }) {
    minimizedComment { isMinimized }
  }
}
"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_request: Option<PullRequestNode>,
}

#[derive(Deserialize)]
struct PullRequestNode {
    comments: CommentConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentConnection {
    nodes: Vec<CommentNode>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    id: String,
    database_id: u64,
    url: String,
    body: String,
    is_minimized: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RestComment {
    id: u64,
    node_id: String,
    html_url: String,
    body: String,
}

impl From<RestComment> for StatusArtifact {
    fn from(c: RestComment) -> Self {
        StatusArtifact {
            node_id: c.node_id,
            id: c.id,
            url: c.html_url,
            body: c.body,
            is_minimized: false,
        }
    }
}

impl GitHubStatusApi {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusArtifactApi for GitHubStatusApi {
    async fn list(&self, subject_id: u64) -> Result<Vec<StatusArtifact>> {
        let mut artifacts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let variables = serde_json::json!({
                "owner": self.client.owner(),
                "repo": self.client.repo(),
                "number": subject_id,
                "cursor": cursor,
            });
            let data: ListData = self.client.graphql(LIST_COMMENTS, variables).await?;
            let Some(connection) = data
                .repository
                .and_then(|r| r.pull_request)
                .map(|p| p.comments)
            else {
                return Err(GitHubError::Status {
                    status: 404,
                    message: format!("pull request #{} not found", subject_id),
                });
            };

            artifacts.extend(connection.nodes.into_iter().map(|n| StatusArtifact {
                node_id: n.id,
                id: n.database_id,
                url: n.url,
                body: n.body,
                is_minimized: n.is_minimized,
            }));

            match connection.page_info.end_cursor {
                Some(next) if connection.page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }

        Ok(artifacts)
    }

    async fn create(&self, subject_id: u64, body: &str) -> Result<StatusArtifact> {
        let comment: RestComment = self
            .client
            .post_json(
                &format!("issues/{}/comments", subject_id),
                &serde_json::json!({ "body": body }),
            )
            .await?;
        Ok(comment.into())
    }

    async fn update(&self, artifact: &StatusArtifact, body: &str) -> Result<StatusArtifact> {
        let comment: RestComment = self
            .client
            .patch_json(
                &format!("issues/comments/{}", artifact.id),
                &serde_json::json!({ "body": body }),
            )
            .await?;
        Ok(comment.into())
    }

    async fn minimize(&self, artifact: &StatusArtifact) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .graphql(MINIMIZE_COMMENT, serde_json::json!({ "id": artifact.node_id }))
            .await?;
        Ok(())
    }
}
