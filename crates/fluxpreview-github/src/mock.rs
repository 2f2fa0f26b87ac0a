//! In-memory `StatusArtifactApi` for testing

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{GitHubError, Result};
use crate::status::{StatusArtifact, StatusArtifactApi};

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub minimizes: usize,
}

#[derive(Default)]
struct MockState {
    comments: BTreeMap<u64, Vec<StatusArtifact>>,
    next_id: u64,
}

impl MockState {
    fn insert(&mut self, subject_id: u64, body: &str) -> StatusArtifact {
        self.next_id += 1;
        let artifact = StatusArtifact {
            node_id: format!("IC_{}", self.next_id),
            id: self.next_id,
            url: format!(
                "https://github.com/acme/shop/pull/{}#issuecomment-{}",
                subject_id, self.next_id
            ),
            body: body.to_string(),
            is_minimized: false,
        };
        self.comments
            .entry(subject_id)
            .or_default()
            .push(artifact.clone());
        artifact
    }
}

/// Pull request comments kept in memory
#[derive(Clone, Default)]
pub struct MockStatusArtifactApi {
    state: Arc<RwLock<MockState>>,
    operations: Arc<RwLock<OperationCounts>>,
    fail_minimize: Arc<AtomicBool>,
}

impl MockStatusArtifactApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comment without counting an operation
    pub fn seed(&self, subject_id: u64, body: &str) -> StatusArtifact {
        self.state.write().unwrap().insert(subject_id, body)
    }

    /// Make every minimize call fail
    pub fn fail_minimize(&self, fail: bool) {
        self.fail_minimize.store(fail, Ordering::SeqCst);
    }

    pub fn comments(&self, subject_id: u64) -> Vec<StatusArtifact> {
        self.state
            .read()
            .unwrap()
            .comments
            .get(&subject_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Comments that are not minimized
    pub fn live_count(&self, subject_id: u64) -> usize {
        self.comments(subject_id)
            .iter()
            .filter(|c| !c.is_minimized)
            .count()
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }
}

#[async_trait]
impl StatusArtifactApi for MockStatusArtifactApi {
    async fn list(&self, subject_id: u64) -> Result<Vec<StatusArtifact>> {
        self.operations.write().unwrap().lists += 1;
        Ok(self.comments(subject_id))
    }

    async fn create(&self, subject_id: u64, body: &str) -> Result<StatusArtifact> {
        self.operations.write().unwrap().creates += 1;
        Ok(self.state.write().unwrap().insert(subject_id, body))
    }

    async fn update(&self, artifact: &StatusArtifact, body: &str) -> Result<StatusArtifact> {
        self.operations.write().unwrap().updates += 1;
        let mut state = self.state.write().unwrap();
        state
            .comments
            .values_mut()
            .flatten()
            .find(|c| c.id == artifact.id)
            .map(|c| {
                c.body = body.to_string();
                c.clone()
            })
            .ok_or_else(|| GitHubError::Status {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    async fn minimize(&self, artifact: &StatusArtifact) -> Result<()> {
        self.operations.write().unwrap().minimizes += 1;
        if self.fail_minimize.load(Ordering::SeqCst) {
            return Err(GitHubError::GraphQl(
                "Resource not accessible by integration".to_string(),
            ));
        }
        let mut state = self.state.write().unwrap();
        match state
            .comments
            .values_mut()
            .flatten()
            .find(|c| c.node_id == artifact.node_id)
        {
            Some(comment) => {
                comment.is_minimized = true;
                Ok(())
            }
            None => Err(GitHubError::GraphQl(format!(
                "Could not resolve to a node with the global id of '{}'",
                artifact.node_id
            ))),
        }
    }
}
