//! fluxpreview github - pull request integration
//!
//! - `GitHubClient`: bearer-authenticated REST and GraphQL calls scoped to one repository
//! - `StatusArtifactManager`: one live status comment per pull request and workflow
//! - `GitHubProtectionLookup`: the "keep" label check used before bulk cleanup

pub mod client;
pub mod error;
pub mod mock;
pub mod protection;
pub mod status;

pub use client::GitHubClient;
pub use error::{GitHubError, Result};
pub use mock::MockStatusArtifactApi;
pub use protection::GitHubProtectionLookup;
pub use status::{
    ArtifactMarker, GitHubStatusApi, PublishAction, PublishedArtifact, StatusArtifact,
    StatusArtifactApi, StatusArtifactManager,
};
