//! fluxpreview kube - Flux resource lifecycle for preview environments
//!
//! This crate provides:
//! - **Cluster API seam**: `ClusterApi` over `kube::Api<DynamicObject>`, with an in-memory mock
//! - **Readiness Watcher**: Block until Flux reports `Ready`, with bounded retry of dropped watches
//! - **Lifecycle Manager**: Apply, discover by label, delete idempotently, clean up stale previews
//! - **Protection**: Fail-open lookup of a "keep" marker before bulk deletion
//! - **Manifests**: Multi-document YAML into applicable resources

pub mod api;
pub mod client;
pub mod error;
pub mod lifecycle;
pub mod manifest;
pub mod mock;
pub mod protection;
pub mod resource;
pub mod watcher;

pub use api::{
    CancelHandle, ClusterApi, ListSelector, Propagation, Subscription, WatchEventType, WatchSignal,
};
pub use client::KubeClusterApi;
pub use error::{KubeError, Result};
pub use lifecycle::{
    CleanupOptions, DeleteOutcome, DeletedResource, DiscoveredResources, LifecycleManager,
    SkipReason, SkippedResource, TeardownOptions, TeardownOutcome,
};
pub use manifest::parse_manifests;
pub use mock::{MockClusterApi, OperationCounts, WatchScript};
pub use protection::{NoProtection, ProtectionError, ProtectionLookup};
pub use resource::{ManagedResource, ReadinessResult, ReadyStatus};
pub use watcher::{ReadinessQuery, ReadinessWatcher, RetryPolicy};
