//! Cluster API seam
//!
//! Everything the watcher and lifecycle manager need from the cluster goes
//! through `ClusterApi`, implemented by `KubeClusterApi` for real clusters and
//! `MockClusterApi` for tests. Watches are channels of `WatchSignal`s with an
//! explicit cancel handle, so a deliberate teardown is never mistaken for a
//! dropped connection.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use fluxpreview_core::{LabelSelector, ResourceDescriptor};
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::resource::ManagedResource;

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// What a subscription can deliver
#[derive(Debug)]
pub enum WatchSignal {
    /// A change to a watched object
    Event(WatchEventType, ManagedResource),
    /// The transport failed or the server closed the stream
    Disconnected(String),
    /// The subscription was torn down by its owner
    Cancelled,
}

/// Deletion propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Background,
    Foreground,
}

/// Label and field filters for list calls
#[derive(Debug, Clone, Default)]
pub struct ListSelector {
    pub labels: Option<LabelSelector>,
    pub fields: Option<String>,
    pub limit: Option<u32>,
}

impl ListSelector {
    /// Everything in the namespace
    pub fn all() -> Self {
        Self::default()
    }

    pub fn labels(selector: LabelSelector) -> Self {
        Self {
            labels: Some(selector),
            ..Default::default()
        }
    }

    /// Exactly one object by name
    pub fn name(name: &str) -> Self {
        Self {
            fields: Some(name_field_selector(name)),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// `metadata.name=<name>` field selector
pub fn name_field_selector(name: &str) -> String {
    format!("metadata.name={}", name)
}

/// Tears a subscription down exactly once
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelHandle {
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Run the teardown; later calls are no-ops
    pub fn cancel(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            self.cancelled.store(true, Ordering::SeqCst);
            on_cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A live watch
pub struct Subscription {
    rx: mpsc::Receiver<WatchSignal>,
    cancel: CancelHandle,
    closed: bool,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<WatchSignal>, cancel: CancelHandle) -> Self {
        Self {
            rx,
            cancel,
            closed: false,
        }
    }

    /// Next signal; a closed channel reads as `Disconnected` unless we cancelled it
    pub async fn recv(&mut self) -> WatchSignal {
        futures::StreamExt::next(self)
            .await
            .unwrap_or_else(|| WatchSignal::Disconnected("watch stream closed".to_string()))
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = WatchSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        if self.cancel.is_cancelled() {
            self.closed = true;
            return Poll::Ready(Some(WatchSignal::Cancelled));
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(signal)) => Poll::Ready(Some(signal)),
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(Some(WatchSignal::Disconnected(
                    "watch stream closed".to_string(),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Operations against namespaced Flux custom resources
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Point read; a missing object is `KubeError::NotFound`
    async fn get(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
    ) -> Result<ManagedResource>;

    /// List by label and/or field selector
    async fn list(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        selector: &ListSelector,
    ) -> Result<Vec<ManagedResource>>;

    /// Open a watch, optionally filtered by a field selector
    async fn watch(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        field_selector: Option<&str>,
    ) -> Result<Subscription>;

    /// Server-side apply, forcing ownership of the fields we manage
    async fn apply(&self, resource: &ManagedResource, field_manager: &str)
    -> Result<ManagedResource>;

    /// Delete one object
    async fn delete(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
        propagation: Propagation,
    ) -> Result<()>;
}
