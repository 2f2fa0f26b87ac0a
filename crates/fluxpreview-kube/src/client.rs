//! `ClusterApi` over a real Kubernetes API server
//!
//! Flux kinds are addressed directly by group/version/plural, so no discovery
//! round-trip is needed. API errors are translated into `KubeError` here and
//! nowhere else.

use async_trait::async_trait;
use fluxpreview_core::ResourceDescriptor;
use futures::StreamExt;
use kube::Client;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PropagationPolicy,
    WatchEvent, WatchParams,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::api::{CancelHandle, ClusterApi, ListSelector, Propagation, Subscription, WatchEventType, WatchSignal};
use crate::error::{KubeError, Result};
use crate::resource::{ManagedResource, api_resource};

/// Buffered signals per subscription
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Cluster access through `kube::Client`
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Connect using the ambient kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing Kubernetes client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api(&self, namespace: &str, descriptor: &ResourceDescriptor) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(descriptor))
    }
}

fn list_params(selector: &ListSelector) -> ListParams {
    let mut params = ListParams::default();
    if let Some(labels) = selector.labels.as_ref().filter(|l| !l.is_empty()) {
        params = params.labels(&labels.to_string());
    }
    if let Some(fields) = &selector.fields {
        params = params.fields(fields);
    }
    if let Some(limit) = selector.limit {
        params = params.limit(limit);
    }
    params
}

fn translate_event(event: WatchEvent<DynamicObject>) -> Option<WatchSignal> {
    match event {
        WatchEvent::Added(obj) => Some(WatchSignal::Event(WatchEventType::Added, obj.into())),
        WatchEvent::Modified(obj) => Some(WatchSignal::Event(WatchEventType::Modified, obj.into())),
        WatchEvent::Deleted(obj) => Some(WatchSignal::Event(WatchEventType::Deleted, obj.into())),
        WatchEvent::Bookmark(_) => None,
        WatchEvent::Error(err) => Some(WatchSignal::Disconnected(format!(
            "watch error ({}): {}",
            err.code, err.message
        ))),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
    ) -> Result<ManagedResource> {
        self.api(namespace, descriptor)
            .get(name)
            .await
            .map(ManagedResource::from)
            .map_err(|e| KubeError::from_client(e, "get", descriptor, namespace, Some(name)))
    }

    async fn list(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        selector: &ListSelector,
    ) -> Result<Vec<ManagedResource>> {
        let list = self
            .api(namespace, descriptor)
            .list(&list_params(selector))
            .await
            .map_err(|e| KubeError::from_client(e, "list", descriptor, namespace, None))?;
        Ok(list.items.into_iter().map(ManagedResource::from).collect())
    }

    async fn watch(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        field_selector: Option<&str>,
    ) -> Result<Subscription> {
        let api = self.api(namespace, descriptor);
        let mut params = WatchParams::default();
        if let Some(fields) = field_selector {
            params = params.fields(fields);
        }

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let (opened_tx, opened_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let stream = match api.watch(&params, "0").await {
                Ok(stream) => {
                    let _ = opened_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            futures::pin_mut!(stream);

            while let Some(item) = stream.next().await {
                let signal = match item {
                    Ok(event) => match translate_event(event) {
                        Some(signal) => signal,
                        None => {
                            trace!("watch bookmark");
                            continue;
                        }
                    },
                    Err(e) => WatchSignal::Disconnected(e.to_string()),
                };
                let terminal = matches!(signal, WatchSignal::Disconnected(_));
                if tx.send(signal).await.is_err() || terminal {
                    return;
                }
            }
            debug!("watch stream ended");
        });

        let abort = task.abort_handle();
        match opened_rx.await {
            Ok(Ok(())) => Ok(Subscription::new(rx, CancelHandle::new(move || abort.abort()))),
            Ok(Err(e)) => Err(KubeError::from_client(e, "watch", descriptor, namespace, None)),
            Err(_) => Err(KubeError::WatchFailed(
                "watch task ended before the stream opened".to_string(),
            )),
        }
    }

    async fn apply(
        &self,
        resource: &ManagedResource,
        field_manager: &str,
    ) -> Result<ManagedResource> {
        let descriptor = resource.descriptor()?;
        let namespace = resource.namespace().ok_or_else(|| {
            KubeError::InvalidResource(format!("{} has no metadata.namespace", resource.key()))
        })?;
        let name = resource.name();
        if name.is_empty() {
            return Err(KubeError::InvalidResource(format!(
                "{} resource is missing metadata.name",
                descriptor.kind
            )));
        }

        let params = PatchParams::apply(field_manager).force();
        self.api(namespace, &descriptor)
            .patch(name, &params, &Patch::Apply(resource.as_dynamic()))
            .await
            .map(ManagedResource::from)
            .map_err(|e| KubeError::from_client(e, "patch", &descriptor, namespace, Some(name)))
    }

    async fn delete(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
        propagation: Propagation,
    ) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(match propagation {
                Propagation::Background => PropagationPolicy::Background,
                Propagation::Foreground => PropagationPolicy::Foreground,
            }),
            ..Default::default()
        };

        self.api(namespace, descriptor)
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| KubeError::from_client(e, "delete", descriptor, namespace, Some(name)))
    }
}
