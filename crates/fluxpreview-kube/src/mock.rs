//! In-memory `ClusterApi` for testing
//!
//! Stores objects per (namespace, plural, name), counts operations, and lets
//! tests script what each newly opened watch delivers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fluxpreview_core::ResourceDescriptor;
use tokio::sync::mpsc;

use crate::api::{
    CancelHandle, ClusterApi, ListSelector, Propagation, Subscription, WatchEventType, WatchSignal,
};
use crate::error::{KubeError, Result};
use crate::resource::ManagedResource;

type ObjectKey = (String, &'static str, String);

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub watches: usize,
    pub applies: usize,
    pub deletes: usize,
}

/// What the next opened watch should do
#[derive(Debug)]
pub enum WatchScript {
    /// Opening the watch fails with this error
    FailOpen(KubeError),
    /// Deliver these signals, then stay open until cancelled
    Deliver(Vec<WatchSignal>),
}

struct OpenWatch {
    namespace: String,
    plural: &'static str,
    name: Option<String>,
    tx: mpsc::Sender<WatchSignal>,
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, ManagedResource>,
    scripts: HashMap<&'static str, VecDeque<WatchScript>>,
    watches: Vec<OpenWatch>,
    delete_failures: HashMap<&'static str, (u16, String)>,
    list_failures: HashMap<&'static str, KubeError>,
    held_deletes: HashSet<&'static str>,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockClusterApi {
    state: Arc<RwLock<MockState>>,
    operations: Arc<RwLock<OperationCounts>>,
    cancels: Arc<AtomicUsize>,
}

fn key_for(resource: &ManagedResource) -> Result<ObjectKey> {
    let descriptor = resource.descriptor()?;
    let namespace = resource
        .namespace()
        .ok_or_else(|| KubeError::InvalidResource(format!("{} has no namespace", resource.key())))?;
    Ok((namespace.to_string(), descriptor.plural, resource.name().to_string()))
}

fn name_from_field_selector(selector: &str) -> Option<String> {
    selector.strip_prefix("metadata.name=").map(str::to_string)
}

impl MockClusterApi {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated objects
    pub fn with_resources(resources: Vec<ManagedResource>) -> Self {
        let mock = Self::new();
        for resource in resources {
            mock.insert(resource);
        }
        mock
    }

    /// Store an object without counting an operation
    pub fn insert(&self, resource: ManagedResource) {
        if let Ok(key) = key_for(&resource) {
            self.state.write().unwrap().objects.insert(key, resource);
        }
    }

    /// Drop an object without counting an operation
    pub fn remove(&self, namespace: &str, descriptor: &ResourceDescriptor, name: &str) {
        let key = (namespace.to_string(), descriptor.plural, name.to_string());
        self.state.write().unwrap().objects.remove(&key);
    }

    pub fn contains(&self, namespace: &str, descriptor: &ResourceDescriptor, name: &str) -> bool {
        let key = (namespace.to_string(), descriptor.plural, name.to_string());
        self.state.read().unwrap().objects.contains_key(&key)
    }

    /// Queue behavior for the next watch opened on `descriptor`
    pub fn script_watch(&self, descriptor: &ResourceDescriptor, script: WatchScript) {
        self.state
            .write()
            .unwrap()
            .scripts
            .entry(descriptor.plural)
            .or_default()
            .push_back(script);
    }

    /// Make deletes of `descriptor` fail with an API status
    pub fn fail_deletes(&self, descriptor: &ResourceDescriptor, code: u16, message: &str) {
        self.state
            .write()
            .unwrap()
            .delete_failures
            .insert(descriptor.plural, (code, message.to_string()));
    }

    /// Accept deletes of `descriptor` but keep the objects listed, like a
    /// finalizer that never completes
    pub fn hold_deletes(&self, descriptor: &ResourceDescriptor) {
        self.state
            .write()
            .unwrap()
            .held_deletes
            .insert(descriptor.plural);
    }

    /// Make lists of `descriptor` fail
    pub fn fail_lists(&self, descriptor: &ResourceDescriptor, error: KubeError) {
        self.state
            .write()
            .unwrap()
            .list_failures
            .insert(descriptor.plural, error);
    }

    /// Push a change to every matching open watch and update the store
    pub fn emit(&self, event_type: WatchEventType, resource: ManagedResource) {
        let Ok(key) = key_for(&resource) else {
            return;
        };
        let mut state = self.state.write().unwrap();
        match event_type {
            WatchEventType::Deleted => {
                state.objects.remove(&key);
            }
            _ => {
                state.objects.insert(key.clone(), resource.clone());
            }
        }
        state.watches.retain(|w| !w.tx.is_closed());
        for watch in &state.watches {
            let matches = watch.namespace == key.0
                && watch.plural == key.1
                && watch.name.as_ref().is_none_or(|n| *n == key.2);
            if matches {
                let _ = watch
                    .tx
                    .try_send(WatchSignal::Event(event_type, resource.clone()));
            }
        }
    }

    /// Break every open watch as if the connection dropped
    pub fn disconnect_all(&self, reason: &str) {
        let mut state = self.state.write().unwrap();
        for watch in state.watches.drain(..) {
            let _ = watch
                .tx
                .try_send(WatchSignal::Disconnected(reason.to_string()));
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Number of subscriptions torn down
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        self.state.read().unwrap().objects.len()
    }
}

#[async_trait]
impl ClusterApi for MockClusterApi {
    async fn get(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
    ) -> Result<ManagedResource> {
        self.operations.write().unwrap().gets += 1;

        let key = (namespace.to_string(), descriptor.plural, name.to_string());
        self.state
            .read()
            .unwrap()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| KubeError::NotFound {
                kind: descriptor.kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn list(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        selector: &ListSelector,
    ) -> Result<Vec<ManagedResource>> {
        self.operations.write().unwrap().lists += 1;

        let mut state = self.state.write().unwrap();
        if let Some(err) = state.list_failures.remove(descriptor.plural) {
            return Err(err);
        }

        let name_filter = selector.fields.as_deref().and_then(name_from_field_selector);
        let mut items: Vec<ManagedResource> = state
            .objects
            .iter()
            .filter(|((ns, plural, name), _)| {
                ns == namespace
                    && *plural == descriptor.plural
                    && name_filter.as_ref().is_none_or(|n| n == name)
            })
            .map(|(_, r)| r.clone())
            .filter(|r| {
                selector
                    .labels
                    .as_ref()
                    .is_none_or(|l| l.matches(r.labels()))
            })
            .collect();

        if let Some(limit) = selector.limit {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    async fn watch(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        field_selector: Option<&str>,
    ) -> Result<Subscription> {
        self.operations.write().unwrap().watches += 1;

        let mut state = self.state.write().unwrap();
        let script = state
            .scripts
            .get_mut(descriptor.plural)
            .and_then(|queue| queue.pop_front());

        let signals = match script {
            Some(WatchScript::FailOpen(err)) => return Err(err),
            Some(WatchScript::Deliver(signals)) => signals,
            None => Vec::new(),
        };

        let (tx, rx) = mpsc::channel(signals.len().max(16) + 16);
        for signal in signals {
            if let WatchSignal::Event(event_type, resource) = &signal {
                if let Ok(key) = key_for(resource) {
                    if *event_type == WatchEventType::Deleted {
                        state.objects.remove(&key);
                    } else {
                        state.objects.insert(key, resource.clone());
                    }
                }
            }
            let _ = tx.try_send(signal);
        }

        state.watches.push(OpenWatch {
            namespace: namespace.to_string(),
            plural: descriptor.plural,
            name: field_selector.and_then(name_from_field_selector),
            tx,
        });

        let cancels = self.cancels.clone();
        let cancel = CancelHandle::new(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        });
        Ok(Subscription::new(rx, cancel))
    }

    async fn apply(
        &self,
        resource: &ManagedResource,
        _field_manager: &str,
    ) -> Result<ManagedResource> {
        self.operations.write().unwrap().applies += 1;

        let key = key_for(resource)?;
        self.state
            .write()
            .unwrap()
            .objects
            .insert(key, resource.clone());
        Ok(resource.clone())
    }

    async fn delete(
        &self,
        namespace: &str,
        descriptor: &ResourceDescriptor,
        name: &str,
        _propagation: Propagation,
    ) -> Result<()> {
        self.operations.write().unwrap().deletes += 1;

        let mut state = self.state.write().unwrap();
        if let Some((code, message)) = state.delete_failures.get(descriptor.plural) {
            return Err(KubeError::Api {
                code: *code,
                reason: "Injected".to_string(),
                message: message.clone(),
            });
        }

        let key = (namespace.to_string(), descriptor.plural, name.to_string());
        if state.held_deletes.contains(descriptor.plural) {
            return if state.objects.contains_key(&key) {
                Ok(())
            } else {
                Err(KubeError::NotFound {
                    kind: descriptor.kind.to_string(),
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                })
            };
        }
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| KubeError::NotFound {
                kind: descriptor.kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }
}
