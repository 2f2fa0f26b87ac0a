//! Readiness watching
//!
//! A wait reads current state once, and only if that is not already ready
//! subscribes to change events until the predicate holds. Subscriptions that
//! drop are replaced after a capped exponential backoff; a deadline that is
//! independent of the subscription bounds the whole wait. The retry and
//! deadline bookkeeping lives in `WatchState`, which has no async parts.
//!
//! A replacement subscription only replays objects that still exist, so a set
//! wait relists after every reopen instead of trusting its old membership.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use fluxpreview_core::{ResourceDescriptor, ResourceRef};
use futures::StreamExt;
use futures::future::try_join_all;
use futures::stream::select_all;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::api::{ClusterApi, ListSelector, Subscription, WatchEventType, WatchSignal, name_field_selector};
use crate::error::{KubeError, Result};
use crate::resource::{ManagedResource, ReadinessResult};

/// Backoff schedule for replacing a dropped subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Outcome of feeding one input into `WatchState`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The predicate holds
    Complete,
    /// Keep consuming the current subscription
    Continue,
    /// Open a new subscription after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Give up with a timeout, optionally saying why early
    Fail { reason: Option<String> },
}

/// Retry counter and deadline for one wait
#[derive(Debug, Clone)]
pub struct WatchState {
    policy: RetryPolicy,
    attempt: u32,
    started: Instant,
    deadline: Instant,
}

impl WatchState {
    pub fn new(started: Instant, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            started,
            deadline: started + timeout,
        }
    }

    /// Retries performed so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn on_event(&self, satisfied: bool) -> Transition {
        if satisfied {
            Transition::Complete
        } else {
            Transition::Continue
        }
    }

    /// A genuine disconnect or a failed open
    pub fn on_disconnect(&mut self, now: Instant, reason: &str) -> Transition {
        if now >= self.deadline {
            return Transition::Fail {
                reason: Some(format!("deadline reached after disconnect: {}", reason)),
            };
        }
        if self.attempt >= self.policy.max_attempts {
            return Transition::Fail {
                reason: Some(format!(
                    "gave up after {} retries, last error: {}",
                    self.attempt, reason
                )),
            };
        }
        self.attempt += 1;
        Transition::Retry {
            attempt: self.attempt,
            delay: self.policy.delay_for(self.attempt),
        }
    }

    pub fn on_timeout(&self) -> Transition {
        Transition::Fail { reason: None }
    }
}

/// One single-resource wait
#[derive(Debug, Clone)]
pub struct ReadinessQuery {
    pub namespace: String,
    pub descriptor: ResourceDescriptor,
    pub name: String,
    pub timeout: Duration,
    pub target_version: Option<String>,
}

impl ReadinessQuery {
    pub fn new(namespace: impl Into<String>, resource: ResourceRef, timeout: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            descriptor: resource.descriptor,
            name: resource.name,
            timeout,
            target_version: None,
        }
    }

    /// Also require the deployed version to equal `version`
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = Some(version.into());
        self
    }

    fn describe(&self) -> String {
        format!(
            "{}/{} in namespace '{}'",
            self.descriptor.kind, self.name, self.namespace
        )
    }
}

/// Readiness bookkeeping for an open-ended set of resources, keyed by `Kind/name`
#[derive(Debug, Default)]
pub struct ReadySet {
    expected: BTreeSet<String>,
    ready: BTreeSet<String>,
    last_seen: BTreeMap<String, ManagedResource>,
}

impl ReadySet {
    /// Membership becomes exactly `current`
    pub fn resync(&mut self, current: &[ManagedResource]) {
        *self = Self::default();
        for resource in current {
            self.observe(WatchEventType::Added, resource);
        }
    }

    pub fn observe(&mut self, event_type: WatchEventType, resource: &ManagedResource) {
        let key = resource.key();
        match event_type {
            WatchEventType::Deleted => {
                self.expected.remove(&key);
                self.ready.remove(&key);
                self.last_seen.remove(&key);
            }
            WatchEventType::Added | WatchEventType::Modified => {
                if resource.is_ready(None) {
                    self.ready.insert(key.clone());
                } else {
                    self.ready.remove(&key);
                }
                self.expected.insert(key.clone());
                self.last_seen.insert(key, resource.clone());
            }
        }
    }

    /// Every expected resource is ready; an empty set is complete
    pub fn is_complete(&self) -> bool {
        self.expected.is_subset(&self.ready)
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    /// Last observed state of everything not yet ready
    pub fn pending(&self) -> Vec<ReadinessResult> {
        self.last_seen
            .iter()
            .filter(|(key, _)| !self.ready.contains(*key))
            .map(|(_, r)| r.readiness(None))
            .collect()
    }
}

/// Input to a wait's predicate
enum Observation<'a> {
    Event(WatchEventType, &'a ManagedResource),
    /// Full state listed right after a replacement subscription opened
    Relisted(&'a [ManagedResource]),
}

enum RoundEnd {
    Complete,
    Disconnected(String),
    TimedOut,
}

enum WatchOutcome {
    Satisfied,
    TimedOut { reason: Option<String> },
}

/// Blocks until Flux reports resources ready
pub struct ReadinessWatcher<A: ClusterApi> {
    api: A,
    policy: RetryPolicy,
}

impl<A: ClusterApi> ReadinessWatcher<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Wait for one resource
    ///
    /// A missing resource fails immediately. On timeout the error carries the
    /// resource's state read fresh at that moment.
    pub async fn wait_until_ready(&self, query: &ReadinessQuery) -> Result<ReadinessResult> {
        let target = query.target_version.as_deref();
        let mut state = WatchState::new(Instant::now(), query.timeout, self.policy);

        let current = self
            .api
            .get(&query.namespace, &query.descriptor, &query.name)
            .await?;
        if current.is_ready(target) {
            debug!(resource = %current.key(), "ready on first read");
            return Ok(current.readiness(target));
        }

        let mut last_seen = current;
        let targets = [(query.descriptor, Some(name_field_selector(&query.name)))];
        let outcome = self
            .watch_until(&query.namespace, &targets, None, &mut state, |observed| match observed {
                Observation::Event(WatchEventType::Deleted, _) | Observation::Relisted(_) => false,
                Observation::Event(_, resource) => {
                    last_seen = resource.clone();
                    resource.is_ready(target)
                }
            })
            .await?;

        match outcome {
            WatchOutcome::Satisfied => {
                info!(resource = %last_seen.key(), "ready");
                Ok(last_seen.readiness(target))
            }
            WatchOutcome::TimedOut { reason } => {
                let snapshot = match self
                    .api
                    .get(&query.namespace, &query.descriptor, &query.name)
                    .await
                {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        debug!(error = %e, "could not refresh state after timeout");
                        last_seen
                    }
                };
                Err(KubeError::timeout(
                    query.describe(),
                    state.elapsed(Instant::now()),
                    vec![snapshot.readiness(target)],
                    reason,
                ))
            }
        }
    }

    /// Wait for every resource of the given types in a namespace
    ///
    /// Resources appearing while waiting join the set; deleted ones leave it.
    /// Returns the freshly listed states once all are ready.
    pub async fn wait_until_all_ready(
        &self,
        namespace: &str,
        descriptors: &[ResourceDescriptor],
        timeout: Duration,
    ) -> Result<Vec<ReadinessResult>> {
        let mut state = WatchState::new(Instant::now(), timeout, self.policy);

        let current = self.list_all(namespace, descriptors).await?;
        let mut set = ReadySet::default();
        set.resync(&current);
        if set.is_complete() {
            debug!(count = set.len(), "all ready on first read");
            return Ok(current.iter().map(|r| r.readiness(None)).collect());
        }

        let targets: Vec<(ResourceDescriptor, Option<String>)> =
            descriptors.iter().map(|d| (*d, None)).collect();
        let outcome = self
            .watch_until(namespace, &targets, Some(descriptors), &mut state, |observed| {
                match observed {
                    Observation::Event(event_type, resource) => set.observe(event_type, resource),
                    Observation::Relisted(current) => set.resync(current),
                }
                set.is_complete()
            })
            .await?;

        let what = format!(
            "all {} in namespace '{}'",
            descriptors
                .iter()
                .map(|d| d.plural)
                .collect::<Vec<_>>()
                .join(", "),
            namespace
        );

        match outcome {
            WatchOutcome::Satisfied => {
                let fresh = self.list_all(namespace, descriptors).await?;
                info!(count = fresh.len(), "all resources ready");
                Ok(fresh.iter().map(|r| r.readiness(None)).collect())
            }
            WatchOutcome::TimedOut { reason } => {
                let pending = match self.list_all(namespace, descriptors).await {
                    Ok(fresh) => fresh
                        .iter()
                        .filter(|r| !r.is_ready(None))
                        .map(|r| r.readiness(None))
                        .collect(),
                    Err(e) => {
                        debug!(error = %e, "could not refresh state after timeout");
                        set.pending()
                    }
                };
                Err(KubeError::timeout(
                    what,
                    state.elapsed(Instant::now()),
                    pending,
                    reason,
                ))
            }
        }
    }

    async fn list_all(
        &self,
        namespace: &str,
        descriptors: &[ResourceDescriptor],
    ) -> Result<Vec<ManagedResource>> {
        let selector = ListSelector::all();
        let lists = try_join_all(
            descriptors
                .iter()
                .map(|d| self.api.list(namespace, d, &selector)),
        )
        .await?;
        Ok(lists.into_iter().flatten().collect())
    }

    async fn open_all(
        &self,
        namespace: &str,
        targets: &[(ResourceDescriptor, Option<String>)],
    ) -> Result<Vec<Subscription>> {
        try_join_all(
            targets
                .iter()
                .map(|(d, fields)| self.api.watch(namespace, d, fields.as_deref())),
        )
        .await
    }

    /// Consume events until `on_event` reports satisfaction, replacing dropped
    /// subscriptions until the retry budget or the deadline runs out
    ///
    /// With `relist`, every replacement subscription is followed by a full
    /// list of those types fed to `on_event` before any event.
    async fn watch_until<F>(
        &self,
        namespace: &str,
        targets: &[(ResourceDescriptor, Option<String>)],
        relist: Option<&[ResourceDescriptor]>,
        state: &mut WatchState,
        mut on_event: F,
    ) -> Result<WatchOutcome>
    where
        F: FnMut(Observation<'_>) -> bool + Send,
    {
        let deadline = state.deadline();

        loop {
            let opened = tokio::select! {
                opened = self.open_all(namespace, targets) => opened,
                _ = sleep_until(deadline) => return Ok(WatchOutcome::TimedOut { reason: None }),
            };

            let round = match opened {
                Ok(mut subscriptions) => {
                    let end = self
                        .run_round(namespace, relist, &mut subscriptions, state, &mut on_event)
                        .await;
                    for subscription in subscriptions.iter_mut() {
                        subscription.cancel();
                    }
                    end?
                }
                Err(e) if e.is_transient() => RoundEnd::Disconnected(e.to_string()),
                Err(e) => return Err(e),
            };

            let transition = match round {
                RoundEnd::Complete => Transition::Complete,
                RoundEnd::TimedOut => state.on_timeout(),
                RoundEnd::Disconnected(reason) => {
                    let transition = state.on_disconnect(Instant::now(), &reason);
                    if let Transition::Fail { .. } = transition {
                        warn!(reason = %reason, attempts = state.attempt(), "watch not recoverable");
                    }
                    transition
                }
            };

            match transition {
                Transition::Complete => return Ok(WatchOutcome::Satisfied),
                Transition::Fail { reason } => return Ok(WatchOutcome::TimedOut { reason }),
                Transition::Retry { attempt, delay } => {
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "watch disconnected, reopening"
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = sleep_until(deadline) => {
                            return Ok(WatchOutcome::TimedOut { reason: None });
                        }
                    }
                }
                Transition::Continue => {}
            }
        }
    }

    async fn run_round<F>(
        &self,
        namespace: &str,
        relist: Option<&[ResourceDescriptor]>,
        subscriptions: &mut [Subscription],
        state: &WatchState,
        on_event: &mut F,
    ) -> Result<RoundEnd>
    where
        F: FnMut(Observation<'_>) -> bool + Send,
    {
        if let Some(descriptors) = relist.filter(|_| state.attempt() > 0) {
            match self.list_all(namespace, descriptors).await {
                Ok(current) => {
                    debug!(count = current.len(), "relisted after reopen");
                    if on_event(Observation::Relisted(&current)) {
                        return Ok(RoundEnd::Complete);
                    }
                }
                Err(e) if e.is_transient() => return Ok(RoundEnd::Disconnected(e.to_string())),
                Err(e) => return Err(e),
            }
        }
        Ok(drive(subscriptions, state, on_event).await)
    }
}

async fn drive<F>(subscriptions: &mut [Subscription], state: &WatchState, on_event: &mut F) -> RoundEnd
where
    F: FnMut(Observation<'_>) -> bool,
{
    let mut merged = select_all(subscriptions.iter_mut());
    let timer = sleep_until(state.deadline());
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = &mut timer => return RoundEnd::TimedOut,
            signal = merged.next() => match signal {
                Some(WatchSignal::Event(event_type, resource)) => {
                    let satisfied = on_event(Observation::Event(event_type, &resource));
                    if state.on_event(satisfied) == Transition::Complete {
                        return RoundEnd::Complete;
                    }
                }
                // our own teardown, not a failure
                Some(WatchSignal::Cancelled) => continue,
                Some(WatchSignal::Disconnected(reason)) => return RoundEnd::Disconnected(reason),
                None => return RoundEnd::Disconnected("watch streams closed".to_string()),
            },
        }
    }
}
