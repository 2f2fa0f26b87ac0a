//! Label-driven lifecycle of preview environments
//!
//! A preview is a Kustomization plus the OCIRepository it reconciles from,
//! tied together by the `preview-deployment` label. Bulk cleanup finds
//! previews by the `repository` label and honors an age threshold and a
//! protection marker before deleting anything.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fluxpreview_core::labels::{CI_REFERENCE_LABEL, PREVIEW_DEPLOYMENT_LABEL};
use fluxpreview_core::{
    CorrelationKey, KUSTOMIZATION, LabelSelector, OCI_REPOSITORY, ResourceDescriptor,
    format_age, subject_id_from_reference,
};
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::api::{ClusterApi, ListSelector, Propagation};
use crate::error::{KubeError, Result};
use crate::protection::{self, NoProtection, ProtectionLookup};
use crate::resource::ManagedResource;

/// Default field manager for server-side apply
pub const FIELD_MANAGER: &str = "fluxpreview";

/// How often to check whether a deleted resource is gone
pub const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Resources sharing a label, by kind
#[derive(Debug, Clone, Default)]
pub struct DiscoveredResources {
    pub kustomizations: Vec<ManagedResource>,
    pub oci_repositories: Vec<ManagedResource>,
}

impl DiscoveredResources {
    pub fn is_empty(&self) -> bool {
        self.kustomizations.is_empty() && self.oci_repositories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kustomizations.len() + self.oci_repositories.len()
    }
}

/// Result of a single delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// 404: nothing left to delete
    AlreadyGone,
    /// A secondary resource could not be deleted; the message was logged
    FailedSecondary(String),
}

/// Why a preview was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooYoung { age_seconds: u64, threshold_seconds: u64 },
    Protected,
    NotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooYoung {
                age_seconds,
                threshold_seconds,
            } => write!(
                f,
                "too young ({} < {})",
                format_age(*age_seconds),
                format_age(*threshold_seconds)
            ),
            SkipReason::Protected => f.write_str("protected"),
            SkipReason::NotFound => f.write_str("not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub age: String,
    pub age_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedResource {
    pub name: String,
    pub reason: String,
}

/// What a teardown did
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownOutcome {
    pub deleted_count: usize,
    pub deleted_resources: Vec<DeletedResource>,
    pub skipped_count: usize,
    pub skipped_resources: Vec<SkippedResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Deletions were only reported, not issued
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl TeardownOutcome {
    pub fn record_deleted(&mut self, resource: &ManagedResource) {
        let age_seconds = resource.age_seconds();
        self.deleted_resources.push(DeletedResource {
            name: resource.name().to_string(),
            kind: resource.kind().to_string(),
            age: format_age(age_seconds),
            age_seconds,
        });
        self.deleted_count = self.deleted_resources.len();
    }

    pub fn record_skipped(&mut self, name: &str, reason: &SkipReason) {
        self.skipped_resources.push(SkippedResource {
            name: name.to_string(),
            reason: reason.to_string(),
        });
        self.skipped_count = self.skipped_resources.len();
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Nothing was deleted or skipped
    pub fn is_empty(&self) -> bool {
        self.deleted_count == 0 && self.skipped_count == 0
    }
}

/// Options for tearing down one preview
#[derive(Debug, Clone, Default)]
pub struct TeardownOptions {
    /// Wait until deleted resources are gone
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Duration,
}

impl TeardownOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self
    }
}

/// Options for cleaning up every preview of a repository
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Repository identity, `owner/repo` or an already sanitized label value
    pub repository: String,

    /// Previews younger than this are kept
    pub older_than: Duration,

    pub wait: bool,

    /// One deadline for the whole pass, not per resource
    pub timeout: Duration,

    /// Report what would be deleted without deleting
    pub dry_run: bool,
}

impl CleanupOptions {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            older_than: Duration::ZERO,
            wait: false,
            timeout: Duration::ZERO,
            dry_run: false,
        }
    }

    pub fn older_than(mut self, threshold: Duration) -> Self {
        self.older_than = threshold;
        self
    }

    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Applies, discovers and deletes preview resources in one namespace
pub struct LifecycleManager<A: ClusterApi> {
    api: A,
    namespace: String,
    field_manager: String,
    protection: Arc<dyn ProtectionLookup>,
    poll_interval: Duration,
}

impl<A: ClusterApi> LifecycleManager<A> {
    pub fn new(api: A, namespace: impl Into<String>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            field_manager: FIELD_MANAGER.to_string(),
            protection: Arc::new(NoProtection),
            poll_interval: DELETE_POLL_INTERVAL,
        }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    pub fn with_protection(mut self, protection: Arc<dyn ProtectionLookup>) -> Self {
        self.protection = protection;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Server-side apply; re-applying the same object is a no-op
    pub async fn apply(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        let applied = self.api.apply(resource, &self.field_manager).await?;
        info!(resource = %applied.key(), namespace = ?applied.namespace(), "applied");
        Ok(applied)
    }

    /// Apply sources before the Kustomizations that consume them
    pub async fn apply_all(&self, resources: &[ManagedResource]) -> Result<Vec<ManagedResource>> {
        let mut ordered: Vec<&ManagedResource> = resources.iter().collect();
        ordered.sort_by_key(|r| apply_order(r.kind()));

        let mut applied = Vec::with_capacity(ordered.len());
        for resource in ordered {
            applied.push(self.apply(resource).await?);
        }
        Ok(applied)
    }

    /// Both kinds sharing a label, listed concurrently
    pub async fn find_by_label(&self, selector: &LabelSelector) -> Result<DiscoveredResources> {
        let list = ListSelector::labels(selector.clone());
        let (kustomizations, oci_repositories) = tokio::try_join!(
            self.api.list(&self.namespace, &KUSTOMIZATION, &list),
            self.api.list(&self.namespace, &OCI_REPOSITORY, &list),
        )?;
        debug!(
            selector = %selector,
            kustomizations = kustomizations.len(),
            oci_repositories = oci_repositories.len(),
            "discovered resources"
        );
        Ok(DiscoveredResources {
            kustomizations,
            oci_repositories,
        })
    }

    /// Delete one resource
    ///
    /// A 404 counts as success. Other failures on an OCIRepository are
    /// downgraded to a warning; on a Kustomization they propagate.
    pub async fn delete(&self, descriptor: &ResourceDescriptor, name: &str) -> Result<DeleteOutcome> {
        match self
            .api
            .delete(&self.namespace, descriptor, name, Propagation::Background)
            .await
        {
            Ok(()) => {
                info!(kind = descriptor.kind, resource = name, "deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => {
                info!(kind = descriptor.kind, resource = name, "already gone");
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) if *descriptor == OCI_REPOSITORY => {
                warn!(kind = descriptor.kind, resource = name, error = %e, "failed to delete source");
                Ok(DeleteOutcome::FailedSecondary(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the resource is absent
    pub async fn wait_for_deletion(
        &self,
        descriptor: &ResourceDescriptor,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        self.wait_gone_by(descriptor, name, started, started + timeout)
            .await
    }

    async fn wait_gone_by(
        &self,
        descriptor: &ResourceDescriptor,
        name: &str,
        started: Instant,
        deadline: Instant,
    ) -> Result<()> {
        let selector = ListSelector::name(name);

        loop {
            let remaining = self.api.list(&self.namespace, descriptor, &selector).await?;
            if remaining.is_empty() {
                debug!(kind = descriptor.kind, resource = name, "gone");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(KubeError::timeout(
                    format!("deletion of {}/{}", descriptor.kind, name),
                    now - started,
                    Vec::new(),
                    None,
                ));
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Whether the change request behind a preview carries the protection marker
    pub async fn is_protected(&self, subject_id: u64) -> bool {
        protection::is_protected(self.protection.as_ref(), subject_id).await
    }

    /// Fail early when the caller cannot list either kind
    pub async fn check_access(&self) -> Result<()> {
        let probe = ListSelector::all().with_limit(1);
        tokio::try_join!(
            self.api.list(&self.namespace, &KUSTOMIZATION, &probe),
            self.api.list(&self.namespace, &OCI_REPOSITORY, &probe),
        )?;
        Ok(())
    }

    /// Delete everything labeled with one preview name
    ///
    /// Kustomizations go first so Flux stops reconciling before the source
    /// disappears. No protection check: a targeted teardown is explicit.
    pub async fn teardown_preview(
        &self,
        preview: &str,
        options: &TeardownOptions,
    ) -> Result<TeardownOutcome> {
        let key = CorrelationKey::preview(preview);
        let found = self.find_by_label(&key.selector()).await?;

        let mut outcome = TeardownOutcome::default();
        if found.is_empty() {
            info!(preview = preview, "no resources found");
            outcome.record_skipped(preview, &SkipReason::NotFound);
            return Ok(outcome);
        }

        let mut deleted = Vec::new();
        for resource in found.kustomizations.iter().chain(&found.oci_repositories) {
            if self.delete_and_record(resource, &mut outcome).await? {
                deleted.push(resource);
            }
        }

        if options.wait {
            let started = Instant::now();
            let deadline = started + options.timeout;
            for resource in deleted {
                self.wait_gone_by(&resource.descriptor()?, resource.name(), started, deadline)
                    .await?;
            }
        }
        Ok(outcome)
    }

    /// Delete stale previews of one repository
    pub async fn cleanup(&self, options: &CleanupOptions) -> Result<TeardownOutcome> {
        let key = CorrelationKey::repository(&options.repository);
        let kustomizations = self
            .api
            .list(
                &self.namespace,
                &KUSTOMIZATION,
                &ListSelector::labels(key.selector()),
            )
            .await?;
        info!(
            repository = %key.value,
            count = kustomizations.len(),
            dry_run = options.dry_run,
            "cleaning up previews"
        );

        let mut outcome = TeardownOutcome {
            dry_run: options.dry_run,
            ..Default::default()
        };
        let threshold_seconds = options.older_than.as_secs();
        let mut deleted = Vec::new();

        for kustomization in &kustomizations {
            let name = kustomization.name();
            let age_seconds = kustomization.age_seconds();
            if age_seconds < threshold_seconds {
                let reason = SkipReason::TooYoung {
                    age_seconds,
                    threshold_seconds,
                };
                debug!(resource = name, %reason, "skipping");
                outcome.record_skipped(name, &reason);
                continue;
            }

            let subject = kustomization
                .label(CI_REFERENCE_LABEL)
                .and_then(subject_id_from_reference);
            if let Some(subject_id) = subject {
                if self.is_protected(subject_id).await {
                    info!(resource = name, subject_id, "skipping protected preview");
                    outcome.record_skipped(name, &SkipReason::Protected);
                    continue;
                }
            }

            let preview = kustomization
                .label(PREVIEW_DEPLOYMENT_LABEL)
                .unwrap_or(name);
            let sources = self
                .api
                .list(
                    &self.namespace,
                    &OCI_REPOSITORY,
                    &ListSelector::labels(CorrelationKey::preview(preview).selector()),
                )
                .await?;

            if options.dry_run {
                outcome.record_deleted(kustomization);
                for source in &sources {
                    outcome.record_deleted(source);
                }
                continue;
            }

            if self.delete_and_record(kustomization, &mut outcome).await? {
                deleted.push(kustomization.clone());
            }
            for source in sources {
                if self.delete_and_record(&source, &mut outcome).await? {
                    deleted.push(source);
                }
            }
        }

        if options.wait && !deleted.is_empty() {
            let started = Instant::now();
            let deadline = started + options.timeout;
            for resource in &deleted {
                let waited = match resource.descriptor() {
                    Ok(descriptor) => {
                        self.wait_gone_by(&descriptor, resource.name(), started, deadline)
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = waited {
                    warn!(resource = %resource.key(), error = %e, "resource still present");
                    outcome.warn(format!("{}: {}", resource.key(), e));
                }
            }
        }

        Ok(outcome)
    }

    /// Returns whether the resource is now deleted
    async fn delete_and_record(
        &self,
        resource: &ManagedResource,
        outcome: &mut TeardownOutcome,
    ) -> Result<bool> {
        let descriptor = resource.descriptor()?;
        match self.delete(&descriptor, resource.name()).await? {
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyGone => {
                outcome.record_deleted(resource);
                Ok(true)
            }
            DeleteOutcome::FailedSecondary(message) => {
                outcome.warn(format!("{}: {}", resource.key(), message));
                Ok(false)
            }
        }
    }
}

fn apply_order(kind: &str) -> u8 {
    if kind == OCI_REPOSITORY.kind { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClusterApi;
    use crate::protection::testing::StaticProtection;
    use chrono::Utc;

    const NS: &str = "flux-system";

    fn preview(name: &str, repository: &str, age: chrono::Duration) -> Vec<ManagedResource> {
        let created = Utc::now() - age;
        vec![
            ManagedResource::new(&KUSTOMIZATION, NS, name)
                .with_label("preview-deployment", name)
                .with_label("repository", repository)
                .with_label("ci-reference", name)
                .with_created(created),
            ManagedResource::new(&OCI_REPOSITORY, NS, name)
                .with_label("preview-deployment", name)
                .with_label("repository", repository)
                .with_created(created),
        ]
    }

    fn bare_preview(name: &str) -> Vec<ManagedResource> {
        vec![
            ManagedResource::new(&KUSTOMIZATION, NS, name).with_label("preview-deployment", name),
            ManagedResource::new(&OCI_REPOSITORY, NS, name).with_label("preview-deployment", name),
        ]
    }

    #[tokio::test]
    async fn test_apply_all_orders_sources_first() {
        let mock = MockClusterApi::new();
        let manager = LifecycleManager::new(mock.clone(), NS);
        let resources = bare_preview("pr-1");

        let applied = manager.apply_all(&resources).await.unwrap();

        let kinds: Vec<&str> = applied.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["OCIRepository", "Kustomization"]);
        assert_eq!(mock.operation_counts().applies, 2);
        assert_eq!(mock.object_count(), 2);

        manager.apply_all(&resources).await.unwrap();
        assert_eq!(mock.object_count(), 2);
    }

    #[tokio::test]
    async fn test_find_by_label() {
        let mut resources = bare_preview("pr-1");
        resources.extend(bare_preview("pr-2"));
        let manager = LifecycleManager::new(MockClusterApi::with_resources(resources), NS);

        let found = manager
            .find_by_label(&CorrelationKey::preview("pr-1").selector())
            .await
            .unwrap();
        assert_eq!(found.kustomizations.len(), 1);
        assert_eq!(found.oci_repositories.len(), 1);
        assert_eq!(found.len(), 2);

        let none = manager
            .find_by_label(&CorrelationKey::preview("pr-9").selector())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() {
        let manager = LifecycleManager::new(MockClusterApi::with_resources(bare_preview("pr-1")), NS);

        assert_eq!(
            manager.delete(&KUSTOMIZATION, "pr-1").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            manager.delete(&KUSTOMIZATION, "pr-1").await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
    }

    #[tokio::test]
    async fn test_delete_failure_severity_by_kind() {
        let mock = MockClusterApi::with_resources(bare_preview("pr-1"));
        mock.fail_deletes(&OCI_REPOSITORY, 500, "etcd unavailable");
        mock.fail_deletes(&KUSTOMIZATION, 500, "etcd unavailable");
        let manager = LifecycleManager::new(mock, NS);

        let secondary = manager.delete(&OCI_REPOSITORY, "pr-1").await.unwrap();
        assert!(matches!(secondary, DeleteOutcome::FailedSecondary(m) if m.contains("etcd unavailable")));

        let err = manager.delete(&KUSTOMIZATION, "pr-1").await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_teardown_missing_preview_is_skipped() {
        let manager = LifecycleManager::new(MockClusterApi::new(), NS);

        let outcome = manager
            .teardown_preview("pr-404", &TeardownOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.deleted_count, 0);
        assert_eq!(outcome.skipped_count, 1);
        assert_eq!(outcome.skipped_resources[0].reason, "not found");
    }

    #[tokio::test]
    async fn test_teardown_deletes_kustomization_then_source() {
        let mock = MockClusterApi::with_resources(bare_preview("pr-7"));
        let manager = LifecycleManager::new(mock.clone(), NS);

        let outcome = manager
            .teardown_preview("pr-7", &TeardownOptions::new())
            .await
            .unwrap();

        assert_eq!(mock.object_count(), 0);
        insta::assert_json_snapshot!(outcome, @r###"
        {
          "deletedCount": 2,
          "deletedResources": [
            {
              "name": "pr-7",
              "type": "Kustomization",
              "age": "0m",
              "ageSeconds": 0
            },
            {
              "name": "pr-7",
              "type": "OCIRepository",
              "age": "0m",
              "ageSeconds": 0
            }
          ],
          "skippedCount": 0,
          "skippedResources": []
        }
        "###);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_with_wait() {
        let mock = MockClusterApi::with_resources(bare_preview("pr-3"));
        let manager = LifecycleManager::new(mock.clone(), NS);

        let outcome = manager
            .teardown_preview("pr-3", &TeardownOptions::new().with_wait(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(outcome.deleted_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_deletion_polls() {
        let mock = MockClusterApi::with_resources(bare_preview("pr-3"));
        let manager = LifecycleManager::new(mock.clone(), NS);

        let remover = mock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            remover.remove(NS, &KUSTOMIZATION, "pr-3");
        });

        manager
            .wait_for_deletion(&KUSTOMIZATION, "pr-3", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(mock.operation_counts().lists >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_deletion_times_out() {
        let manager = LifecycleManager::new(MockClusterApi::with_resources(bare_preview("pr-3")), NS);

        let err = manager
            .wait_for_deletion(&KUSTOMIZATION, "pr-3", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Timeout { .. }));
        assert!(err.to_string().contains("deletion of Kustomization/pr-3"));
    }

    #[tokio::test]
    async fn test_cleanup_skips_young_previews() {
        let mock = MockClusterApi::with_resources(preview("pr-1", "acme-shop", chrono::Duration::days(2)));
        let manager = LifecycleManager::new(mock.clone(), NS);

        let outcome = manager
            .cleanup(&CleanupOptions::new("acme/shop").older_than(Duration::from_secs(7 * 86400)))
            .await
            .unwrap();

        assert_eq!(outcome.skipped_count, 1);
        assert_eq!(outcome.deleted_count, 0);
        assert!(outcome.skipped_resources[0].reason.starts_with("too young (2d"));
        assert_eq!(mock.operation_counts().deletes, 0);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_old_and_honors_protection() {
        let mut resources = preview("pr-1", "acme-shop", chrono::Duration::days(10));
        resources.extend(preview("pr-42", "acme-shop", chrono::Duration::days(10)));
        resources.extend(preview("pr-5", "other", chrono::Duration::days(10)));
        let mock = MockClusterApi::with_resources(resources);
        let protection = StaticProtection {
            protected: [42].into_iter().collect(),
            ..Default::default()
        };
        let manager = LifecycleManager::new(mock.clone(), NS).with_protection(Arc::new(protection));

        let outcome = manager
            .cleanup(&CleanupOptions::new("acme/shop").older_than(Duration::from_secs(7 * 86400)))
            .await
            .unwrap();

        assert_eq!(outcome.deleted_count, 2);
        assert_eq!(outcome.deleted_resources[0].age, "10d 0h");
        assert_eq!(outcome.skipped_count, 1);
        assert_eq!(outcome.skipped_resources[0].name, "pr-42");
        assert_eq!(outcome.skipped_resources[0].reason, "protected");
        assert!(!mock.contains(NS, &KUSTOMIZATION, "pr-1"));
        assert!(!mock.contains(NS, &OCI_REPOSITORY, "pr-1"));
        assert!(mock.contains(NS, &KUSTOMIZATION, "pr-42"));
        assert!(mock.contains(NS, &KUSTOMIZATION, "pr-5"));
    }

    #[tokio::test]
    async fn test_cleanup_failing_lookup_deletes() {
        let mock = MockClusterApi::with_resources(preview("pr-42", "acme-shop", chrono::Duration::days(10)));
        let protection = StaticProtection {
            protected: [42].into_iter().collect(),
            fail_with: Some("502 Bad Gateway".to_string()),
            ..Default::default()
        };
        let manager = LifecycleManager::new(mock.clone(), NS).with_protection(Arc::new(protection));

        let outcome = manager.cleanup(&CleanupOptions::new("acme-shop")).await.unwrap();
        assert_eq!(outcome.deleted_count, 2);
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_deletes_nothing() {
        let mock = MockClusterApi::with_resources(preview("pr-1", "acme-shop", chrono::Duration::days(10)));
        let manager = LifecycleManager::new(mock.clone(), NS);

        let outcome = manager
            .cleanup(&CleanupOptions::new("acme-shop").dry_run())
            .await
            .unwrap();

        assert!(outcome.dry_run);
        assert_eq!(outcome.deleted_count, 2);
        assert_eq!(mock.operation_counts().deletes, 0);
        assert_eq!(mock.object_count(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_source_failure_is_a_warning() {
        let mock = MockClusterApi::with_resources(preview("pr-1", "acme-shop", chrono::Duration::days(10)));
        mock.fail_deletes(&OCI_REPOSITORY, 500, "webhook denied");
        let manager = LifecycleManager::new(mock.clone(), NS);

        let outcome = manager.cleanup(&CleanupOptions::new("acme-shop")).await.unwrap();

        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(outcome.deleted_resources[0].kind, "Kustomization");
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("OCIRepository/pr-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_wait_shares_one_deadline() {
        let mut resources = preview("pr-1", "acme-shop", chrono::Duration::days(10));
        resources.extend(preview("pr-2", "acme-shop", chrono::Duration::days(10)));
        resources.extend(preview("pr-3", "acme-shop", chrono::Duration::days(10)));
        let mock = MockClusterApi::with_resources(resources);
        mock.hold_deletes(&KUSTOMIZATION);
        let manager = LifecycleManager::new(mock.clone(), NS);

        let started = Instant::now();
        let outcome = manager
            .cleanup(&CleanupOptions::new("acme-shop").with_wait(Duration::from_secs(10)))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(15));
        assert_eq!(outcome.deleted_count, 6);
        assert_eq!(outcome.warnings.len(), 3);
        assert!(outcome.warnings.iter().all(|w| w.starts_with("Kustomization/pr-")));
        assert!(!mock.contains(NS, &OCI_REPOSITORY, "pr-2"));
    }

    #[tokio::test]
    async fn test_check_access_reports_forbidden() {
        let mock = MockClusterApi::new();
        mock.fail_lists(
            &OCI_REPOSITORY,
            KubeError::PermissionDenied {
                verb: "list".to_string(),
                resource: OCI_REPOSITORY.to_string(),
                namespace: NS.to_string(),
            },
        );
        let manager = LifecycleManager::new(mock.clone(), NS);

        let err = manager.check_access().await.unwrap_err();
        assert_eq!(err.status_code(), Some(403));
        assert!(err.to_string().contains("ocirepositories.source.toolkit.fluxcd.io"));

        manager.check_access().await.unwrap();
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::TooYoung {
            age_seconds: 2 * 86400,
            threshold_seconds: 7 * 86400,
        };
        assert_eq!(reason.to_string(), "too young (2d 0h < 7d 0h)");
    }
}
