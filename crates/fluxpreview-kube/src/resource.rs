//! Managed Flux resources and the readiness predicate
//!
//! A `ManagedResource` is a thin view over a `DynamicObject`. Flux reports
//! convergence through `status.conditions[type=Ready]`; the deployed version is
//! `status.lastAppliedRevision` on Kustomizations and
//! `status.artifact.revision` on OCIRepositories.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use fluxpreview_core::{ResourceDescriptor, compute_age};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};

use crate::error::{KubeError, Result};

/// Condition type that signals convergence
pub const READY_CONDITION: &str = "Ready";

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

/// One entry of `status.conditions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Readiness as reported to the report layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyStatus {
    True,
    False,
}

impl ReadyStatus {
    pub fn is_ready(self) -> bool {
        self == ReadyStatus::True
    }
}

impl From<bool> for ReadyStatus {
    fn from(ready: bool) -> Self {
        if ready {
            ReadyStatus::True
        } else {
            ReadyStatus::False
        }
    }
}

impl fmt::Display for ReadyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadyStatus::True => f.write_str("True"),
            ReadyStatus::False => f.write_str("False"),
        }
    }
}

/// Readiness snapshot of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ready: ReadyStatus,
    pub message: String,
}

/// A namespaced Flux object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedResource {
    object: DynamicObject,
}

impl From<DynamicObject> for ManagedResource {
    fn from(object: DynamicObject) -> Self {
        Self { object }
    }
}

/// `ApiResource` for a descriptor, without discovery
pub fn api_resource(descriptor: &ResourceDescriptor) -> ApiResource {
    let gvk = GroupVersionKind::gvk(descriptor.group, descriptor.version, descriptor.kind);
    ApiResource::from_gvk_with_plural(&gvk, descriptor.plural)
}

impl ManagedResource {
    /// Create an empty object of the given type
    pub fn new(descriptor: &ResourceDescriptor, namespace: &str, name: &str) -> Self {
        let mut object = DynamicObject::new(name, &api_resource(descriptor)).within(namespace);
        object.data = serde_json::json!({});
        Self { object }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.object
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.object.metadata.creation_timestamp = Some(Time(created));
        self
    }

    /// Append a condition to `status.conditions`
    pub fn with_condition(mut self, type_: &str, status: &str, message: &str) -> Self {
        let condition = serde_json::json!({
            "type": type_,
            "status": status,
            "reason": if status == "True" { "ReconciliationSucceeded" } else { "Progressing" },
            "message": message,
        });
        let conditions = &mut self.object.data["status"]["conditions"];
        match conditions.as_array_mut() {
            Some(list) => list.push(condition),
            None => *conditions = serde_json::json!([condition]),
        }
        self
    }

    /// Set the version Flux reports as deployed
    pub fn with_deployed_version(mut self, version: &str) -> Self {
        if self.kind() == fluxpreview_core::OCI_REPOSITORY.kind {
            self.object.data["status"]["artifact"]["revision"] = version.into();
        } else {
            self.object.data["status"]["lastAppliedRevision"] = version.into();
        }
        self
    }

    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }

    pub fn kind(&self) -> &str {
        self.object
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or_default()
    }

    /// Descriptor for this object's kind, if it is a managed Flux kind
    pub fn descriptor(&self) -> Result<ResourceDescriptor> {
        ResourceDescriptor::from_kind(self.kind()).ok_or_else(|| {
            KubeError::InvalidResource(format!(
                "unsupported kind '{}' for {}",
                self.kind(),
                self.name()
            ))
        })
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        self.object.metadata.labels.as_ref().unwrap_or(&NO_LABELS)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.object.metadata.creation_timestamp.as_ref().map(|t| t.0)
    }

    /// Age in seconds; objects without a timestamp count as brand new
    pub fn age_seconds(&self) -> u64 {
        self.creation_timestamp().map(compute_age).unwrap_or(0)
    }

    /// Ordered `status.conditions`; malformed entries are skipped
    pub fn conditions(&self) -> Vec<Condition> {
        self.object
            .data
            .pointer("/status/conditions")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn ready_condition(&self) -> Option<Condition> {
        self.conditions()
            .into_iter()
            .find(|c| c.type_ == READY_CONDITION)
    }

    /// Version Flux last deployed from this object
    pub fn deployed_version(&self) -> Option<&str> {
        let data = &self.object.data;
        data.pointer("/status/lastAppliedRevision")
            .or_else(|| data.pointer("/status/artifact/revision"))
            .and_then(|v| v.as_str())
    }

    /// `Ready=True`, and the deployed version equals `target` when one is given
    pub fn is_ready(&self, target: Option<&str>) -> bool {
        let condition_ready = self.ready_condition().is_some_and(|c| c.is_true());
        match target {
            Some(version) => condition_ready && self.deployed_version() == Some(version),
            None => condition_ready,
        }
    }

    /// Readiness snapshot for reporting
    pub fn readiness(&self, target: Option<&str>) -> ReadinessResult {
        let condition = self.ready_condition();
        let ready = self.is_ready(target);

        let message = match (&condition, ready) {
            (Some(c), true) if c.message.is_empty() => READY_CONDITION.to_string(),
            (Some(c), true) => c.message.clone(),
            (Some(c), false) if c.is_true() => format!(
                "deployed version {} does not match {}",
                self.deployed_version().unwrap_or("<none>"),
                target.unwrap_or_default()
            ),
            (Some(c), false) if c.message.is_empty() => format!("Ready={}", c.status),
            (Some(c), false) => c.message.clone(),
            (None, _) => "waiting for Ready condition".to_string(),
        };

        ReadinessResult {
            name: self.name().to_string(),
            kind: self.kind().to_string(),
            ready: ready.into(),
            message,
        }
    }

    /// `Kind/name` used to key resources across kinds
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    pub fn as_dynamic(&self) -> &DynamicObject {
        &self.object
    }

    pub fn into_dynamic(self) -> DynamicObject {
        self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fluxpreview_core::{KUSTOMIZATION, OCI_REPOSITORY};

    fn ks(name: &str) -> ManagedResource {
        ManagedResource::new(&KUSTOMIZATION, "flux-system", name)
    }

    #[test]
    fn test_new_resource_metadata() {
        let r = ks("pr-1").with_label("preview-deployment", "pr-1");
        assert_eq!(r.name(), "pr-1");
        assert_eq!(r.namespace(), Some("flux-system"));
        assert_eq!(r.kind(), "Kustomization");
        assert_eq!(r.descriptor().unwrap(), KUSTOMIZATION);
        assert_eq!(r.label("preview-deployment"), Some("pr-1"));
        assert_eq!(r.key(), "Kustomization/pr-1");
    }

    #[test]
    fn test_ready_condition_true() {
        let r = ks("pr-1").with_condition("Ready", "True", "Applied revision: main@sha1:abc");
        assert!(r.is_ready(None));
        let result = r.readiness(None);
        assert_eq!(result.ready, ReadyStatus::True);
        assert_eq!(result.message, "Applied revision: main@sha1:abc");
    }

    #[test]
    fn test_ready_without_message_reports_ready() {
        let r = ks("pr-1").with_condition("Ready", "True", "");
        assert_eq!(r.readiness(None).message, "Ready");
    }

    #[test]
    fn test_not_ready_and_missing_condition() {
        let r = ks("pr-1").with_condition("Ready", "False", "kustomize build failed");
        assert!(!r.is_ready(None));
        assert_eq!(r.readiness(None).message, "kustomize build failed");

        let bare = ks("pr-2");
        assert!(!bare.is_ready(None));
        assert_eq!(bare.readiness(None).ready, ReadyStatus::False);
        assert_eq!(bare.readiness(None).message, "waiting for Ready condition");
    }

    #[test]
    fn test_only_ready_condition_counts() {
        let r = ks("pr-1")
            .with_condition("Reconciling", "True", "working")
            .with_condition("Ready", "Unknown", "");
        assert_eq!(r.conditions().len(), 2);
        assert!(!r.is_ready(None));
        assert_eq!(r.readiness(None).message, "Ready=Unknown");
    }

    #[test]
    fn test_version_gated_readiness_is_exact() {
        let r = ks("pr-1")
            .with_condition("Ready", "True", "ok")
            .with_deployed_version("v1.2.0");
        assert!(r.is_ready(Some("v1.2.0")));
        assert!(!r.is_ready(Some("v1.2")));
        assert!(!r.is_ready(Some("1.2.0")));
        let result = r.readiness(Some("v1.3.0"));
        assert_eq!(result.ready, ReadyStatus::False);
        assert!(result.message.contains("v1.2.0"));
    }

    #[test]
    fn test_oci_repository_version_field() {
        let r = ManagedResource::new(&OCI_REPOSITORY, "flux-system", "pr-1")
            .with_condition("Ready", "True", "stored artifact")
            .with_deployed_version("sha256:abc");
        assert_eq!(r.deployed_version(), Some("sha256:abc"));
        assert!(r.is_ready(Some("sha256:abc")));
    }

    #[test]
    fn test_creation_timestamp() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let r = ks("pr-1").with_created(created);
        assert_eq!(r.creation_timestamp(), Some(created));
        assert!(r.age_seconds() > 0);
        assert_eq!(ks("pr-2").age_seconds(), 0);
    }

    #[test]
    fn test_readiness_result_serialization() {
        let result = ks("pr-1").with_condition("Ready", "True", "").readiness(None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "pr-1", "type": "Kustomization", "ready": "True", "message": "Ready"})
        );
    }

    #[test]
    fn test_roundtrip_from_yaml() {
        let yaml = r#"
apiVersion: kustomize.toolkit.fluxcd.io/v1
kind: Kustomization
metadata:
  name: pr-5
  namespace: flux-system
  labels:
    repository: acme-shop
status:
  lastAppliedRevision: v2
  conditions:
    - type: Ready
      status: "True"
      reason: ReconciliationSucceeded
      message: done
"#;
        let r: ManagedResource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(r.name(), "pr-5");
        assert_eq!(r.label("repository"), Some("acme-shop"));
        assert!(r.is_ready(Some("v2")));
    }
}
