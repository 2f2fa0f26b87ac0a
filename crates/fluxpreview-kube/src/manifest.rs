//! Multi-document manifest parsing

use kube::api::DynamicObject;

use crate::error::{KubeError, Result};
use crate::resource::ManagedResource;

/// Parse every document into a managed resource
///
/// Empty and comment-only documents are skipped. Documents without a
/// namespace land in `default_namespace`. Only Flux Kustomizations and
/// OCIRepositories at their supported API versions are accepted.
pub fn parse_manifests(content: &str, default_namespace: &str) -> Result<Vec<ManagedResource>> {
    let mut resources = Vec::new();

    for (idx, doc) in split_documents(content).into_iter().enumerate() {
        let value: serde_yaml::Value = serde_yaml::from_str(doc)
            .map_err(|e| KubeError::InvalidResource(format!("document {}: {}", idx + 1, e)))?;
        if value.is_null() {
            continue;
        }

        let mut object: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| KubeError::InvalidResource(format!("document {}: {}", idx + 1, e)))?;
        if object.metadata.namespace.is_none() {
            object.metadata.namespace = Some(default_namespace.to_string());
        }

        let resource = ManagedResource::from(object);
        let descriptor = resource.descriptor()?;
        let api_version = resource
            .as_dynamic()
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or_default();
        if api_version != descriptor.api_version() {
            return Err(KubeError::InvalidResource(format!(
                "{} uses apiVersion '{}', expected '{}'",
                resource.key(),
                api_version,
                descriptor.api_version()
            )));
        }
        if resource.name().is_empty() {
            return Err(KubeError::InvalidResource(format!(
                "document {}: {} is missing metadata.name",
                idx + 1,
                descriptor.kind
            )));
        }

        resources.push(resource);
    }

    Ok(resources)
}

/// Split on `---` separator lines
fn split_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter().filter(|d| !d.trim().is_empty()).collect()
}
