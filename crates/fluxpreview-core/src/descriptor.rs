//! Resource descriptors for the Flux kinds managed by fluxpreview
//!
//! A short reference such as `ks/pr-42` or `OCIRepository/pr-42` resolves to a
//! fully-qualified descriptor (group, version, plural, kind) plus the object name.
//! The alias table is fixed; anything outside it is an input error.

use std::fmt;

use crate::error::{CoreError, Result};

/// Fully-qualified type of a namespaced custom resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// API group (e.g. `kustomize.toolkit.fluxcd.io`)
    pub group: &'static str,
    /// API version within the group
    pub version: &'static str,
    /// Plural resource name used in API paths
    pub plural: &'static str,
    /// Kind as it appears in manifests
    pub kind: &'static str,
}

/// Flux reconciliation unit
pub const KUSTOMIZATION: ResourceDescriptor = ResourceDescriptor {
    group: "kustomize.toolkit.fluxcd.io",
    version: "v1",
    plural: "kustomizations",
    kind: "Kustomization",
};

/// Flux content source pointing at an OCI artifact
pub const OCI_REPOSITORY: ResourceDescriptor = ResourceDescriptor {
    group: "source.toolkit.fluxcd.io",
    version: "v1beta2",
    plural: "ocirepositories",
    kind: "OCIRepository",
};

/// Alias table, matched case-insensitively
const ALIASES: &[(&str, ResourceDescriptor)] = &[
    ("kustomization", KUSTOMIZATION),
    ("kustomizations", KUSTOMIZATION),
    ("ks", KUSTOMIZATION),
    ("ocirepository", OCI_REPOSITORY),
    ("ocirepositories", OCI_REPOSITORY),
    ("ocirepo", OCI_REPOSITORY),
];

impl ResourceDescriptor {
    /// `group/version` as used in `apiVersion`
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    /// Look up a type token in the alias table
    pub fn from_alias(token: &str) -> Result<Self> {
        let lowered = token.to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, descriptor)| *descriptor)
            .ok_or_else(|| CoreError::UnsupportedType {
                kind: token.to_string(),
                supported: supported_aliases(),
            })
    }

    /// Match a manifest `kind` (exact, as written by Flux)
    pub fn from_kind(kind: &str) -> Option<Self> {
        [KUSTOMIZATION, OCI_REPOSITORY]
            .into_iter()
            .find(|d| d.kind == kind)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plural, self.group)
    }
}

fn supported_aliases() -> String {
    ALIASES
        .iter()
        .map(|(alias, _)| *alias)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A resolved `<type>/<name>` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub descriptor: ResourceDescriptor,
    pub name: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.descriptor.kind, self.name)
    }
}

/// Resolve a short reference like `ks/my-thing` into a descriptor and name
pub fn resolve(reference: &str) -> Result<ResourceRef> {
    let invalid = || CoreError::InvalidReference {
        reference: reference.to_string(),
    };

    let parts: Vec<&str> = reference.trim().split('/').collect();
    let [kind, name] = parts.as_slice() else {
        return Err(invalid());
    };
    if kind.is_empty() || name.is_empty() {
        return Err(invalid());
    }

    Ok(ResourceRef {
        descriptor: ResourceDescriptor::from_alias(kind)?,
        name: (*name).to_string(),
    })
}
