//! Load-bearing labels and label selectors
//!
//! Kustomizations and OCIRepositories created for a preview carry the same
//! label set. There is no structural reference between the two kinds, so the
//! shared `preview-deployment` value is the only way to correlate them.

use std::collections::BTreeMap;
use std::fmt;

/// Name of the preview (one per pull request / change)
pub const PREVIEW_DEPLOYMENT_LABEL: &str = "preview-deployment";

/// Originating change reference, e.g. `pr-42`
pub const CI_REFERENCE_LABEL: &str = "ci-reference";

/// Repository identity, used to scope bulk cleanup
pub const REPOSITORY_LABEL: &str = "repository";

/// Deployment environment
pub const ENVIRONMENT_LABEL: &str = "environment";

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Label key/value pair shared by a Kustomization and its content source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub key: String,
    pub value: String,
}

impl CorrelationKey {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Correlation by preview name
    pub fn preview(name: impl Into<String>) -> Self {
        Self::new(PREVIEW_DEPLOYMENT_LABEL, name)
    }

    /// Correlation by repository identity (`owner/repo` is sanitized)
    pub fn repository(repository: &str) -> Self {
        Self::new(REPOSITORY_LABEL, sanitize_label_value(repository))
    }

    /// Read the correlation value of `key` from a label map
    pub fn from_labels(key: &str, labels: &BTreeMap<String, String>) -> Option<Self> {
        labels.get(key).map(|v| Self::new(key, v.clone()))
    }

    pub fn selector(&self) -> LabelSelector {
        LabelSelector::new().with(&self.key, &self.value)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Equality-based label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an `key=value` requirement
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether a label map satisfies every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Turn an arbitrary string into a valid label value
///
/// `Org/Repo.Name` becomes `org-repo.name`.
pub fn sanitize_label_value(raw: &str) -> String {
    let mapped: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let truncated: String = mapped.chars().take(MAX_LABEL_VALUE_LEN).collect();
    truncated
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Extract the numeric subject id from a `ci-reference` value
///
/// Accepts `pr-42`, `PR-42`, `#42` and `42`.
pub fn subject_id_from_reference(reference: &str) -> Option<u64> {
    let trimmed = reference.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let digits = lowered
        .strip_prefix("pr-")
        .or_else(|| lowered.strip_prefix('#'))
        .unwrap_or(&lowered);
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_display_is_sorted() {
        let sel = LabelSelector::new()
            .with(REPOSITORY_LABEL, "acme-shop")
            .with(ENVIRONMENT_LABEL, "preview");
        assert_eq!(sel.to_string(), "environment=preview,repository=acme-shop");
    }

    #[test]
    fn test_selector_matches() {
        let sel = CorrelationKey::preview("pr-42").selector();
        assert!(sel.matches(&labels(&[("preview-deployment", "pr-42"), ("x", "y")])));
        assert!(!sel.matches(&labels(&[("preview-deployment", "pr-43")])));
        assert!(!sel.matches(&labels(&[])));
        assert!(LabelSelector::new().matches(&labels(&[])));
    }

    #[test]
    fn test_correlation_from_labels() {
        let l = labels(&[("preview-deployment", "pr-9")]);
        let key = CorrelationKey::from_labels(PREVIEW_DEPLOYMENT_LABEL, &l).unwrap();
        assert_eq!(key, CorrelationKey::preview("pr-9"));
        assert_eq!(key.to_string(), "preview-deployment=pr-9");
        assert!(CorrelationKey::from_labels(REPOSITORY_LABEL, &l).is_none());
    }

    #[test]
    fn test_sanitize_label_value() {
        assert_eq!(sanitize_label_value("Acme/Shop.Web"), "acme-shop.web");
        assert_eq!(sanitize_label_value("--weird--"), "weird");
        let long = "a".repeat(80);
        assert_eq!(sanitize_label_value(&long).len(), 63);
        assert_eq!(CorrelationKey::repository("acme/shop").value, "acme-shop");
    }

    #[test]
    fn test_subject_id_from_reference() {
        assert_eq!(subject_id_from_reference("pr-42"), Some(42));
        assert_eq!(subject_id_from_reference("PR-7"), Some(7));
        assert_eq!(subject_id_from_reference("#13"), Some(13));
        assert_eq!(subject_id_from_reference("99"), Some(99));
        assert_eq!(subject_id_from_reference("main"), None);
    }
}
