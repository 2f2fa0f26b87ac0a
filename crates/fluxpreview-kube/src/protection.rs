//! Protection policy seam
//!
//! Whether a preview is protected is decided per call by an external lookup
//! (a "keep" label on the originating pull request). The lookup never blocks
//! teardown: any failure counts as unprotected.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a protection lookup could not answer
#[derive(Debug, Error)]
pub enum ProtectionError {
    /// No credentials configured, so the check is disabled
    #[error("no token configured for protection lookup")]
    MissingToken,

    #[error("protection lookup failed: {0}")]
    Lookup(String),
}

/// Answers whether a change request carries the protection marker
#[async_trait]
pub trait ProtectionLookup: Send + Sync {
    async fn has_marker(&self, subject_id: u64) -> Result<bool, ProtectionError>;
}

/// Lookup that protects nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProtection;

#[async_trait]
impl ProtectionLookup for NoProtection {
    async fn has_marker(&self, _subject_id: u64) -> Result<bool, ProtectionError> {
        Ok(false)
    }
}

/// Resolve protection, failing open
pub async fn is_protected(lookup: &dyn ProtectionLookup, subject_id: u64) -> bool {
    match lookup.has_marker(subject_id).await {
        Ok(protected) => protected,
        Err(ProtectionError::MissingToken) => {
            debug!(subject_id, "no token for protection lookup, treating as unprotected");
            false
        }
        Err(e) => {
            warn!(subject_id, error = %e, "protection lookup failed, treating as unprotected");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeSet;

    /// Lookup with a fixed answer per subject
    #[derive(Debug, Default)]
    pub struct StaticProtection {
        pub protected: BTreeSet<u64>,
        pub fail_with: Option<String>,
        pub missing_token: bool,
    }

    #[async_trait]
    impl ProtectionLookup for StaticProtection {
        async fn has_marker(&self, subject_id: u64) -> Result<bool, ProtectionError> {
            if self.missing_token {
                return Err(ProtectionError::MissingToken);
            }
            if let Some(message) = &self.fail_with {
                return Err(ProtectionError::Lookup(message.clone()));
            }
            Ok(self.protected.contains(&subject_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticProtection;
    use super::*;

    #[tokio::test]
    async fn test_marker_present() {
        let lookup = StaticProtection {
            protected: [42].into_iter().collect(),
            ..Default::default()
        };
        assert!(is_protected(&lookup, 42).await);
        assert!(!is_protected(&lookup, 7).await);
    }

    #[tokio::test]
    async fn test_failures_fail_open() {
        let failing = StaticProtection {
            protected: [42].into_iter().collect(),
            fail_with: Some("rate limited".to_string()),
            ..Default::default()
        };
        assert!(!is_protected(&failing, 42).await);

        let no_token = StaticProtection {
            missing_token: true,
            ..Default::default()
        };
        assert!(!is_protected(&no_token, 42).await);
        assert!(!is_protected(&NoProtection, 42).await);
    }
}
