//! Job identity and its stable hash.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::JobError;

/// The four names that identify a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobIdentity {
    pub application: String,
    pub app: String,
    pub controller: String,
    pub name: String,
}

impl JobIdentity {
    /// Create an identity. Every component must be non-empty.
    pub fn new(
        application: impl Into<String>,
        app: impl Into<String>,
        controller: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, JobError> {
        let identity = Self {
            application: application.into(),
            app: app.into(),
            controller: controller.into(),
            name: name.into(),
        };

        for (field, value) in [
            ("application", &identity.application),
            ("app", &identity.app),
            ("controller", &identity.controller),
            ("name", &identity.name),
        ] {
            if value.trim().is_empty() {
                return Err(JobError::InvalidIdentity(format!("{field} must not be empty")));
            }
        }

        Ok(identity)
    }

    /// Hash this identity.
    pub fn id(&self) -> JobId {
        JobId::from_parts(&self.application, &self.app, &self.controller, &self.name)
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.application, self.app, self.controller, self.name
        )
    }
}

/// Deterministic identifier derived from a [`JobIdentity`].
///
/// Each component is length-prefixed before hashing, so `("ab", "c")` and
/// `("a", "bc")` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    const DIGEST_BYTES: usize = 16;

    /// Hash the four identity components.
    pub fn from_parts(application: &str, app: &str, controller: &str, name: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [application, app, controller, name] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        JobId(hex::encode(&digest[..Self::DIGEST_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = JobId::from_parts("A", "app1", "Ctrl1", "Sync-Report");
        let b = JobId::from_parts("A", "app1", "Ctrl1", "Sync-Report");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_id_differs_per_component() {
        let base = JobId::from_parts("A", "app1", "Ctrl1", "Job");
        assert_ne!(base, JobId::from_parts("B", "app1", "Ctrl1", "Job"));
        assert_ne!(base, JobId::from_parts("A", "app2", "Ctrl1", "Job"));
        assert_ne!(base, JobId::from_parts("A", "app1", "Ctrl2", "Job"));
        assert_ne!(base, JobId::from_parts("A", "app1", "Ctrl1", "Job2"));
    }

    #[test]
    fn test_id_component_boundaries() {
        let a = JobId::from_parts("ab", "c", "d", "e");
        let b = JobId::from_parts("a", "bc", "d", "e");
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_rejects_empty_component() {
        let err = JobIdentity::new("A", "", "Ctrl1", "Job").unwrap_err();
        assert!(err.to_string().contains("app"));
        assert!(JobIdentity::new("A", "app1", "Ctrl1", "  ").is_err());
    }

    #[test]
    fn test_identity_id_matches_parts() {
        let identity = JobIdentity::new("A", "app1", "Ctrl1", "Job").unwrap();
        assert_eq!(identity.id(), JobId::from_parts("A", "app1", "Ctrl1", "Job"));
        assert_eq!(identity.to_string(), "A/app1/Ctrl1/Job");
    }
}
