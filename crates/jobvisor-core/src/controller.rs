//! User-facing declaration traits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::JobError;
use crate::registry::Registrar;

/// Where a controller lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerIdentity {
    pub application: String,
    pub app: String,
    pub controller: String,
}

impl ControllerIdentity {
    pub fn new(
        application: impl Into<String>,
        app: impl Into<String>,
        controller: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            app: app.into(),
            controller: controller.into(),
        }
    }
}

impl fmt::Display for ControllerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.application, self.app, self.controller)
    }
}

/// A unit of user code that declares jobs.
#[async_trait]
pub trait Controller: Send + Sync {
    fn identity(&self) -> ControllerIdentity;

    /// Declare jobs, workers and hooks. The default declares nothing.
    async fn jobs(&self, _registrar: &mut Registrar<'_>) -> Result<(), JobError> {
        debug!("No jobs configured in {}", self.identity());
        Ok(())
    }
}

/// The host application: a named set of controllers.
pub trait Application: Send + Sync {
    fn name(&self) -> &str;

    fn controllers(&self) -> Vec<Arc<dyn Controller>>;
}
