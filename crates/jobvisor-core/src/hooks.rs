//! Setup and teardown hook filters.

use crate::id::JobIdentity;
use crate::job::JobFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Setup,
    Teardown,
}

/// Which jobs a hook applies to. `None` matches every value at that level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookScope {
    pub application: Option<String>,
    pub app: Option<String>,
    pub controller: Option<String>,
}

impl HookScope {
    /// Matches every job.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn application(mut self, name: impl Into<String>) -> Self {
        self.application = Some(name.into());
        self
    }

    pub fn app(mut self, name: impl Into<String>) -> Self {
        self.app = Some(name.into());
        self
    }

    pub fn controller(mut self, name: impl Into<String>) -> Self {
        self.controller = Some(name.into());
        self
    }

    pub fn matches(&self, identity: &JobIdentity) -> bool {
        fn level(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().is_none_or(|f| f == value)
        }

        level(&self.application, &identity.application)
            && level(&self.app, &identity.app)
            && level(&self.controller, &identity.controller)
    }
}

/// How far a hook declared by a controller reaches beyond that controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reach {
    pub all_applications: bool,
    pub all_apps: bool,
    pub all_controllers: bool,
}

impl Reach {
    /// Only the declaring controller's jobs.
    pub fn controller() -> Self {
        Self::default()
    }

    /// Every job in every application.
    pub fn everywhere() -> Self {
        Self {
            all_applications: true,
            all_apps: true,
            all_controllers: true,
        }
    }

    /// Build the scope for a hook declared from the given controller.
    pub(crate) fn scope_from(&self, application: &str, app: &str, controller: &str) -> HookScope {
        HookScope {
            application: (!self.all_applications).then(|| application.to_string()),
            app: (!self.all_apps).then(|| app.to_string()),
            controller: (!self.all_controllers).then(|| controller.to_string()),
        }
    }
}

#[derive(Clone)]
pub(crate) struct HookFilter {
    pub kind: HookKind,
    pub scope: HookScope,
    pub hook: JobFn,
}
