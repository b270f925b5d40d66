use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::access::Access;
use crate::error::AuthzError;
use crate::loader;
use crate::model::AuthzModel;

/// The main engine handle. Cloneable and thread-safe.
///
/// Wraps one parsed [`AuthzModel`] and swaps it atomically on reload, so
/// long-lived server components can keep a handle while the configuration
/// changes underneath them.
#[derive(Clone)]
pub struct AuthzEngine {
    inner: Arc<RwLock<AuthzModel>>,
}

impl AuthzEngine {
    /// Parse `rules` (and an optional separate groups stream) into a fresh
    /// engine.
    pub fn new_from_str(rules: &str, groups: Option<&str>) -> Result<Self, AuthzError> {
        let model = loader::parse(rules, groups)?;
        Ok(AuthzEngine {
            inner: Arc::new(RwLock::new(model)),
        })
    }

    /// Re-parse and replace the model. On error the previous model stays in
    /// effect, so callers can keep serving with the configuration they had.
    pub fn reload_from_str(&self, rules: &str, groups: Option<&str>) -> Result<(), AuthzError> {
        let model = loader::parse(rules, groups)?;
        info!(event = "Reload", acls = model.acl_count());
        *self.inner.write()? = model;
        Ok(())
    }

    /// The access `user` has to `path` in `repos`. See
    /// [`AuthzModel::access_for`].
    pub fn access_for(
        &self,
        user: Option<&str>,
        repos: &str,
        path: &str,
    ) -> Result<Access, AuthzError> {
        debug!(
            event = "Request",
            phase = "Lookup",
            user = user.unwrap_or("$anonymous"),
            repos,
            path
        );
        let guard = self.inner.read()?;
        let access = guard.access_for(user, repos, path);
        debug!(event = "Request", phase = "Result", access = %access);
        Ok(access)
    }

    /// Bulk pre-check over the pre-computed global bounds. See
    /// [`AuthzModel::has_any_access`].
    pub fn has_any_access(&self, user: Option<&str>, repos: &str) -> Result<bool, AuthzError> {
        let guard = self.inner.read()?;
        Ok(guard.has_any_access(user, repos))
    }
}
