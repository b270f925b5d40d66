use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use itertools::Itertools;

use crate::access::Access;
use crate::acl::Acl;
use crate::lookup::{self, FilteredCache};
use crate::rights::GlobalRights;
use crate::segment::PatternTable;

/// The immutable authorization model built by [`parse`](crate::parse).
///
/// Everything reachable from the model is read-only for its lifetime and
/// can be shared across concurrent lookup callers without locking; the one
/// exception is the internal filtered-rule cache, which is synchronized on
/// its own and can only change the cost of a lookup, never its result. The
/// model is replaced as a whole when the configuration is reloaded.
#[derive(Debug)]
pub struct AuthzModel {
    pub(crate) acls: Vec<Acl>,
    pub(crate) patterns: PatternTable,
    pub(crate) anon_rights: Option<GlobalRights>,
    pub(crate) authn_rights: Option<GlobalRights>,
    pub(crate) user_rights: HashMap<String, GlobalRights>,
    pub(crate) groups: HashMap<String, Arc<HashSet<String>>>,
    pub(crate) cache: Mutex<FilteredCache>,
}

impl AuthzModel {
    /// The access `user` has to `path` in `repos`.
    ///
    /// `None` (or an empty string) is the anonymous identity. Unknown
    /// users, repositories, and paths are not errors; they resolve to
    /// whatever the rules say, down to no access at all. Repeated calls
    /// with identical inputs return identical results.
    pub fn access_for(&self, user: Option<&str>, repos: &str, path: &str) -> Access {
        let filtered = lookup::filtered_rules(&self.cache, &self.acls, user, repos);
        lookup::access_for(&self.patterns, &self.acls, &filtered, user, path)
    }

    /// Can `user` reach any access at all somewhere in `repos`?
    ///
    /// Answered from the pre-computed global bounds without walking any
    /// path, for bulk pre-checks ahead of per-path lookups. An empty
    /// `repos` asks across every repository.
    pub fn has_any_access(&self, user: Option<&str>, repos: &str) -> bool {
        let user = user.filter(|u| !u.is_empty());
        let mut max = Access::NONE;
        if let Some(anon) = &self.anon_rights {
            max |= anon.max_access(repos);
        }
        if let Some(user) = user {
            if let Some(authn) = &self.authn_rights {
                max |= authn.max_access(repos);
            }
            if let Some(rights) = self.user_rights.get(user) {
                max |= rights.max_access(repos);
            }
        }
        !max.is_empty()
    }

    /// Pre-computed global access bounds for a concrete user, when any rule
    /// mentions them.
    pub fn global_rights(&self, user: &str) -> Option<&GlobalRights> {
        self.user_rights.get(user)
    }

    /// The fully expanded member set of a named group.
    pub fn group_members(&self, group: &str) -> Option<&HashSet<String>> {
        self.groups.get(group).map(Arc::as_ref)
    }

    /// Every defined group name, sorted.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).sorted().collect()
    }

    /// Every concrete user mentioned by the rules, sorted.
    pub fn known_users(&self) -> Vec<&str> {
        self.user_rights.keys().map(String::as_str).sorted().collect()
    }

    /// Number of compiled ACLs in the model.
    pub fn acl_count(&self) -> usize {
        self.acls.len()
    }
}
