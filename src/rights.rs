use std::collections::HashMap;

use crate::access::Access;
use crate::acl::Acl;

/// Lower and upper bound on the access an identity can reach.
///
/// `min_access` is the access guaranteed by every rule mentioning the
/// identity; `max_access` is the access reachable anywhere. Folding keeps
/// `min_access <= max_access` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rights {
    pub min_access: Access,
    pub max_access: Access,
}

impl Rights {
    fn new(access: Access) -> Self {
        Rights {
            min_access: access,
            max_access: access,
        }
    }

    fn combine(&mut self, access: Access) {
        self.min_access &= access;
        self.max_access |= access;
    }

    fn merged(a: Option<Rights>, b: Option<Rights>) -> Option<Rights> {
        match (a, b) {
            (Some(mut a), Some(b)) => {
                a.min_access &= b.min_access;
                a.max_access |= b.max_access;
                Some(a)
            }
            (a, b) => a.or(b),
        }
    }
}

/// Accumulated rights for one identity across the whole model, bucketed the
/// way lookups ask for them: rules that name no repository, rules per named
/// repository, and everything taken together.
#[derive(Debug, Clone, Default)]
pub struct GlobalRights {
    any_repos: Option<Rights>,
    per_repos: HashMap<String, Rights>,
    all_repos: Option<Rights>,
}

impl GlobalRights {
    fn record(&mut self, repos: &str, access: Access) {
        combine_slot(&mut self.all_repos, access);
        if repos.is_empty() {
            combine_slot(&mut self.any_repos, access);
        } else {
            self.per_repos
                .entry(repos.to_string())
                .and_modify(|r| r.combine(access))
                .or_insert_with(|| Rights::new(access));
        }
    }

    /// The bounds applying to lookups in `repos`; an empty name means "any
    /// repository" and returns the overall bounds.
    pub fn rights_for(&self, repos: &str) -> Option<Rights> {
        if repos.is_empty() {
            return self.all_repos;
        }
        Rights::merged(self.any_repos, self.per_repos.get(repos).copied())
    }

    /// Highest access reachable in `repos`, `Access::NONE` when the
    /// identity is mentioned nowhere relevant.
    pub fn max_access(&self, repos: &str) -> Access {
        self.rights_for(repos)
            .map(|r| r.max_access)
            .unwrap_or(Access::NONE)
    }
}

fn combine_slot(slot: &mut Option<Rights>, access: Access) {
    match slot {
        Some(rights) => rights.combine(access),
        None => *slot = Some(Rights::new(access)),
    }
}

/// Everything the accumulator derives from one pass over the ACLs.
pub(crate) struct ModelRights {
    pub(crate) anon: Option<GlobalRights>,
    pub(crate) authn: Option<GlobalRights>,
    pub(crate) users: HashMap<String, GlobalRights>,
}

/// Single pass over the compiled ACL collection, widening each mentioned
/// identity's bounds and the anonymous/authenticated class aggregates.
///
/// Group entries propagate their access to every member of the flattened
/// set. Inverted entries can apply to all but one identity, so they fold
/// into the authenticated-class aggregate instead of being attributed per
/// user; that keeps the aggregate a sound upper bound for bulk checks.
pub(crate) fn accumulate(acls: &[Acl]) -> ModelRights {
    let mut anon: Option<GlobalRights> = None;
    let mut authn: Option<GlobalRights> = None;
    let mut users: HashMap<String, GlobalRights> = HashMap::new();

    for acl in acls {
        let repos = acl.rule.repos.as_ref();
        if let Some(access) = acl.anon_access {
            anon.get_or_insert_with(GlobalRights::default)
                .record(repos, access);
        }
        if let Some(access) = acl.authn_access {
            authn
                .get_or_insert_with(GlobalRights::default)
                .record(repos, access);
        }
        for ace in &acl.entries {
            if ace.inverted {
                authn
                    .get_or_insert_with(GlobalRights::default)
                    .record(repos, ace.access);
            } else if let Some(members) = &ace.members {
                for user in members.iter() {
                    users
                        .entry(user.clone())
                        .or_default()
                        .record(repos, ace.access);
                }
            } else {
                users
                    .entry(ace.name.to_string())
                    .or_default()
                    .record(repos, ace.access);
            }
        }
    }

    ModelRights { anon, authn, users }
}
