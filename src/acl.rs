use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strum_macros::{Display, EnumString};
use tracing::warn;

use crate::access::Access;
use crate::error::AuthzError;
use crate::groups::resolve_alias;
use crate::rule::{compare_rules, Rule};
use crate::segment::PatternTable;

/// Reserved identity classes usable as rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub(crate) enum ReservedName {
    /// `*`: every identity, anonymous and authenticated alike.
    #[strum(serialize = "*")]
    Everyone,
    #[strum(serialize = "$anonymous")]
    Anonymous,
    #[strum(serialize = "$authenticated")]
    Authenticated,
}

/// One access control entry: a user or group target, an optional inversion
/// ("everyone except the target"), and the access it grants.
#[derive(Debug, Clone)]
pub(crate) struct Ace {
    pub(crate) name: Box<str>,
    /// The flattened member set, present when the target is a group. Held
    /// here so group resolution at lookup time is a set probe, not a map
    /// walk.
    pub(crate) members: Option<Arc<HashSet<String>>>,
    pub(crate) inverted: bool,
    pub(crate) access: Access,
}

/// An access control list: one compiled rule path plus every entry defined
/// in its block, with duplicate targets already merged.
#[derive(Debug, Clone)]
pub(crate) struct Acl {
    /// Position of the block in file-definition order; the final tie-break
    /// between otherwise equivalent matches.
    pub(crate) sequence_number: usize,
    pub(crate) rule: Rule,
    pub(crate) anon_access: Option<Access>,
    pub(crate) authn_access: Option<Access>,
    pub(crate) entries: Vec<Ace>,
}

/// Builds one [`Acl`] from the body lines of a rule block.
pub(crate) struct AclBuilder<'a> {
    acl: Acl,
    groups: &'a HashMap<String, Arc<HashSet<String>>>,
    aliases: &'a HashMap<String, String>,
}

impl<'a> AclBuilder<'a> {
    pub(crate) fn new(
        sequence_number: usize,
        rule: Rule,
        groups: &'a HashMap<String, Arc<HashSet<String>>>,
        aliases: &'a HashMap<String, String>,
    ) -> Self {
        AclBuilder {
            acl: Acl {
                sequence_number,
                rule,
                anon_access: None,
                authn_access: None,
                entries: Vec::new(),
            },
            groups,
            aliases,
        }
    }

    /// Add one `name = access` line.
    ///
    /// Reserved names update the class accesses. Aliases are substituted,
    /// group references pick up their flattened member sets, and duplicate
    /// targets within the block merge by OR-ing their masks. When merged
    /// entries disagree on inversion the later flag wins; that is logged as
    /// a warning rather than failing the parse.
    pub(crate) fn add(&mut self, line: usize, name: &str, access: Access) -> Result<(), AuthzError> {
        if let Ok(reserved) = name.parse::<ReservedName>() {
            match reserved {
                ReservedName::Everyone => {
                    merge_access(&mut self.acl.anon_access, access);
                    merge_access(&mut self.acl.authn_access, access);
                }
                ReservedName::Anonymous => merge_access(&mut self.acl.anon_access, access),
                ReservedName::Authenticated => merge_access(&mut self.acl.authn_access, access),
            }
            return Ok(());
        }

        let (inverted, target) = match name.strip_prefix('~') {
            Some(rest) => {
                if rest.parse::<ReservedName>().is_ok() {
                    return Err(AuthzError::Syntax {
                        line,
                        reason: format!("reserved name {rest:?} cannot be inverted"),
                    });
                }
                (true, rest)
            }
            None => (false, name),
        };
        let target = match target.strip_prefix('&') {
            Some(alias) => resolve_alias(alias, self.aliases)?,
            None => target,
        };
        let (key, members) = match target.strip_prefix('@') {
            Some(group) => {
                let set = self
                    .groups
                    .get(group)
                    .ok_or_else(|| AuthzError::UnknownGroup(group.to_string()))?;
                (group, Some(Arc::clone(set)))
            }
            None => (target, None),
        };
        if key.is_empty() {
            return Err(AuthzError::Syntax {
                line,
                reason: format!("rule target {name:?} names nobody"),
            });
        }

        if let Some(existing) = self
            .acl
            .entries
            .iter_mut()
            .find(|e| e.name.as_ref() == key && e.members.is_some() == members.is_some())
        {
            existing.access |= access;
            if existing.inverted != inverted {
                warn!(
                    event = "Parse",
                    phase = "AclMerge",
                    line,
                    name = key,
                    "conflicting inversion flags for merged entries; the later one wins"
                );
                existing.inverted = inverted;
            }
        } else {
            self.acl.entries.push(Ace {
                name: key.into(),
                members,
                inverted,
                access,
            });
        }
        Ok(())
    }

    pub(crate) fn build(self) -> Acl {
        self.acl
    }
}

fn merge_access(slot: &mut Option<Access>, access: Access) {
    *slot = Some(slot.unwrap_or(Access::NONE) | access);
}

/// Does this ACL apply to lookups in `repos`?
pub(crate) fn applies_to_repos(acl: &Acl, repos: &str) -> bool {
    acl.rule.repos.is_empty() || acl.rule.repos.as_ref() == repos
}

/// Resolve the access this ACL defines for an identity, or `None` when the
/// ACL says nothing about it (so broader rules keep applying).
///
/// Precedence within one ACL: entries naming the user, then group entries
/// containing the user, then the `$authenticated` class, then the
/// `$anonymous` class. Inverted entries apply to the complement of their
/// target at the target's own tier. Entries at the winning tier OR
/// together. Anonymous identities see only the anonymous class.
pub(crate) fn access_for_identity(acl: &Acl, user: Option<&str>) -> Option<Access> {
    let Some(user) = user.filter(|u| !u.is_empty()) else {
        return acl.anon_access;
    };

    let mut user_tier: Option<Access> = None;
    let mut group_tier: Option<Access> = None;
    for ace in &acl.entries {
        match &ace.members {
            None => {
                if (ace.name.as_ref() == user) != ace.inverted {
                    merge_access(&mut user_tier, ace.access);
                }
            }
            Some(members) => {
                if members.contains(user) != ace.inverted {
                    merge_access(&mut group_tier, ace.access);
                }
            }
        }
    }

    user_tier
        .or(group_tier)
        .or(acl.authn_access)
        .or(acl.anon_access)
}

/// Full ACL ordering: rule precedence first, sequence number last.
///
/// Sorting the collection with this comparator yields lookup order; during
/// a lookup the same comparator decides pairwise precedence, with the
/// higher sequence number winning between ACLs whose rules compare equal.
pub(crate) fn compare_acls(table: &PatternTable, a: &Acl, b: &Acl) -> Ordering {
    compare_rules(table, &a.rule, &b.rule).then_with(|| a.sequence_number.cmp(&b.sequence_number))
}
