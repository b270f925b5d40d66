use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::access::Access;
use crate::acl::{access_for_identity, applies_to_repos, Acl};
use crate::rule::compare_rules;
use crate::segment::{PatternTable, Segment, SegmentKind};

/// Number of (user, repository) pairs whose filtered rule set is cached.
///
/// Connections usually touch one repository with one identity plus the
/// anonymous fallback, so a handful of slots already gives high locality.
pub(crate) const FILTERED_CACHE_SIZE: usize = 4;

#[derive(Debug)]
struct CacheSlot {
    user: Option<String>,
    repos: String,
    filtered: Arc<Vec<u32>>,
}

/// Fixed-capacity cache of pre-filtered rule sets, keyed by
/// (user, repository). Eviction is round-robin over the slots; this is a
/// cost optimization only and can never change a lookup's result.
#[derive(Debug, Default)]
pub(crate) struct FilteredCache {
    slots: [Option<CacheSlot>; FILTERED_CACHE_SIZE],
    next_victim: usize,
}

impl FilteredCache {
    fn get(&self, user: Option<&str>, repos: &str) -> Option<Arc<Vec<u32>>> {
        self.slots.iter().flatten().find_map(|slot| {
            (slot.user.as_deref() == user && slot.repos == repos)
                .then(|| Arc::clone(&slot.filtered))
        })
    }

    fn insert(&mut self, user: Option<&str>, repos: &str, filtered: Arc<Vec<u32>>) {
        self.slots[self.next_victim] = Some(CacheSlot {
            user: user.map(str::to_string),
            repos: repos.to_string(),
            filtered,
        });
        self.next_victim = (self.next_victim + 1) % FILTERED_CACHE_SIZE;
    }
}

// Slots are written whole under the lock, so even a poisoned mutex still
// guards a consistent cache; recovering it trades nothing but staleness.
fn lock(cache: &Mutex<FilteredCache>) -> MutexGuard<'_, FilteredCache> {
    cache
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The sorted indices of every ACL that can affect lookups for this
/// (user, repository) pair, served from the cache when warm.
pub(crate) fn filtered_rules(
    cache: &Mutex<FilteredCache>,
    acls: &[Acl],
    user: Option<&str>,
    repos: &str,
) -> Arc<Vec<u32>> {
    let user = user.filter(|u| !u.is_empty());
    if let Some(hit) = lock(cache).get(user, repos) {
        return hit;
    }
    let filtered: Arc<Vec<u32>> = Arc::new(
        acls.iter()
            .enumerate()
            .filter(|(_, acl)| {
                applies_to_repos(acl, repos) && access_for_identity(acl, user).is_some()
            })
            .map(|(index, _)| index as u32)
            .collect(),
    );
    lock(cache).insert(user, repos, Arc::clone(&filtered));
    filtered
}

/// Match a rule's segment patterns against a whole path.
///
/// `**` consumes zero or more segments: the match succeeds if any suffix of
/// the remaining path satisfies the rest of the patterns.
pub(crate) fn matches_path(table: &PatternTable, patterns: &[Segment], segments: &[&str]) -> bool {
    match patterns.split_first() {
        None => segments.is_empty(),
        Some((first, rest)) if first.kind == SegmentKind::AnyRecursive => (0..=segments.len())
            .any(|skip| matches_path(table, rest, &segments[skip..])),
        Some((first, rest)) => match segments.split_first() {
            Some((segment, tail)) => {
                first.matches(table, segment) && matches_path(table, rest, tail)
            }
            None => false,
        },
    }
}

/// True when `a` outranks `b` for lookup: rule precedence first, and the
/// later-defined ACL between equivalent rules.
fn outranks(table: &PatternTable, a: &Acl, b: &Acl) -> bool {
    match compare_rules(table, &a.rule, &b.rule) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a.sequence_number > b.sequence_number,
    }
}

/// The depth at which a rule takes effect for this path: the shallowest
/// queried prefix its segment patterns match. A rule governs the subtree
/// below that point, so a `**` rule roots at its ancestor and any explicit
/// deeper rule overrides it.
fn match_depth(table: &PatternTable, patterns: &[Segment], segments: &[&str]) -> Option<usize> {
    (0..=segments.len()).find(|&depth| matches_path(table, patterns, &segments[..depth]))
}

/// Resolve the effective access for one (user, path) query over a filtered
/// candidate set.
///
/// Every candidate is placed at the depth where it takes effect for this
/// path; the deepest depth decides, breaking ties with [`outranks`]. No
/// match at any depth is no access.
pub(crate) fn access_for(
    table: &PatternTable,
    acls: &[Acl],
    filtered: &[u32],
    user: Option<&str>,
    path: &str,
) -> Access {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut best: Option<(usize, &Acl)> = None;
    for &index in filtered {
        let acl = &acls[index as usize];
        let Some(depth) = match_depth(table, &acl.rule.segments, &segments) else {
            continue;
        };
        best = Some(match best {
            Some((best_depth, current))
                if best_depth > depth
                    || (best_depth == depth && outranks(table, current, acl)) =>
            {
                (best_depth, current)
            }
            _ => (depth, acl),
        });
    }
    match best {
        Some((_, acl)) => access_for_identity(acl, user).unwrap_or(Access::NONE),
        None => Access::NONE,
    }
}
