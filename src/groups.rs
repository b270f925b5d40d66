use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use itertools::Itertools;

use crate::error::AuthzError;

/// Follow an alias chain to its terminal token: a user name or `@group`.
///
/// Aliases may point at users, groups, or further aliases; chains terminate
/// or fail, they never loop.
pub(crate) fn resolve_alias<'a>(
    name: &str,
    aliases: &'a HashMap<String, String>,
) -> Result<&'a str, AuthzError> {
    let mut seen: Vec<&str> = vec![name];
    let mut current = aliases
        .get(name)
        .ok_or_else(|| AuthzError::UnknownAlias(name.to_string()))?;
    loop {
        let Some(next) = current.strip_prefix('&') else {
            return Ok(current);
        };
        if seen.contains(&next) {
            seen.push(next);
            return Err(AuthzError::Cycle(
                seen.iter().map(|n| format!("&{n}")).join(" -> "),
            ));
        }
        seen.push(next);
        current = aliases
            .get(next)
            .ok_or_else(|| AuthzError::UnknownAlias(next.to_string()))?;
    }
}

struct Frame<'a> {
    name: &'a str,
    members: &'a [String],
    next: usize,
    set: HashSet<String>,
}

/// Expand every group definition into a flat set of concrete user names.
///
/// Nested groups and aliases are followed with an explicit frame stack, so
/// adversarial nesting depth cannot exhaust the call stack. A group that is
/// reached again while still being expanded is a cycle and fails the parse
/// with the offending chain; unknown references fail likewise.
pub(crate) fn expand_groups(
    defs: &HashMap<String, Vec<String>>,
    aliases: &HashMap<String, String>,
) -> Result<HashMap<String, Arc<HashSet<String>>>, AuthzError> {
    let mut done: HashMap<String, Arc<HashSet<String>>> = HashMap::with_capacity(defs.len());

    for name in defs.keys().sorted() {
        if done.contains_key(name) {
            continue;
        }
        let mut stack = vec![Frame {
            name,
            members: &defs[name],
            next: 0,
            set: HashSet::new(),
        }];
        while let Some(top) = stack.len().checked_sub(1) {
            let raw = {
                let frame = &mut stack[top];
                if frame.next < frame.members.len() {
                    let raw = frame.members[frame.next].as_str();
                    frame.next += 1;
                    Some(raw)
                } else {
                    None
                }
            };
            let Some(raw) = raw else {
                // Frame complete: publish its set and fold it into the parent.
                if let Some(frame) = stack.pop() {
                    let set = Arc::new(frame.set);
                    if let Some(parent) = stack.last_mut() {
                        parent.set.extend(set.iter().cloned());
                    }
                    done.insert(frame.name.to_string(), set);
                }
                continue;
            };
            // Aliases are substituted before group expansion.
            let token = match raw.strip_prefix('&') {
                Some(alias) => resolve_alias(alias, aliases)?,
                None => raw,
            };
            let Some(sub) = token.strip_prefix('@') else {
                stack[top].set.insert(token.to_string());
                continue;
            };
            if let Some(set) = done.get(sub) {
                let members: Vec<String> = set.iter().cloned().collect();
                stack[top].set.extend(members);
                continue;
            }
            let members = defs
                .get(sub)
                .ok_or_else(|| AuthzError::UnknownGroup(sub.to_string()))?;
            if stack.iter().any(|f| f.name == sub) {
                let chain = stack
                    .iter()
                    .map(|f| format!("@{}", f.name))
                    .chain([format!("@{sub}")])
                    .join(" -> ");
                return Err(AuthzError::Cycle(chain));
            }
            stack.push(Frame {
                name: sub,
                members,
                next: 0,
                set: HashSet::new(),
            });
        }
    }
    Ok(done)
}
