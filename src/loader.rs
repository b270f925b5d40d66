use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::access::Access;
use crate::acl::{compare_acls, AclBuilder};
use crate::error::AuthzError;
use crate::groups::expand_groups;
use crate::lookup::FilteredCache;
use crate::model::AuthzModel;
use crate::rights::accumulate;
use crate::rule::compile_rule_path;
use crate::segment::PatternTable;

// Greedy up to the line's closing bracket, so rule paths may contain
// character classes like `[/tags/*.[ch]]`.
static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(.*)\]$").unwrap());

/// One `[section]` with its body lines, each tagged with its 1-based line
/// number.
struct Section {
    line: usize,
    header: String,
    entries: Vec<(usize, String, String)>,
}

/// Split a configuration stream into sections of `name = value` lines.
///
/// Lines are trimmed; empty lines and `#`/`;` comments are skipped. Any
/// other malformed line fails the parse with its line number.
fn parse_sections(text: &str) -> Result<Vec<Section>, AuthzError> {
    let mut sections: Vec<Section> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if trimmed.starts_with('[') {
            let Some(captures) = SECTION_RE.captures(trimmed) else {
                return Err(AuthzError::Syntax {
                    line,
                    reason: format!("malformed section header {trimmed:?}"),
                });
            };
            sections.push(Section {
                line,
                header: captures[1].to_string(),
                entries: Vec::new(),
            });
            continue;
        }
        let Some((name, value)) = trimmed.split_once('=') else {
            return Err(AuthzError::Syntax {
                line,
                reason: format!("expected 'name = value', found {trimmed:?}"),
            });
        };
        let name = name.trim_end();
        if name.is_empty() {
            return Err(AuthzError::Syntax {
                line,
                reason: "missing name before '='".to_string(),
            });
        }
        let Some(section) = sections.last_mut() else {
            return Err(AuthzError::Syntax {
                line,
                reason: format!("{name:?} appears outside of any section"),
            });
        };
        section
            .entries
            .push((line, name.to_string(), value.trim_start().to_string()));
    }
    Ok(sections)
}

fn collect_group_defs(section: &Section, defs: &mut HashMap<String, Vec<String>>) {
    for (_, name, value) in &section.entries {
        let members = value
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
        // Redefinition keeps the later entry, as for any repeated option.
        defs.insert(name.clone(), members);
    }
}

/// Parse an access-control configuration into an immutable [`AuthzModel`].
///
/// `rules` holds the rule blocks and may define `[groups]` and `[aliases]`
/// inline. When a separate `groups` stream is supplied it must carry the
/// only `[groups]` section, and the rules stream must have none. Any
/// syntax or semantic problem fails the whole parse; a partially resolved
/// model is never returned.
pub fn parse(rules: &str, groups: Option<&str>) -> Result<AuthzModel, AuthzError> {
    let mut group_defs: HashMap<String, Vec<String>> = HashMap::new();
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut blocks: Vec<Section> = Vec::new();

    for section in parse_sections(rules)? {
        match section.header.as_str() {
            "groups" => {
                if groups.is_some() {
                    return Err(AuthzError::Syntax {
                        line: section.line,
                        reason: "[groups] must live in the separate groups stream when one is \
                                 supplied"
                            .to_string(),
                    });
                }
                collect_group_defs(&section, &mut group_defs);
            }
            "aliases" => {
                for (_, name, value) in &section.entries {
                    if aliases.insert(name.clone(), value.clone()).is_some() {
                        return Err(AuthzError::DuplicateAlias(name.clone()));
                    }
                }
            }
            _ => blocks.push(section),
        }
    }

    if let Some(groups_text) = groups {
        for section in parse_sections(groups_text)? {
            if section.header != "groups" {
                return Err(AuthzError::Syntax {
                    line: section.line,
                    reason: format!(
                        "unexpected section [{}] in the groups stream",
                        section.header
                    ),
                });
            }
            collect_group_defs(&section, &mut group_defs);
        }
    }

    let expanded = expand_groups(&group_defs, &aliases)?;

    let mut table = PatternTable::new();
    let mut acls = Vec::with_capacity(blocks.len());
    for (sequence, block) in blocks.iter().enumerate() {
        let rule = compile_rule_path(&block.header, &mut table).map_err(|e| {
            AuthzError::Syntax {
                line: block.line,
                reason: e.to_string(),
            }
        })?;
        let mut builder = AclBuilder::new(sequence, rule, &expanded, &aliases);
        for (line, name, value) in &block.entries {
            let access: Access = value.parse().map_err(|e: AuthzError| AuthzError::Syntax {
                line: *line,
                reason: e.to_string(),
            })?;
            builder.add(*line, name, access)?;
        }
        acls.push(builder.build());
    }

    acls.sort_by(|a, b| compare_acls(&table, a, b));

    let rights = accumulate(&acls);

    info!(
        event = "Parse",
        phase = "Complete",
        acls = acls.len(),
        groups = expanded.len(),
        users = rights.users.len()
    );

    Ok(AuthzModel {
        acls,
        patterns: table,
        anon_rights: rights.anon,
        authn_rights: rights.authn,
        user_rights: rights.users,
        groups: expanded,
        cache: Mutex::new(FilteredCache::default()),
    })
}
