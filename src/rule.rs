use std::cmp::Ordering;

use crate::error::AuthzError;
use crate::segment::{classify, PatternTable, Segment};

/// Rules with this repository name apply to every repository.
pub(crate) const ANY_REPOSITORY: &str = "";

/// A compiled rule path: an optional repository qualifier plus the ordered
/// segment patterns. Zero segments denotes the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rule {
    pub(crate) repos: Box<str>,
    pub(crate) segments: Vec<Segment>,
}

/// Compile one rule-path token (a section header without the brackets) into
/// a [`Rule`], interning every segment pattern in `table`.
///
/// Accepted forms are `/path`, `repo:/path`, and either of those behind a
/// leading `:glob:` marker. The marker is stripped and otherwise inert;
/// wildcard detection is automatic for every path.
pub(crate) fn compile_rule_path(token: &str, table: &mut PatternTable) -> Result<Rule, AuthzError> {
    let stripped = token.strip_prefix(":glob:").unwrap_or(token);
    let (repos, path) = match stripped.find(':') {
        Some(colon) if colon > 0 && !stripped[..colon].contains('/') => {
            (&stripped[..colon], &stripped[colon + 1..])
        }
        _ => (ANY_REPOSITORY, stripped),
    };
    if !path.starts_with('/') {
        return Err(AuthzError::InvalidRulePath {
            path: token.to_string(),
            reason: "rule path must start with '/'".to_string(),
        });
    }

    let mut segments = Vec::new();
    for raw in path.split('/').filter(|s| !s.is_empty()) {
        let (kind, text) = classify(raw)?;
        let pattern = table.intern(kind, &text)?;
        segments.push(Segment { kind, pattern });
    }
    Ok(Rule {
        repos: repos.into(),
        segments,
    })
}

/// Compare two rules in lookup order: path first, then repository.
///
/// Segments compare positionally by kind precedence (literal before any
/// pattern kind) and then by pattern text; a rule that is a prefix of
/// another sorts first. Rules naming a repository outrank the
/// any-repository form, then repositories compare lexically. Callers break
/// remaining ties with the ACL sequence number.
pub(crate) fn compare_rules(table: &PatternTable, a: &Rule, b: &Rule) -> Ordering {
    for (sa, sb) in a.segments.iter().zip(&b.segments) {
        let ord = sa
            .kind
            .cmp(&sb.kind)
            .then_with(|| table.text(sa.pattern).cmp(table.text(sb.pattern)));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.segments
        .len()
        .cmp(&b.segments.len())
        .then_with(|| compare_repos(&a.repos, &b.repos))
}

fn compare_repos(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentKind;
    use yare::parameterized;

    fn compile(table: &mut PatternTable, token: &str) -> Rule {
        compile_rule_path(token, table).unwrap()
    }

    #[parameterized(
        root = { "/", "", 0 },
        plain = { "/trunk/src", "", 2 },
        repo_qualified = { "calc:/trunk", "calc", 1 },
        repo_root = { "calc:/", "calc", 0 },
        glob_marker = { ":glob:/trunk/**", "", 2 },
        glob_marker_with_repo = { ":glob:calc:/trunk", "calc", 1 },
        doubled_separator = { "/trunk//src/", "", 2 },
        colon_inside_segment = { "/a:b/c", "", 2 },
    )]
    fn compile_paths(token: &str, repos: &str, segments: usize) {
        let mut table = PatternTable::new();
        let rule = compile(&mut table, token);
        assert_eq!(rule.repos.as_ref(), repos);
        assert_eq!(rule.segments.len(), segments);
    }

    #[parameterized(
        relative = { "trunk/src" },
        repo_without_slash = { "calc:trunk" },
        empty = { "" },
    )]
    fn compile_rejects_paths_without_leading_slash(token: &str) {
        let mut table = PatternTable::new();
        match compile_rule_path(token, &mut table) {
            Err(AuthzError::InvalidRulePath { .. }) => {}
            other => panic!("expected InvalidRulePath, got {other:?}"),
        }
    }

    #[test]
    fn compile_classifies_each_segment() {
        let mut table = PatternTable::new();
        let rule = compile(&mut table, "/trunk/release-*/**");
        let kinds: Vec<SegmentKind> = rule.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Literal,
                SegmentKind::Prefix,
                SegmentKind::AnyRecursive
            ]
        );
    }

    #[parameterized(
        literal_before_wildcard = { "/trunk", "/*" },
        literal_before_recursive = { "/trunk", "/**" },
        literal_before_fnmatch = { "/trunk", "/tr?nk" },
        prefix_before_suffix = { "/tr*", "/*nk" },
        root_before_any_path = { "/", "/trunk" },
        shorter_prefix_first = { "/trunk", "/trunk/src" },
        lexical_within_kind = { "/alpha", "/beta" },
    )]
    fn path_precedence(first: &str, second: &str) {
        let mut table = PatternTable::new();
        let a = compile(&mut table, first);
        let b = compile(&mut table, second);
        assert_eq!(compare_rules(&table, &a, &b), Ordering::Less);
        assert_eq!(compare_rules(&table, &b, &a), Ordering::Greater);
    }

    #[test]
    fn specific_repository_outranks_any_repository() {
        let mut table = PatternTable::new();
        let any = compile(&mut table, "/trunk");
        let specific = compile(&mut table, "calc:/trunk");
        assert_eq!(compare_rules(&table, &specific, &any), Ordering::Less);

        let other = compile(&mut table, "zulu:/trunk");
        assert_eq!(compare_rules(&table, &specific, &other), Ordering::Less);
    }

    #[test]
    fn identical_rules_compare_equal() {
        let mut table = PatternTable::new();
        let a = compile(&mut table, "calc:/trunk/*.png");
        let b = compile(&mut table, "calc:/trunk/*.png");
        assert_eq!(compare_rules(&table, &a, &b), Ordering::Equal);
        assert_eq!(a, b);
    }
}
