use std::collections::HashMap;

use regex::Regex;
use strum_macros::Display;

use crate::error::AuthzError;

/// How one rule path segment matches one queried path segment.
///
/// The variant order is the sort precedence for rules that would otherwise
/// tie: `Literal` must stay first so that a literal repository-root rule
/// sorts ahead of every broader pattern and the implicit no-access default
/// is applied behind it, not instead of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SegmentKind {
    /// Exact string equality.
    Literal,
    /// A literal followed by `*`; the segment must start with the literal.
    Prefix,
    /// `*` followed by a literal. The pattern is stored char-reversed and
    /// matched as a prefix of the reversed path segment.
    Suffix,
    /// `*`: any single non-empty segment. The pattern is empty.
    AnySegment,
    /// `**`: any run of zero or more whole segments, consumed by the path
    /// matcher rather than per segment. The pattern is empty.
    AnyRecursive,
    /// Any other glob pattern (`?`, embedded `*`, character classes).
    Fnmatch,
}

/// Handle to an interned pattern. Two segments with equal kind and equal
/// handle carry the same pattern text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PatternId(u32);

#[derive(Debug)]
struct PatternEntry {
    text: Box<str>,
    /// Compiled matcher, present for `Fnmatch` entries only.
    glob: Option<Regex>,
}

/// Model-scoped intern table for pattern strings.
///
/// Repeated patterns share one entry, so segment equality reduces to
/// comparing kinds and handles, and each fnmatch pattern is compiled to a
/// regex exactly once.
#[derive(Debug, Default)]
pub(crate) struct PatternTable {
    entries: Vec<PatternEntry>,
    index: HashMap<(SegmentKind, String), PatternId>,
}

impl PatternTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn intern(&mut self, kind: SegmentKind, text: &str) -> Result<PatternId, AuthzError> {
        if let Some(&id) = self.index.get(&(kind, text.to_string())) {
            return Ok(id);
        }
        let glob = match kind {
            SegmentKind::Fnmatch => Some(glob_to_regex(text)?),
            _ => None,
        };
        let id = PatternId(self.entries.len() as u32);
        self.entries.push(PatternEntry {
            text: text.into(),
            glob,
        });
        self.index.insert((kind, text.to_string()), id);
        Ok(id)
    }

    pub(crate) fn text(&self, id: PatternId) -> &str {
        &self.entries[id.0 as usize].text
    }

    fn glob(&self, id: PatternId) -> Option<&Regex> {
        self.entries[id.0 as usize].glob.as_ref()
    }
}

/// One compiled rule path segment: a kind plus its interned pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) kind: SegmentKind,
    pub(crate) pattern: PatternId,
}

impl Segment {
    /// Match this pattern against a single queried path segment.
    ///
    /// Matching is exact on the character sequence; there is no case folding.
    pub(crate) fn matches(&self, table: &PatternTable, segment: &str) -> bool {
        match self.kind {
            SegmentKind::Literal => table.text(self.pattern) == segment,
            SegmentKind::Prefix => segment.starts_with(table.text(self.pattern)),
            SegmentKind::Suffix => {
                let mut reversed = segment.chars().rev();
                table
                    .text(self.pattern)
                    .chars()
                    .all(|p| reversed.next() == Some(p))
            }
            SegmentKind::AnySegment => !segment.is_empty(),
            // A run of `**` is consumed by the path matcher; standing alone
            // it places no constraint on the segment.
            SegmentKind::AnyRecursive => true,
            SegmentKind::Fnmatch => table
                .glob(self.pattern)
                .is_some_and(|re| re.is_match(segment)),
        }
    }
}

/// Classify one raw path segment into its kind and storage text.
///
/// Escapes of non-wildcard characters are normalized away here, so `a\bc`
/// and `abc` intern to the same literal entry. The storage text is the
/// unescaped literal for `Literal`/`Prefix`, the reversed unescaped literal
/// for `Suffix`, empty for the two wildcard kinds, and the normalized glob
/// for `Fnmatch`.
pub(crate) fn classify(raw: &str) -> Result<(SegmentKind, String), AuthzError> {
    if raw == "**" {
        return Ok((SegmentKind::AnyRecursive, String::new()));
    }
    if raw == "*" {
        return Ok((SegmentKind::AnySegment, String::new()));
    }

    // Unescaped form, normalized glob form, and where unescaped stars sit.
    let mut literal = String::with_capacity(raw.len());
    let mut normalized = String::with_capacity(raw.len());
    let mut star_positions: Vec<usize> = Vec::new();
    let mut other_meta = false;

    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(next) = chars.next() else {
                    return Err(AuthzError::InvalidPattern {
                        pattern: raw.to_string(),
                        reason: "trailing escape character".to_string(),
                    });
                };
                if matches!(next, '*' | '?' | '[' | ']' | '\\') {
                    normalized.push('\\');
                }
                normalized.push(next);
                literal.push(next);
            }
            '*' => {
                star_positions.push(literal.len());
                literal.push('*');
                normalized.push('*');
            }
            '?' | '[' => {
                other_meta = true;
                literal.push(c);
                normalized.push(c);
            }
            c => {
                literal.push(c);
                normalized.push(c);
            }
        }
    }

    if star_positions.is_empty() && !other_meta {
        return Ok((SegmentKind::Literal, literal));
    }
    if !other_meta && star_positions.len() == 1 {
        let pos = star_positions[0];
        if pos + 1 == literal.len() {
            literal.pop();
            return Ok((SegmentKind::Prefix, literal));
        }
        if pos == 0 {
            return Ok((SegmentKind::Suffix, literal[1..].chars().rev().collect()));
        }
    }
    Ok((SegmentKind::Fnmatch, normalized))
}

/// Translate a normalized glob into an anchored regex.
///
/// `*` and `?` become `.*` and `.`; character classes pass through with
/// `[!...]` negation rewritten; everything else is matched literally.
fn glob_to_regex(pattern: &str) -> Result<Regex, AuthzError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    push_literal(&mut re, next);
                }
            }
            '[' => {
                re.push('[');
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    re.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                while let Some(c) = chars.next() {
                    match c {
                        ']' if !empty => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(next) = chars.next() {
                                push_class_char(&mut re, next);
                            }
                        }
                        '-' => re.push('-'),
                        c => push_class_char(&mut re, c),
                    }
                    empty = false;
                }
                if !closed {
                    return Err(AuthzError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "unterminated character class".to_string(),
                    });
                }
                re.push(']');
            }
            c => push_literal(&mut re, c),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| AuthzError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn push_literal(re: &mut String, c: char) {
    if matches!(
        c,
        '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\'
    ) {
        re.push('\\');
    }
    re.push(c);
}

fn push_class_char(re: &mut String, c: char) {
    if !c.is_alphanumeric() {
        re.push('\\');
    }
    re.push(c);
}
