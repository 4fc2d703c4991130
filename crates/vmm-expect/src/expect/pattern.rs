//! Pattern types for expect operations.
//!
//! A [`Pattern`] is plain data: a literal, a regular expression or an
//! any-of list. [`Pattern::compile`] turns it into a [`CompiledPattern`]
//! once per expect call. Any-of lists become a single regex automaton with
//! one named group per alternative, so a single scan finds the leftmost
//! match; when two alternatives match at the same offset, the one listed
//! first wins. Named groups inside the alternatives are renamed with a
//! per-expression prefix so that alternatives may reuse a name.

use std::fmt;

use memchr::memmem;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ExpectError, Result};

/// Something to wait for in a process's output.
///
/// In scenario files a bare string is a literal; tagged forms are
/// `{ literal = "..." }`, `{ regex = "..." }` and `{ any_of = [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "PatternRepr")]
pub enum Pattern {
    /// Exact text.
    Literal(String),

    /// A regular expression (Rust `regex` syntax, matched over bytes).
    Regex(String),

    /// Whichever alternative appears first in the output.
    AnyOf(Vec<Pattern>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Text(String),
    Tagged(TaggedPattern),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedPattern {
    Literal(String),
    Regex(String),
    AnyOf(Vec<Pattern>),
}

impl From<PatternRepr> for Pattern {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Text(s) | PatternRepr::Tagged(TaggedPattern::Literal(s)) => {
                Self::Literal(s)
            }
            PatternRepr::Tagged(TaggedPattern::Regex(s)) => Self::Regex(s),
            PatternRepr::Tagged(TaggedPattern::AnyOf(list)) => Self::AnyOf(list),
        }
    }
}

impl Pattern {
    /// Create a literal pattern.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Create a regex pattern, validating the expression.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)?;
        Ok(Self::Regex(pattern.to_string()))
    }

    /// Create an any-of pattern.
    #[must_use]
    pub fn any_of(patterns: impl IntoIterator<Item = impl Into<Self>>) -> Self {
        Self::AnyOf(patterns.into_iter().map(Into::into).collect())
    }

    /// Whether every leaf of the pattern is a literal.
    #[must_use]
    pub fn is_literal_only(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Regex(_) => false,
            Self::AnyOf(list) => list.iter().all(Self::is_literal_only),
        }
    }

    fn max_literal_len(&self) -> usize {
        match self {
            Self::Literal(s) => s.len(),
            Self::Regex(_) => 0,
            Self::AnyOf(list) => list.iter().map(Self::max_literal_len).max().unwrap_or(0),
        }
    }

    /// Source of this pattern as one branch of a larger alternation.
    ///
    /// `leaf` numbers the regex leaves so their group names stay distinct.
    fn regex_source(&self, leaf: &mut usize) -> Result<String> {
        match self {
            Self::Literal(s) => Ok(regex::escape(s)),
            Self::Regex(s) => {
                // Validate on its own first so errors point at this expression.
                Regex::new(s)?;
                let prefix = format!("{GROUP_PREFIX}{leaf}_");
                *leaf += 1;
                Ok(format!("(?:{})", prefix_group_names(s, &prefix)))
            }
            Self::AnyOf(list) => {
                if list.is_empty() {
                    return Err(ExpectError::invalid_pattern("empty any-of list"));
                }
                let parts = list
                    .iter()
                    .map(|p| p.regex_source(leaf))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("(?:{})", parts.join("|")))
            }
        }
    }

    /// Compile the pattern for matching.
    pub fn compile(&self) -> Result<CompiledPattern> {
        let literal_window = self.is_literal_only().then(|| self.max_literal_len());

        let matcher = match self {
            Self::Literal(s) => Compiled::Literal(memmem::Finder::new(s.as_bytes()).into_owned()),
            Self::Regex(s) => Compiled::Regex {
                regex: Regex::new(s)?,
                alternatives: Vec::new(),
            },
            Self::AnyOf(list) if list.len() == 1 => return list[0].compile().map(|c| c.named(self)),
            Self::AnyOf(list) => {
                if list.is_empty() {
                    return Err(ExpectError::invalid_pattern("empty any-of list"));
                }
                let mut parts = Vec::with_capacity(list.len());
                let mut leaf = 0;
                for (i, alt) in list.iter().enumerate() {
                    parts.push(format!("(?P<{ALT_PREFIX}{i}>{})", alt.regex_source(&mut leaf)?));
                }
                let regex = Regex::new(&parts.join("|"))?;
                let alternatives = alternative_groups(&regex, list.len())?;
                Compiled::Regex {
                    regex,
                    alternatives,
                }
            }
        };

        Ok(CompiledPattern {
            display: self.to_string(),
            matcher,
            literal_window,
        })
    }
}

const ALT_PREFIX: &str = "vmm_alt";
const GROUP_PREFIX: &str = "vmm_g";

/// Prefix every named group in `src` with `prefix`.
///
/// Escapes and character classes are skipped, so `\(?<x>` and `[(?<]` are
/// left alone. Only `(?P<name>` and `(?<name>` introduce names.
fn prefix_group_names(src: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(src.len() + prefix.len());
    let mut class_depth = 0usize;
    let mut rest = src;

    while let Some(c) = rest.chars().next() {
        if class_depth == 0 && c == '(' {
            if let Some(opener) = ["(?P<", "(?<"].into_iter().find(|o| rest.starts_with(o)) {
                out.push_str(opener);
                out.push_str(prefix);
                rest = &rest[opener.len()..];
                continue;
            }
        }

        let mut len = c.len_utf8();
        match c {
            '\\' => {
                len += rest[len..].chars().next().map_or(0, char::len_utf8);
            }
            '[' => {
                class_depth += 1;
                // A `]` right after the opening bracket (or `[^`) is literal.
                let after = &rest[1..];
                let skip = if after.starts_with("^]") {
                    2
                } else if after.starts_with(']') {
                    1
                } else {
                    0
                };
                len += skip;
            }
            ']' if class_depth > 0 => class_depth -= 1,
            _ => {}
        }
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }
    out
}

/// Group index of each alternative's wrapper group.
fn alternative_groups(regex: &Regex, count: usize) -> Result<Vec<usize>> {
    (0..count)
        .map(|i| {
            let name = format!("{ALT_PREFIX}{i}");
            regex
                .capture_names()
                .position(|n| n == Some(name.as_str()))
                .ok_or_else(|| ExpectError::invalid_pattern(format!("lost alternative group {i}")))
        })
        .collect()
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "'{}'", s.escape_debug()),
            Self::Regex(s) => write!(f, "/{s}/"),
            Self::AnyOf(list) => {
                write!(f, "any of [")?;
                for (i, p) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

impl From<&Self> for Pattern {
    fn from(p: &Self) -> Self {
        p.clone()
    }
}

enum Compiled {
    Literal(memmem::Finder<'static>),
    Regex {
        regex: Regex,
        /// Wrapper group index per top-level alternative; empty for a plain regex.
        alternatives: Vec<usize>,
    },
}

/// A pattern ready to be searched for.
pub struct CompiledPattern {
    display: String,
    matcher: Compiled,
    literal_window: Option<usize>,
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.display)
            .field("literal_window", &self.literal_window)
            .finish()
    }
}

/// Position and details of a match inside a haystack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Start offset.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Top-level alternative that matched.
    pub index: usize,
    /// Explicit capture groups of the matching regex alternative, group 1
    /// first. The whole match is `start..end`, not an entry here.
    pub captures: Vec<String>,
}

impl CompiledPattern {
    fn named(mut self, original: &Pattern) -> Self {
        self.display = original.to_string();
        self
    }

    /// The pattern as written, for messages.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Find the leftmost match starting at or after `from`.
    #[must_use]
    pub fn find(&self, haystack: &[u8], from: usize) -> Option<Found> {
        if from > haystack.len() {
            return None;
        }
        match &self.matcher {
            Compiled::Literal(finder) => finder.find(&haystack[from..]).map(|pos| Found {
                start: from + pos,
                end: from + pos + finder.needle().len(),
                index: 0,
                captures: Vec::new(),
            }),
            Compiled::Regex {
                regex,
                alternatives,
            } => {
                let caps = regex.captures_at(haystack, from)?;
                let whole = caps.get(0)?;
                let text = |i: usize| {
                    caps.get(i)
                        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                        .unwrap_or_default()
                };

                let (index, groups) = if alternatives.is_empty() {
                    (0, 1..caps.len())
                } else {
                    let index = alternatives
                        .iter()
                        .position(|&g| caps.get(g).is_some())
                        .unwrap_or(0);
                    let first = alternatives[index] + 1;
                    let last = alternatives.get(index + 1).copied().unwrap_or(caps.len());
                    (index, first..last)
                };

                Some(Found {
                    start: whole.start(),
                    end: whole.end(),
                    index,
                    captures: groups.map(text).collect(),
                })
            }
        }
    }

    /// Where the next search may start after a failed search over
    /// `searched_len` bytes.
    ///
    /// Literal-only patterns cannot match entirely inside text that was
    /// already searched, so only the last `window - 1` bytes need rescanning.
    /// Regex patterns rescan from the start.
    #[must_use]
    pub fn resume_point(&self, searched_len: usize) -> usize {
        self.literal_window
            .map_or(0, |window| searched_len.saturating_sub(window.saturating_sub(1)))
    }
}
