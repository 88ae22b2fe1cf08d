//! Exclude rules: shell-style globs matched against individual path components.
//!
//! A pattern excludes a file when it matches *any* component of the file's
//! path, so `*.tmp` drops temp files anywhere, `cache` drops every directory
//! (or file) literally named `cache`, and `dir*` prunes whole subtrees.

#![allow(missing_docs)]

use std::path::{Component, Path};

use regex::Regex;

use crate::core::errors::{Result, RotError};

/// Compiled glob pattern for component matching.
#[derive(Debug, Clone)]
struct GlobPattern {
    original: String,
    compiled: Regex,
}

/// Set of compiled exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<GlobPattern>,
}

impl IgnoreRules {
    /// Compile `patterns`. Blank patterns are dropped.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(AsRef::as_ref)
            .filter(|pat| !pat.is_empty())
            .map(|pat| {
                Ok(GlobPattern {
                    original: pat.to_string(),
                    compiled: glob_to_regex(pat)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching a single component name.
    pub fn matching_pattern(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pat| pat.compiled.is_match(name))
            .map(|pat| pat.original.as_str())
    }

    /// Whether a single component name is excluded.
    pub fn matches_component(&self, name: &str) -> bool {
        self.matching_pattern(name).is_some()
    }

    /// Whether any component of `path` is excluded. Components that are not
    /// valid Unicode are matched lossily.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        path.components().any(|component| match component {
            Component::Normal(name) => self.matches_component(&name.to_string_lossy()),
            _ => false,
        })
    }
}

/// Glob pattern matching exactly `name`.
pub fn escape_glob(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Validate that a glob pattern can be compiled.
pub fn validate_glob_pattern(pattern: &str) -> Result<()> {
    glob_to_regex(pattern).map(|_| ())
}

/// Convert an fnmatch-style glob to an anchored regex.
///
/// Supports:
/// - `*`      → any run of characters
/// - `?`      → any single character
/// - `[seq]`  → any character in `seq` (ranges allowed)
/// - `[!seq]` → any character not in `seq`
///
/// A `[` without a closing `]` is literal. Matching is case-insensitive on
/// Windows.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex_str = String::with_capacity(pattern.len() * 2 + 8);
    regex_str.push_str(if cfg!(windows) { "(?si)^" } else { "(?s)^" });

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                regex_str.push_str(".*");
            }
            '?' => {
                regex_str.push('.');
                i += 1;
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut regex_str, &chars[i + 1..end]);
                    i = end + 1;
                }
                None => {
                    regex_str.push_str("\\[");
                    i += 1;
                }
            },
            c => {
                regex_str.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                i += 1;
            }
        }
    }

    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| RotError::InvalidConfig {
        details: format!("invalid exclude pattern {pattern:?}: {err}"),
    })
}

/// Index of the `]` closing the class opened at `open`, if any. A `]` right
/// after `[` or `[!` is a member, not the terminator.
fn class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if j < chars.len() && chars[j] == '!' {
        j += 1;
    }
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    (j < chars.len()).then_some(j)
}

fn push_class(out: &mut String, body: &[char]) {
    out.push('[');
    let mut rest = body;
    if let Some(('!', tail)) = rest.split_first().map(|(c, t)| (*c, t)) {
        out.push('^');
        rest = tail;
    }
    for &c in rest {
        match c {
            '\\' | '[' | ']' | '&' | '~' | '^' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push(']');
}
