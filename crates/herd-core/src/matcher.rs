//! Route-pattern compilation and anchored path matching.
//!
//! Patterns support literal segments, named parameters (`:id`), optional
//! parameters (`:id?`), custom parameter expressions (`:id(\d+)`) and bare
//! groups (`(beta|live)`). Bare groups capture positionally but carry no name,
//! so they never appear in the extracted parameter map. Groups nested inside a
//! custom expression are rewritten to non-capturing ones, keeping each capture
//! index aligned with its parameter name.
//!
//! Compilation happens once, at route-registration time. A malformed pattern
//! is a [`PatternError`] there and never reaches the dispatch path.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use regex::{Regex, RegexBuilder};

use crate::domain::errors::PatternError;

/// Parameter name to URI-decoded captured value.
pub type PathParams = HashMap<String, String>;

/// Knobs applied at pattern compilation time.
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Match case-sensitively. Off by default.
    pub sensitive: bool,
    /// Require an exact trailing-slash match. Off by default: a single
    /// trailing slash on the path is tolerated.
    pub strict: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
        }
    }
}

/// A compiled route pattern: anchored regex plus the capture keys in
/// declaration order (`None` for bare, unnamed groups).
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
    keys: Vec<Option<String>>,
    pattern: String,
}

impl PathMatcher {
    pub fn compile(pattern: &str, options: MatchOptions) -> Result<Self, PatternError> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        let mut keys = Vec::new();

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ':' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(PatternError::EmptyParamName {
                            pattern: pattern.to_string(),
                        });
                    }

                    let sub = if chars.peek() == Some(&'(') {
                        chars.next();
                        read_group(&mut chars, pattern)?
                    } else {
                        "[^/]+".to_string()
                    };

                    let optional = chars.peek() == Some(&'?');
                    if optional {
                        chars.next();
                    }

                    if optional && source.ends_with('/') {
                        // Fold the preceding slash into the optional group so
                        // `/users/:id?` also matches `/users`.
                        source.pop();
                        source.push_str("(?:/(");
                        source.push_str(&sub);
                        source.push_str("))?");
                    } else if optional {
                        source.push_str("(?:(");
                        source.push_str(&sub);
                        source.push_str("))?");
                    } else {
                        source.push('(');
                        source.push_str(&sub);
                        source.push(')');
                    }
                    keys.push(Some(name));
                }
                '(' => {
                    let sub = read_group(&mut chars, pattern)?;
                    let optional = chars.peek() == Some(&'?');
                    if optional {
                        chars.next();
                    }
                    source.push('(');
                    source.push_str(&sub);
                    source.push(')');
                    if optional {
                        source.push('?');
                    }
                    keys.push(None);
                }
                _ => push_literal(&mut source, c),
            }
        }

        if !options.strict {
            source.push_str("/?");
        }
        source.push('$');

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.sensitive)
            .build()
            .map_err(|source| PatternError::Regex {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            regex,
            keys,
            pattern: pattern.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().filter_map(|key| key.as_deref())
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Test `path` against the whole pattern. On a match, return the named
    /// captures URI-decoded; a capture whose percent-escapes are malformed is
    /// passed through verbatim instead of failing the dispatch.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path)?;
        let mut params = PathParams::new();
        for (index, key) in self.keys.iter().enumerate() {
            let Some(name) = key else {
                continue;
            };
            let Some(capture) = caps.get(index + 1) else {
                continue;
            };
            let raw = capture.as_str();
            let value = match urlencoding::decode(raw) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => raw.to_string(),
            };
            params.insert(name.clone(), value);
        }
        Some(params)
    }
}

/// Consume a balanced group body; the opening `(` has already been read.
/// Backslash-escaped characters never count toward group depth.
fn read_group(chars: &mut Peekable<Chars<'_>>, pattern: &str) -> Result<String, PatternError> {
    let mut depth = 1usize;
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return neutralize_captures(&out, pattern);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Err(PatternError::UnbalancedGroup {
        pattern: pattern.to_string(),
    })
}

/// Rewrite capturing sub-groups inside a group body to non-capturing ones.
/// A capturing sub-group would shift every later capture index off its key,
/// handing the wrong values to handlers. Named sub-captures cannot be
/// rewritten without changing their meaning, so those are rejected outright.
fn neutralize_captures(body: &str, pattern: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '(' => {
                out.push(c);
                if chars.peek() == Some(&'?') {
                    let mut ahead = chars.clone();
                    ahead.next();
                    let named = match ahead.next() {
                        Some('<') => !matches!(ahead.next(), Some('=') | Some('!')),
                        Some('P') => ahead.next() == Some('<'),
                        _ => false,
                    };
                    if named {
                        return Err(PatternError::NamedNestedCapture {
                            pattern: pattern.to_string(),
                        });
                    }
                } else {
                    out.push_str("?:");
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if matches!(
        c,
        '.' | '+' | '*' | '?' | '^' | '$' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    ) {
        out.push('\\');
    }
    out.push(c);
}
