//! Match Patterns
//!
//! Plug metadata is registered against patterns rather than exact paths. A
//! pattern is a space-separated list of alternatives; each alternative
//! supports `*` (any run of characters), `?` (one character), `[abc]` and
//! `[!abc]` character classes, and `\` to escape the next character.
//!
//! Patterns are compiled to a single anchored [`regex::Regex`].

use std::fmt;

use regex::Regex;

/// A compiled wildcard pattern.
#[derive(Clone)]
pub struct MatchPattern {
    source: String,
    regex: Option<Regex>,
}

impl MatchPattern {
    pub fn new(source: &str) -> Self {
        let alternatives: Vec<String> = source.split_whitespace().map(translate).collect();
        let regex = if alternatives.is_empty() {
            None
        } else {
            match Regex::new(&format!("^(?:{})$", alternatives.join("|"))) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    tracing::warn!(pattern = source, error = %err, "invalid match pattern, matching literally");
                    None
                }
            }
        };
        Self {
            source: source.to_owned(),
            regex,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(path),
            None => self.source == path,
        }
    }
}

/// Translate one alternative into regex syntax.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the class opened at `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i) == Some(&'!') {
        i += 1;
    }
    // A `]` straight after the opening is a member, not the end.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    (i..chars.len()).find(|&j| chars[j] == ']')
}

fn translate_class(body: &[char]) -> String {
    let (negated, body) = match body.first() {
        Some('!') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut out = String::from(if negated { "[^" } else { "[" });
    for &c in body {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(']');
    out
}

impl PartialEq for MatchPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for MatchPattern {}

impl fmt::Debug for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchPattern({:?})", self.source)
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for MatchPattern {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}
