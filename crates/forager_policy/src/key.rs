//! Request key normalization and override patterns.
//!
//! Requests are sampled per key. A key is the request URL reduced to its
//! lowercased path: no scheme, host, query string, fragment or trailing
//! slash. Override patterns are normalized the same way so that they compare
//! against keys directly.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Reduces a raw request URL (absolute or path-only) to a sampling key.
///
/// ```rust
/// use forager_policy::normalize_key;
///
/// assert_eq!(normalize_key("https://example.com/Orders/42/?page=2#top"), "/orders/42");
/// assert_eq!(normalize_key("checkout"), "/checkout");
/// assert_eq!(normalize_key(""), "/");
/// ```
pub fn normalize_key(raw: &str) -> String {
    let raw = raw.trim();
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let path = strip_origin(&raw[..end]);
    let path = path.trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    with_leading_slash(path).to_lowercase()
}

/// Strips `scheme://authority` from an absolute URL, leaving the path.
fn strip_origin(url: &str) -> &str {
    match url.find("://") {
        Some(idx) if !url[..idx].contains('/') => {
            let rest = &url[idx + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        _ => url,
    }
}

fn with_leading_slash(path: &str) -> String {
    let mut key = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        key.push('/');
    }
    key.push_str(path);
    key
}

/// A pattern selecting which request keys an override applies to.
///
/// Patterns can only be built through [`KeyPattern::parse`],
/// [`KeyPattern::exact`] or [`KeyPattern::prefix`], so the text is always
/// normalized the same way as request keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    kind: PatternKind,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PatternKind {
    Exact,
    Prefix,
}

impl KeyPattern {
    /// Parses a pattern as written in configuration.
    ///
    /// A trailing `*` makes a prefix pattern; anything else is exact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern is empty or uses `*`
    /// anywhere other than the final character.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::pattern(raw, "pattern is empty"));
        }

        let (body, is_prefix) = trimmed
            .strip_suffix('*')
            .map_or((trimmed, false), |body| (body, true));

        if body.contains('*') {
            return Err(Error::pattern(
                raw,
                "wildcard is only allowed as a trailing '*'",
            ));
        }
        if body.contains(['?', '#']) {
            return Err(Error::pattern(
                raw,
                "patterns match paths and cannot contain a query or fragment",
            ));
        }

        if is_prefix {
            Ok(Self::prefix(body))
        } else {
            Ok(Self::exact(body))
        }
    }

    /// Creates an exact pattern for the given key.
    #[must_use]
    pub fn exact(key: &str) -> Self {
        Self {
            kind: PatternKind::Exact,
            text: normalize_key(key),
        }
    }

    /// Creates a prefix pattern.
    ///
    /// Unlike exact keys, a trailing `/` on the prefix is preserved so that
    /// `/api/` does not match `/apiary`.
    #[must_use]
    pub fn prefix(prefix: &str) -> Self {
        let path = strip_origin(prefix.trim());
        Self {
            kind: PatternKind::Prefix,
            text: with_leading_slash(path).to_lowercase(),
        }
    }

    /// Returns true for a prefix pattern.
    pub const fn is_prefix(&self) -> bool {
        matches!(self.kind, PatternKind::Prefix)
    }

    /// Length of the normalized key or prefix; longer prefixes are more specific.
    pub(crate) fn specificity(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the pattern applies to the (normalized) key.
    pub fn matches(&self, key: &str) -> bool {
        match self.kind {
            PatternKind::Exact => self.text == key,
            PatternKind::Prefix => key.starts_with(self.text.as_str()),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PatternKind::Exact => f.write_str(&self.text),
            PatternKind::Prefix => write!(f, "{}*", self.text),
        }
    }
}

impl Serialize for KeyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
