//! Slash-delimited store paths.

use std::fmt;

/// A normalized slash-delimited path into the shared store,
/// e.g. `rooms/483920/users/u1`.
///
/// Leading/trailing slashes and empty segments are stripped on
/// construction, so two paths spelling the same location compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(String);

impl StorePath {
    pub fn new(raw: &str) -> Self {
        let joined = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Append a single segment.
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self::new(segment)
        } else {
            Self::new(&format!("{}/{}", self.0, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Whether `self` is an ancestor of (or equal to) `other`.
    pub fn contains(&self, other: &StorePath) -> bool {
        if self.0.is_empty() {
            return true;
        }
        other.0 == self.0 || other.0.starts_with(&format!("{}/", self.0))
    }

    /// The first segment of `other` below `self`, if `other` is strictly
    /// underneath `self`.
    pub fn child_key_of(&self, other: &StorePath) -> Option<String> {
        if !self.contains(other) || self.0 == other.0 {
            return None;
        }
        let rest = if self.0.is_empty() {
            other.0.as_str()
        } else {
            &other.0[self.0.len() + 1..]
        };
        rest.split('/').next().map(|s| s.to_string())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
