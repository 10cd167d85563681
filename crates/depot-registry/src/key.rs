//! Hierarchical storage keys.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{RegistryError, Result};

/// An immutable, `/`-separated storage key such as
/// `org/example/artifact/1.0/artifact-1.0.jar`.
///
/// Segments are never empty and never `.` or `..`. The key with no segments
/// is the root and is an ancestor of every other key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    segments: Vec<String>,
}

impl Key {
    /// The root key.
    pub fn root() -> Self {
        Key::default()
    }

    /// Parse a `/`-separated path. Empty segments (including a leading or
    /// trailing `/`) are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        Key::from_segments(raw.split('/'))
            .map_err(|detail| RegistryError::InvalidKey {
                raw: raw.to_string(),
                detail,
            })
    }

    fn from_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        for part in parts {
            match part {
                "" => continue,
                "." | ".." => return Err(format!("relative segment '{part}' not allowed")),
                _ => segments.push(part.to_string()),
            }
        }
        Ok(Key { segments })
    }

    /// Append one path segment. `name` must not contain `/`.
    pub fn child(&self, name: &str) -> Key {
        debug_assert!(!name.is_empty() && !name.contains('/'));
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Key { segments }
    }

    /// The sibling key formed by appending `suffix` to the last segment,
    /// e.g. `a/b.jar` + `.sha1` = `a/b.jar.sha1`.
    pub fn with_suffix(&self, suffix: &str) -> Key {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => last.push_str(suffix),
            None => segments.push(suffix.to_string()),
        }
        Key { segments }
    }

    /// Path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The key one level up; `None` for the root.
    pub fn parent(&self) -> Option<Key> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Key {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `prefix` is this key or one of its ancestors.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
