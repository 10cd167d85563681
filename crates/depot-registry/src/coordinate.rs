//! Maven coordinates encoded in storage keys.

use std::fmt;

use crate::integrity::is_checksum_key;
use crate::key::Key;
use crate::metadata::METADATA_FILE;
use crate::version;

/// A file belonging to one version of an artifact, as laid out by Maven:
/// `<group…>/<artifact>/<version>/<artifact>-<version>[-classifier].<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    group: Key,
    artifact: String,
    version: String,
    file: String,
}

impl Coordinate {
    /// Recognize a versioned artifact file.
    ///
    /// Returns `None` for keys that are too short, digest siblings, version
    /// indexes, and files whose name does not start with
    /// `<artifact>-<version>`. Snapshot files may carry a timestamp in place
    /// of `SNAPSHOT`.
    pub fn from_key(key: &Key) -> Option<Coordinate> {
        let segments = key.segments();
        if segments.len() < 4 || is_checksum_key(key) {
            return None;
        }
        let [artifact, version, file] = &segments[segments.len() - 3..] else {
            return None;
        };
        if file == METADATA_FILE {
            return None;
        }
        if !file_matches(artifact, version, file) {
            return None;
        }
        Some(Coordinate {
            group: segments[..segments.len() - 3]
                .iter()
                .fold(Key::root(), |group, segment| group.child(segment)),
            artifact: artifact.clone(),
            version: version.clone(),
            file: file.clone(),
        })
    }

    /// Dotted group id, e.g. `org.example`.
    pub fn group_id(&self) -> String {
        self.group.segments().join(".")
    }

    pub fn group(&self) -> &Key {
        &self.group
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn file_name(&self) -> &str {
        &self.file
    }

    /// Directory holding every version of the artifact.
    pub fn artifact_key(&self) -> Key {
        self.group.child(&self.artifact)
    }

    /// Key of the artifact's version index.
    pub fn index_key(&self) -> Key {
        self.artifact_key().child(METADATA_FILE)
    }

    /// Key of this file.
    pub fn key(&self) -> Key {
        self.artifact_key().child(&self.version).child(&self.file)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id(), self.artifact, self.version)
    }
}

fn file_matches(artifact: &str, version: &str, file: &str) -> bool {
    let Some(rest) = file.strip_prefix(artifact).and_then(|r| r.strip_prefix('-')) else {
        return false;
    };
    let tail = match rest.strip_prefix(version) {
        Some(tail) => Some(tail),
        // 1.0-SNAPSHOT deploys as 1.0-20240101.120000-1
        None if version::is_snapshot(version) => {
            let base = &version[..version.len() - "SNAPSHOT".len()];
            rest.strip_prefix(base).and_then(strip_timestamp)
        }
        None => None,
    };
    tail.is_some_and(|tail| tail.starts_with('.') || tail.starts_with('-'))
}

/// Strip a `yyyyMMdd.HHmmss-N` snapshot timestamp.
fn strip_timestamp(s: &str) -> Option<&str> {
    let s = strip_digits(s, Some(8))?.strip_prefix('.')?;
    let s = strip_digits(s, Some(6))?.strip_prefix('-')?;
    strip_digits(s, None)
}

fn strip_digits(s: &str, expected: Option<usize>) -> Option<&str> {
    let count = s.bytes().take_while(u8::is_ascii_digit).count();
    match expected {
        Some(expected) if count != expected => None,
        _ if count == 0 => None,
        _ => Some(&s[count..]),
    }
}
