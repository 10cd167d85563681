//! Per-artifact version indexes (`maven-metadata.xml`).
//!
//! Layout:
//! ```text
//! org/example/artifact/
//!   maven-metadata.xml
//!   maven-metadata.xml.sha1
//!   1.0/
//!     artifact-1.0.jar
//! ```
//!
//! Versions are kept in Maven order, so `latest` and `release` are derived
//! rather than stored independently.

use std::collections::BTreeSet;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::content::Content;
use crate::coordinate::Coordinate;
use crate::error::{RegistryError, Result};
use crate::key::Key;
use crate::storage::Storage;
use crate::version::{self, MavenVersion};

/// File name of a version index.
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// Whether `key` names a version index.
pub fn is_metadata_key(key: &Key) -> bool {
    key.name() == Some(METADATA_FILE)
}

/// The published versions of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionIndex {
    group_id: String,
    artifact_id: String,
    versions: Vec<String>,
    last_updated: Option<String>,
}

impl VersionIndex {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        VersionIndex {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            versions: Vec::new(),
            last_updated: None,
        }
    }

    /// An empty index for the artifact `coordinate` belongs to.
    pub fn for_coordinate(coordinate: &Coordinate) -> Self {
        VersionIndex::new(coordinate.group_id(), coordinate.artifact_id())
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Versions in ascending Maven order.
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Add `version`, keeping the list ordered. Returns `false` if it was
    /// already listed.
    pub fn add(&mut self, version: &str) -> bool {
        if self.contains(version) {
            return false;
        }
        self.versions.push(version.to_string());
        self.versions
            .sort_by(|a, b| MavenVersion::parse(a).cmp(&MavenVersion::parse(b)));
        true
    }

    pub fn remove(&mut self, version: &str) -> bool {
        let before = self.versions.len();
        self.versions.retain(|v| v != version);
        self.versions.len() != before
    }

    /// The highest listed version.
    pub fn latest(&self) -> Option<&str> {
        self.versions.last().map(String::as_str)
    }

    /// The highest listed non-snapshot version.
    pub fn release(&self) -> Option<&str> {
        self.versions
            .iter()
            .rev()
            .find(|v| !version::is_snapshot(v))
            .map(String::as_str)
    }

    /// `yyyyMMddHHmmss` of the last change, in UTC.
    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    /// Stamp the index with the current time.
    pub fn touch(&mut self) {
        self.last_updated = Some(chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());
    }

    /// Parse an index document. `origin` names it in errors.
    pub fn parse(xml: &str, origin: &Key) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut path: Vec<String> = Vec::new();
        let mut group_id = None;
        let mut artifact_id = None;
        let mut versions = Vec::new();
        let mut last_updated = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    path.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Text(text)) => {
                    let text = text.unescape().map_err(|e| metadata_error(origin, e))?;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let names: Vec<&str> = path.iter().map(String::as_str).collect();
                    match names.as_slice() {
                        ["metadata", "groupId"] => group_id = Some(text.to_string()),
                        ["metadata", "artifactId"] => artifact_id = Some(text.to_string()),
                        ["metadata", "versioning", "versions", "version"] => {
                            versions.push(text.to_string())
                        }
                        ["metadata", "versioning", "lastUpdated"] => {
                            last_updated = Some(text.to_string())
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(metadata_error(origin, e)),
            }
        }

        let group_id = group_id.ok_or_else(|| metadata_error(origin, "missing <groupId>"))?;
        let artifact_id =
            artifact_id.ok_or_else(|| metadata_error(origin, "missing <artifactId>"))?;
        let mut index = VersionIndex::new(group_id, artifact_id);
        for version in &versions {
            index.add(version);
        }
        index.last_updated = last_updated;
        Ok(index)
    }

    /// Render the index document.
    pub fn to_xml(&self) -> Result<String> {
        let origin = format!("{}:{}", self.group_id, self.artifact_id);
        let mut out = XmlOut {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
            origin: &origin,
        };
        out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        out.open("metadata")?;
        out.element("groupId", &self.group_id)?;
        out.element("artifactId", &self.artifact_id)?;
        out.open("versioning")?;
        if let Some(latest) = self.latest() {
            out.element("latest", latest)?;
        }
        if let Some(release) = self.release() {
            out.element("release", release)?;
        }
        out.open("versions")?;
        for version in &self.versions {
            out.element("version", version)?;
        }
        out.close("versions")?;
        if let Some(last_updated) = &self.last_updated {
            out.element("lastUpdated", last_updated)?;
        }
        out.close("versioning")?;
        out.close("metadata")?;

        let mut xml = String::from_utf8(out.writer.into_inner())
            .map_err(|e| RegistryError::Metadata {
                path: origin.clone(),
                detail: e.to_string(),
            })?;
        xml.push('\n');
        Ok(xml)
    }
}

struct XmlOut<'a> {
    writer: Writer<Vec<u8>>,
    origin: &'a str,
}

impl XmlOut<'_> {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| RegistryError::Metadata {
                path: self.origin.to_string(),
                detail: e.to_string(),
            })
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn element(&mut self, name: &str, text: &str) -> Result<()> {
        self.open(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }
}

fn metadata_error(origin: &Key, detail: impl std::fmt::Display) -> RegistryError {
    RegistryError::Metadata {
        path: origin.to_string(),
        detail: detail.to_string(),
    }
}

/// Read the index stored at `key`, if any.
pub async fn load(storage: &dyn Storage, key: &Key) -> Result<Option<VersionIndex>> {
    if !storage.exists(key).await? {
        return Ok(None);
    }
    let bytes = storage.read(key).await?.into_bytes().await?;
    let xml = std::str::from_utf8(&bytes).map_err(|e| metadata_error(key, e))?;
    VersionIndex::parse(xml, key).map(Some)
}

/// Write `index` to `key`, replacing any previous document.
pub async fn save(storage: &dyn Storage, key: &Key, index: &VersionIndex) -> Result<()> {
    let xml = index.to_xml()?;
    storage.save(key, Content::from_bytes(xml)).await
}

/// Add the version of `coordinate` to its artifact's index, creating the
/// index if needed.
///
/// Callers must serialize merges of the same index.
pub async fn merge(storage: &dyn Storage, coordinate: &Coordinate) -> Result<VersionIndex> {
    let key = coordinate.index_key();
    let mut index = match load(storage, &key).await? {
        Some(index) => index,
        None => VersionIndex::for_coordinate(coordinate),
    };
    index.add(coordinate.version());
    index.touch();
    save(storage, &key, &index).await?;
    tracing::info!(%coordinate, index = %key, "updated version index");
    Ok(index)
}

/// Rewrite the index under `artifact_key` to list exactly the versions that
/// still have files in storage. The index is deleted, and `None` returned,
/// when none remain.
///
/// Callers must serialize rebuilds with merges of the same index.
pub async fn rebuild(storage: &dyn Storage, artifact_key: &Key) -> Result<Option<VersionIndex>> {
    let key = artifact_key.child(METADATA_FILE);
    let mut found: Option<Coordinate> = None;
    let mut versions = BTreeSet::new();
    for stored in storage.list(artifact_key).await? {
        if let Some(coordinate) = Coordinate::from_key(&stored) {
            if coordinate.artifact_key() == *artifact_key {
                versions.insert(coordinate.version().to_string());
                found.get_or_insert(coordinate);
            }
        }
    }

    let Some(coordinate) = found else {
        if storage.exists(&key).await? {
            storage.delete(&key).await?;
            tracing::info!(index = %key, "removed empty version index");
        }
        return Ok(None);
    };

    let mut index = VersionIndex::for_coordinate(&coordinate);
    for version in &versions {
        index.add(version);
    }
    index.touch();
    save(storage, &key, &index).await?;
    tracing::info!(index = %key, versions = index.versions.len(), "rebuilt version index");
    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn key(raw: &str) -> Key {
        Key::parse(raw).unwrap()
    }

    fn coordinate(raw: &str) -> Coordinate {
        Coordinate::from_key(&key(raw)).unwrap()
    }

    #[test]
    fn versions_stay_ordered() {
        let mut index = VersionIndex::new("org.example", "artifact");
        assert!(index.add("1.10"));
        assert!(index.add("1.2"));
        assert!(index.add("1.2-SNAPSHOT"));
        assert!(!index.add("1.2"));
        assert_eq!(index.versions(), &["1.2-SNAPSHOT", "1.2", "1.10"]);
        assert_eq!(index.latest(), Some("1.10"));
        assert_eq!(index.release(), Some("1.10"));
    }

    #[test]
    fn release_skips_snapshots() {
        let mut index = VersionIndex::new("org.example", "artifact");
        index.add("1.0");
        index.add("1.1-SNAPSHOT");
        assert_eq!(index.latest(), Some("1.1-SNAPSHOT"));
        assert_eq!(index.release(), Some("1.0"));
        assert!(index.remove("1.0"));
        assert_eq!(index.release(), None);
    }

    #[test]
    fn xml_round_trip() {
        let mut index = VersionIndex::new("org.example", "artifact");
        index.add("1.0");
        index.add("2.0-rc-1");
        index.touch();
        let xml = index.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<version>1.0</version>"));
        assert!(xml.contains("<latest>2.0-rc-1</latest>"));

        let parsed = VersionIndex::parse(&xml, &key("org/example/artifact/maven-metadata.xml")).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn parses_foreign_documents() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata modelVersion="1.1.0">
  <groupId>com.test</groupId>
  <artifactId>my-package</artifactId>
  <!-- written by another tool -->
  <versioning>
    <release>1.0</release>
    <versions>
      <version>1.0</version>
      <version>0.9</version>
    </versions>
    <snapshot/>
  </versioning>
</metadata>
"#;
        let index = VersionIndex::parse(xml, &key("com/test/maven-metadata.xml")).unwrap();
        assert_eq!(index.group_id(), "com.test");
        assert_eq!(index.versions(), &["0.9", "1.0"]);
        assert_eq!(index.last_updated(), None);
    }

    #[test]
    fn rejects_incomplete_documents() {
        let origin = key("a/maven-metadata.xml");
        assert!(VersionIndex::parse("<metadata><artifactId>a</artifactId></metadata>", &origin).is_err());
        assert!(matches!(
            VersionIndex::parse("<metadata><groupId>g</groupId></metadata>", &origin),
            Err(RegistryError::Metadata { .. })
        ));
    }

    #[tokio::test]
    async fn merge_creates_then_extends() {
        let storage = InMemoryStorage::new();
        let first = coordinate("org/example/artifact/1.0/artifact-1.0.jar");
        merge(&storage, &first).await.unwrap();

        let index_key = key("org/example/artifact/maven-metadata.xml");
        let index = load(&storage, &index_key).await.unwrap().unwrap();
        assert_eq!(index.versions(), &["1.0"]);
        assert_eq!(index.group_id(), "org.example");

        merge(&storage, &coordinate("org/example/artifact/1.1/artifact-1.1.pom")).await.unwrap();
        merge(&storage, &first).await.unwrap();
        let index = load(&storage, &index_key).await.unwrap().unwrap();
        assert_eq!(index.versions(), &["1.0", "1.1"]);
    }

    #[tokio::test]
    async fn rebuild_tracks_stored_versions() {
        let storage = InMemoryStorage::new();
        for raw in [
            "org/example/artifact/1.0/artifact-1.0.jar",
            "org/example/artifact/1.1/artifact-1.1.jar",
        ] {
            storage.save(&key(raw), Content::empty()).await.unwrap();
            merge(&storage, &coordinate(raw)).await.unwrap();
        }
        storage
            .delete(&key("org/example/artifact/1.1/artifact-1.1.jar"))
            .await
            .unwrap();

        let artifact = key("org/example/artifact");
        let index = rebuild(&storage, &artifact).await.unwrap().unwrap();
        assert_eq!(index.versions(), &["1.0"]);

        storage
            .delete(&key("org/example/artifact/1.0/artifact-1.0.jar"))
            .await
            .unwrap();
        assert!(rebuild(&storage, &artifact).await.unwrap().is_none());
        assert!(!storage
            .exists(&key("org/example/artifact/maven-metadata.xml"))
            .await
            .unwrap());
    }
}
