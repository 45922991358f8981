//! Dataset artifact storage port
//!
//! Artifacts live in one of two areas and are addressed by a directory
//! inside the area plus a file name:
//!
//! ```text
//! labelled/<model>/analysable/<analysable>/<time splitting>/<file>.csv
//! unlabelled/<model>/timesplitting/<time splitting>/<file>.csv
//! ```

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Storage area of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileArea {
    /// Datasets with a target column
    Labelled,
    /// Datasets to predict on
    Unlabelled,
}

impl FileArea {
    /// Area for the given labelled flag.
    #[must_use]
    pub const fn from_labelled(labelled: bool) -> Self {
        if labelled {
            Self::Labelled
        } else {
            Self::Unlabelled
        }
    }

    /// Area name used in artifact paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Labelled => "labelled",
            Self::Unlabelled => "unlabelled",
        }
    }
}

impl fmt::Display for FileArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a stored artifact.
///
/// `content_hash` has the form `fx:<16 hex digits>` and identifies the
/// content, so two runs producing the same dataset yield the same hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactHandle {
    id: String,
    area: FileArea,
    dir: String,
    filename: String,
    content_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactHandle {
    /// Describe freshly written content.
    #[must_use]
    pub fn new(area: FileArea, dir: &str, filename: &str, content: &str) -> Self {
        Self {
            id: artifact_id(area, dir, filename),
            area,
            dir: dir.to_string(),
            filename: filename.to_string(),
            content_hash: content_hash(content),
            size_bytes: content.len() as u64,
            created_at: Utc::now(),
        }
    }

    /// Unique artifact id (`area/dir/filename`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Storage area.
    #[must_use]
    pub const fn area(&self) -> FileArea {
        self.area
    }

    /// Directory inside the area.
    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// File name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Content hash.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Content size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// When the artifact was written.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn artifact_id(area: FileArea, dir: &str, filename: &str) -> String {
    format!("{area}/{dir}/{filename}")
}

/// `fx:<hex>` hash of artifact content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("fx:{:016x}", trueno::hash_key(content))
}

/// Binary file storage for dataset artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Write (or overwrite) an artifact.
    ///
    /// # Errors
    /// Returns error if the artifact can not be written
    fn put(&self, area: FileArea, dir: &str, filename: &str, content: &str) -> Result<ArtifactHandle>;

    /// Read an artifact's content.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the artifact is gone
    fn read(&self, handle: &ArtifactHandle) -> Result<String>;

    /// Artifacts in a directory, ordered by file name.
    ///
    /// # Errors
    /// Returns error if the directory can not be listed
    fn list(&self, area: FileArea, dir: &str) -> Result<Vec<ArtifactHandle>>;

    /// Look up one artifact.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    fn find(&self, area: FileArea, dir: &str, filename: &str) -> Result<Option<ArtifactHandle>> {
        Ok(self
            .list(area, dir)?
            .into_iter()
            .find(|handle| handle.filename() == filename))
    }

    /// Delete one artifact, returning whether it existed.
    ///
    /// # Errors
    /// Returns error if the artifact can not be removed
    fn delete(&self, handle: &ArtifactHandle) -> Result<bool>;

    /// Delete every artifact in a directory, returning how many were removed.
    ///
    /// # Errors
    /// Returns error if an artifact can not be removed
    fn delete_dir(&self, area: FileArea, dir: &str) -> Result<usize>;
}

/// In-memory artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<String, (ArtifactHandle, String)>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, area: FileArea, dir: &str, filename: &str, content: &str) -> Result<ArtifactHandle> {
        let handle = ArtifactHandle::new(area, dir, filename, content);
        self.artifacts
            .insert(handle.id().to_string(), (handle.clone(), content.to_string()));
        Ok(handle)
    }

    fn read(&self, handle: &ArtifactHandle) -> Result<String> {
        self.artifacts
            .get(handle.id())
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| Error::not_found(format!("artifact {}", handle.id())))
    }

    fn list(&self, area: FileArea, dir: &str) -> Result<Vec<ArtifactHandle>> {
        let mut handles: Vec<ArtifactHandle> = self
            .artifacts
            .iter()
            .filter(|entry| entry.value().0.area() == area && entry.value().0.dir() == dir)
            .map(|entry| entry.value().0.clone())
            .collect();
        handles.sort_by(|a, b| a.filename().cmp(b.filename()));
        Ok(handles)
    }

    fn delete(&self, handle: &ArtifactHandle) -> Result<bool> {
        Ok(self.artifacts.remove(handle.id()).is_some())
    }

    fn delete_dir(&self, area: FileArea, dir: &str) -> Result<usize> {
        let before = self.artifacts.len();
        self.artifacts
            .retain(|_, (handle, _)| !(handle.area() == area && handle.dir() == dir));
        Ok(before - self.artifacts.len())
    }
}

/// Artifact store on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Store rooted at `root`; directories are created on write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_path(&self, area: FileArea, dir: &str) -> PathBuf {
        self.root.join(area.as_str()).join(dir)
    }

    fn handle_for(area: FileArea, dir: &str, path: &Path) -> Result<Option<ArtifactHandle>> {
        if !path.is_file() {
            return Ok(None);
        }
        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path)?;
        let mut handle = ArtifactHandle::new(area, dir, filename, &content);
        handle.created_at = DateTime::<Utc>::from(std::fs::metadata(path)?.modified()?);
        Ok(Some(handle))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, area: FileArea, dir: &str, filename: &str, content: &str) -> Result<ArtifactHandle> {
        let dir_path = self.dir_path(area, dir);
        std::fs::create_dir_all(&dir_path)?;
        std::fs::write(dir_path.join(filename), content)?;
        Ok(ArtifactHandle::new(area, dir, filename, content))
    }

    fn read(&self, handle: &ArtifactHandle) -> Result<String> {
        let path = self.dir_path(handle.area(), handle.dir()).join(handle.filename());
        if !path.is_file() {
            return Err(Error::not_found(format!("artifact {}", handle.id())));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    fn list(&self, area: FileArea, dir: &str) -> Result<Vec<ArtifactHandle>> {
        let dir_path = self.dir_path(area, dir);
        if !dir_path.is_dir() {
            return Ok(Vec::new());
        }
        let mut handles = Vec::new();
        for entry in std::fs::read_dir(&dir_path)? {
            if let Some(handle) = Self::handle_for(area, dir, &entry?.path())? {
                handles.push(handle);
            }
        }
        handles.sort_by(|a, b| a.filename().cmp(b.filename()));
        Ok(handles)
    }

    fn find(&self, area: FileArea, dir: &str, filename: &str) -> Result<Option<ArtifactHandle>> {
        Self::handle_for(area, dir, &self.dir_path(area, dir).join(filename))
    }

    fn delete(&self, handle: &ArtifactHandle) -> Result<bool> {
        let path = self.dir_path(handle.area(), handle.dir()).join(handle.filename());
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    fn delete_dir(&self, area: FileArea, dir: &str) -> Result<usize> {
        let removed = self.list(area, dir)?.len();
        let dir_path = self.dir_path(area, dir);
        if dir_path.is_dir() {
            std::fs::remove_dir_all(dir_path)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ArtifactStore) {
        let first = store.put(FileArea::Labelled, "1/analysable/2/quarters", "evaluation.csv", "a,b\n").unwrap();
        store.put(FileArea::Labelled, "1/analysable/2/quarters", "100.csv", "c\n").unwrap();
        store.put(FileArea::Unlabelled, "1/analysable/2/quarters", "100.csv", "d\n").unwrap();

        assert_eq!(store.read(&first).unwrap(), "a,b\n");
        assert_eq!(first.size_bytes(), 4);
        assert!(first.content_hash().starts_with("fx:"));

        let listed = store.list(FileArea::Labelled, "1/analysable/2/quarters").unwrap();
        let names: Vec<_> = listed.iter().map(ArtifactHandle::filename).collect();
        assert_eq!(names, vec!["100.csv", "evaluation.csv"]);

        let found = store
            .find(FileArea::Labelled, "1/analysable/2/quarters", "evaluation.csv")
            .unwrap()
            .unwrap();
        assert_eq!(found.content_hash(), first.content_hash());
        assert!(store.find(FileArea::Labelled, "1/analysable/2/quarters", "x.csv").unwrap().is_none());

        let extra = store.put(FileArea::Labelled, "1/analysable/2/quarters", "200.csv", "e\n").unwrap();
        assert!(store.delete(&extra).unwrap());
        assert!(!store.delete(&extra).unwrap());

        assert_eq!(store.delete_dir(FileArea::Labelled, "1/analysable/2/quarters").unwrap(), 2);
        assert!(store.list(FileArea::Labelled, "1/analysable/2/quarters").unwrap().is_empty());
        assert!(matches!(store.read(&first), Err(Error::NotFound(_))));
        assert_eq!(store.list(FileArea::Unlabelled, "1/analysable/2/quarters").unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryArtifactStore::new());
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsArtifactStore::new(dir.path()));
    }

    #[test]
    fn test_overwrite_keeps_one_artifact() {
        let store = MemoryArtifactStore::new();
        store.put(FileArea::Labelled, "d", "evaluation.csv", "old").unwrap();
        let handle = store.put(FileArea::Labelled, "d", "evaluation.csv", "new").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read(&handle).unwrap(), "new");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("same"), content_hash("same"));
        assert_ne!(content_hash("same"), content_hash("other"));
    }
}
