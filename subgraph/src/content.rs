//! Off-chain content retrieval for file data sources.
//!
//! Fetching is a seam: the engine only asks whether the bytes for a content
//! id are available yet. Absent content is not an error; the file data
//! source stays pending and is retried on the next poll.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Source of off-chain content, keyed by content id.
pub trait ContentFetcher: fmt::Debug {
    /// Fetch the content for `id`. `Ok(None)` means not available yet.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the content exists but cannot be read.
    fn fetch(&self, id: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Fetcher that never has any content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl ContentFetcher for NoContent {
    fn fetch(&self, _id: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// In-memory content map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContent {
    files: HashMap<String, Vec<u8>>,
}

impl InMemoryContent {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make content available under `id`.
    pub fn insert(&mut self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(id.into(), bytes.into());
        self
    }
}

impl ContentFetcher for InMemoryContent {
    fn fetch(&self, id: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.files.get(id).cloned())
    }
}

/// Reads content from `<root>/<content id>`.
#[derive(Debug, Clone)]
pub struct DirectoryContent {
    root: PathBuf,
}

impl DirectoryContent {
    /// Serve content from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The content directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ContentFetcher for DirectoryContent {
    fn fetch(&self, id: &str) -> io::Result<Option<Vec<u8>>> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid content id `{id}`"),
            ));
        }
        match std::fs::read(self.root.join(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_returns_inserted_content() {
        let mut content = InMemoryContent::new();
        content.insert("QmA", b"{}".to_vec());
        assert_eq!(content.fetch("QmA").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(content.fetch("QmB").unwrap(), None);
    }

    #[test]
    fn directory_reads_files_and_treats_missing_as_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("QmA"), b"{\"periods\": 4}").unwrap();

        let content = DirectoryContent::new(dir.path());
        assert_eq!(content.fetch("QmA").unwrap(), Some(b"{\"periods\": 4}".to_vec()));
        assert_eq!(content.fetch("QmB").unwrap(), None);
    }

    #[test]
    fn directory_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let content = DirectoryContent::new(dir.path());
        assert!(content.fetch("../etc/passwd").is_err());
        assert!(content.fetch("..").is_err());
    }
}
