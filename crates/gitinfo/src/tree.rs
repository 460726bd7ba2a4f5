use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Change {
    pub(crate) path: String,
    pub(crate) kind: ChangeKind,
}

/// A project directory with an in-memory overlay of pending writes.
///
/// Reads see staged content first. Nothing reaches the disk until
/// [`ProjectTree::commit`], so a step that fails midway leaves the project
/// untouched.
#[derive(Debug)]
pub(crate) struct ProjectTree {
    root: PathBuf,
    staged: BTreeMap<String, Vec<u8>>,
}

impl ProjectTree {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            staged: BTreeMap::new(),
        }
    }

    fn disk_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub(crate) fn exists(&self, rel: &str) -> bool {
        self.staged.contains_key(rel) || self.disk_path(rel).is_file()
    }

    pub(crate) fn read(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.staged.get(rel) {
            return Ok(Some(bytes.clone()));
        }
        read_disk(&self.disk_path(rel))
    }

    pub(crate) fn read_to_string(&self, rel: &str) -> Result<Option<String>> {
        match self.read(rel)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .with_context(|| format!("{rel} is not valid UTF-8")),
            None => Ok(None),
        }
    }

    pub(crate) fn write(&mut self, rel: &str, bytes: impl Into<Vec<u8>>) {
        debug!(path = rel, "staging write");
        self.staged.insert(rel.to_string(), bytes.into());
    }

    /// Classifies every staged path against the current disk content.
    pub(crate) fn changes(&self) -> Result<Vec<Change>> {
        let mut out = Vec::with_capacity(self.staged.len());
        for (rel, bytes) in &self.staged {
            let kind = match read_disk(&self.disk_path(rel))? {
                None => ChangeKind::Created,
                Some(current) if current == *bytes => ChangeKind::Unchanged,
                Some(_) => ChangeKind::Updated,
            };
            out.push(Change {
                path: rel.clone(),
                kind,
            });
        }
        Ok(out)
    }

    /// Writes every created or updated file and returns the classification.
    pub(crate) fn commit(self) -> Result<Vec<Change>> {
        let changes = self.changes()?;
        for change in &changes {
            if change.kind == ChangeKind::Unchanged {
                continue;
            }
            let bytes = &self.staged[&change.path];
            let path = self.disk_path(&change.path);
            util::write_atomic(&path, bytes)
                .with_context(|| format!("write {}", path.display()))?;
        }
        Ok(changes)
    }
}

fn read_disk(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}
