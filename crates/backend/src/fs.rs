// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guarded file-system surface
//!
//! A view over one working directory. Paths are confined to the root,
//! and every operation is recorded in the events table with its path,
//! op, size, content hash, and the current node/frame context.

use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use sm_core::{Clock, NodeId};
use sm_store::{events, Database, StoreError};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("path {0:?} escapes the working directory")]
    OutsideRoot(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    pub modified_ms: Option<u64>,
}

pub struct FsSurface<C: Clock> {
    root: PathBuf,
    db: Arc<Database>,
    execution_id: String,
    clock: C,
    context: Mutex<(Option<NodeId>, Option<u64>)>,
}

impl<C: Clock> FsSurface<C> {
    pub fn new(
        root: impl Into<PathBuf>,
        db: Arc<Database>,
        execution_id: impl Into<String>,
        clock: C,
    ) -> Self {
        Self {
            root: root.into(),
            db,
            execution_id: execution_id.into(),
            clock,
            context: Mutex::new((None, None)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Set the node/frame context stamped onto operation records.
    pub fn set_context(&self, node_id: Option<NodeId>, frame_id: Option<u64>) {
        *self.context.lock() = (node_id, frame_id);
    }

    /// Resolve a relative path inside the root, rejecting escapes.
    fn resolve(&self, path: &Path) -> Result<PathBuf, FsError> {
        if path.is_absolute() {
            return Err(FsError::OutsideRoot(path.to_path_buf()));
        }
        let mut depth: i64 = 0;
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(FsError::OutsideRoot(path.to_path_buf()));
                    }
                }
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(FsError::OutsideRoot(path.to_path_buf()));
                }
            }
        }
        Ok(self.root.join(path))
    }

    fn record(&self, op: &str, path: &Path, size: Option<u64>, hash: Option<String>) {
        let (node_id, frame_id) = self.context.lock().clone();
        let payload = json!({
            "op": op,
            "path": path.display().to_string(),
            "size": size,
            "hash": hash,
            "frame_id": frame_id,
        });
        let result = events::record(
            &self.db,
            &self.execution_id,
            "fs",
            node_id.as_ref().map(NodeId::as_str),
            &format!("fs.{op}"),
            &payload,
            self.clock.epoch_ms(),
        );
        if let Err(e) = result {
            tracing::warn!(op, path = %path.display(), "failed to record fs op: {e}");
        }
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, FsError> {
        let full = self.resolve(path.as_ref())?;
        let bytes = std::fs::read(&full)?;
        self.record("read", path.as_ref(), Some(bytes.len() as u64), Some(hash_bytes(&bytes)));
        Ok(bytes)
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, FsError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes)
            .map_err(|e| FsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<(), FsError> {
        let full = self.resolve(path.as_ref())?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, contents)?;
        self.record("write", path.as_ref(), Some(contents.len() as u64), Some(hash_bytes(contents)));
        Ok(())
    }

    pub fn delete(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        let full = self.resolve(path.as_ref())?;
        std::fs::remove_file(&full)?;
        self.record("delete", path.as_ref(), None, None);
        Ok(())
    }

    /// SHA-256 of the file's content, hex-encoded.
    pub fn hash(&self, path: impl AsRef<Path>) -> Result<String, FsError> {
        let full = self.resolve(path.as_ref())?;
        let bytes = std::fs::read(&full)?;
        let digest = hash_bytes(&bytes);
        self.record("hash", path.as_ref(), Some(bytes.len() as u64), Some(digest.clone()));
        Ok(digest)
    }

    pub fn stat(&self, path: impl AsRef<Path>) -> Result<FileStat, FsError> {
        let full = self.resolve(path.as_ref())?;
        let meta = std::fs::metadata(&full)?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);
        self.record("stat", path.as_ref(), Some(meta.len()), None);
        Ok(FileStat { size: meta.len(), is_dir: meta.is_dir(), modified_ms })
    }

    /// Directory entries (names only), sorted.
    pub fn list_dir(&self, path: impl AsRef<Path>) -> Result<Vec<String>, FsError> {
        let full = self.resolve(path.as_ref())?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        self.record("list_dir", path.as_ref(), Some(names.len() as u64), None);
        Ok(names)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
