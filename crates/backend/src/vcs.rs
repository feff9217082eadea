// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-control integration
//!
//! Identifies the working-copy backend and creates/cleans ephemeral
//! isolated copies for parallel execution. Copies exclude VCS internals
//! and build noise; they are plain directories, not linked clones.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    None,
}

/// Directories never copied into an ephemeral workspace.
const COPY_EXCLUDES: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".smithers"];

#[derive(Debug, Clone)]
pub struct VcsBackend {
    root: PathBuf,
    kind: VcsKind,
}

impl VcsBackend {
    /// Identify the backend for a working copy.
    pub fn detect(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let kind = if root.join(".git").exists() { VcsKind::Git } else { VcsKind::None };
        Self { root, kind }
    }

    pub fn kind(&self) -> VcsKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy the working tree into `base/name` for isolated execution.
    pub fn create_ephemeral_copy(&self, base: &Path, name: &str) -> Result<PathBuf, VcsError> {
        if !self.root.is_dir() {
            return Err(VcsError::NotADirectory(self.root.clone()));
        }
        let dest = base.join(name);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        copy_tree(&self.root, &dest)?;
        tracing::info!(src = %self.root.display(), dest = %dest.display(), "created ephemeral copy");
        Ok(dest)
    }

    /// Remove an ephemeral copy created by this backend.
    pub fn clean_ephemeral(&self, path: &Path) -> Result<(), VcsError> {
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if COPY_EXCLUDES.iter().any(|ex| name.to_string_lossy() == *ex) {
            continue;
        }
        let from = entry.path();
        let to = dest.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
