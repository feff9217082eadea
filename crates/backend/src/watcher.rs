// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced file-system watcher
//!
//! Wraps `notify` with a debounce window and noise filtering (build
//! output, package stores, VCS internals). Surviving change batches
//! invoke the re-render callback once per window.

use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Paths nobody wants re-renders for.
const NOISE_PATTERNS: &[&str] = &[
    "**/target/**",
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/__pycache__/**",
    "**/.smithers/**",
    "**/*.swp",
    "**/*.tmp",
];

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    pub extra_ignores: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(300), extra_ignores: Vec::new() }
    }
}

pub struct FsWatcher {
    // Held for its Drop; dropping stops the native watcher.
    _watcher: RecommendedWatcher,
    handle: tokio::task::JoinHandle<()>,
}

impl FsWatcher {
    /// Watch `root` recursively. `on_change` runs once per debounce
    /// window with the batch of changed paths.
    pub fn spawn(
        root: &Path,
        config: WatcherConfig,
        on_change: impl Fn(Vec<PathBuf>) + Send + Sync + 'static,
    ) -> Result<Self, WatchError> {
        let ignores = build_ignores(&config.extra_ignores);
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if let Ok(event) = result {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let handle = tokio::spawn(debounce_loop(rx, ignores, config.debounce, Arc::new(on_change)));

        Ok(Self { _watcher: watcher, handle })
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

fn build_ignores(extra: &[String]) -> Vec<Pattern> {
    NOISE_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .chain(extra.iter().cloned())
        .filter_map(|p| Pattern::new(&p).ok())
        .collect()
}

/// True when a change at this path should be dropped.
pub fn is_noise(path: &Path, ignores: &[Pattern]) -> bool {
    ignores.iter().any(|pattern| pattern.matches_path(path))
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    ignores: Vec<Pattern>,
    window: Duration,
    on_change: Arc<dyn Fn(Vec<PathBuf>) + Send + Sync>,
) {
    loop {
        let Some(first) = rx.recv().await else {
            return;
        };

        let mut batch = Vec::new();
        if !is_noise(&first, &ignores) {
            batch.push(first);
        }

        // Collect everything else arriving within the window.
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(path)) => {
                    if !is_noise(&path, &ignores) && !batch.contains(&path) {
                        batch.push(path);
                    }
                }
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            tracing::debug!(changed = batch.len(), "fs change batch");
            on_change(batch);
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
