// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact watcher: reloads the active corpus when another process rewrites
//! the index, with debouncing

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::Path;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::index::ArtifactPaths;
use crate::rag::RetrievalOrchestrator;

/// Default debounce interval in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Watches the artifact directory and calls [`RetrievalOrchestrator::reload`].
pub struct ArtifactWatcher {
    orchestrator: Arc<RetrievalOrchestrator>,
    debounce_duration: Duration,
}

/// Keeps the watcher alive. Dropping it stops the reload thread.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    thread: JoinHandle<()>,
}

impl WatchHandle {
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }
}

impl ArtifactWatcher {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>) -> Self {
        Self {
            orchestrator,
            debounce_duration: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Create watcher with custom debounce interval
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_duration = debounce;
        self
    }

    /// Starts watching on a background thread.
    pub fn spawn(self) -> Result<WatchHandle> {
        let (tx, rx) = channel();
        let paths = self.orchestrator.paths().clone();
        let dir = paths
            .index
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
        let mut watcher = RecommendedWatcher::new(tx, config)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), debounce_ms = self.debounce_duration.as_millis() as u64, "watching index artifacts");

        let thread = std::thread::Builder::new()
            .name("docqa-watch".to_string())
            .spawn(move || {
                let mut last_event_time: Option<Instant> = None;

                loop {
                    let timeout = if last_event_time.is_none() {
                        Duration::from_secs(60)
                    } else {
                        self.debounce_duration
                    };

                    match rx.recv_timeout(timeout) {
                        Ok(Ok(event)) => {
                            if touches_artifacts(&event, &paths) {
                                last_event_time = Some(Instant::now());
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, "watch error");
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let settled = last_event_time
                        .map(|last| last.elapsed() >= self.debounce_duration)
                        .unwrap_or(false);
                    if settled {
                        last_event_time = None;
                        match self.orchestrator.reload() {
                            Ok(rows) => tracing::info!(rows, "reloaded corpus after artifact change"),
                            // A half-written pair shows up as corrupt; the next event retries.
                            Err(e) => tracing::warn!(error = %e, "reload after artifact change failed"),
                        }
                    }
                }
                tracing::debug!("artifact watcher stopped");
            })
            .context("Failed to spawn watcher thread")?;

        Ok(WatchHandle {
            _watcher: watcher,
            thread,
        })
    }
}

/// Whether `event` created, changed or removed one of the two artifacts.
fn touches_artifacts(event: &Event, paths: &ArtifactPaths) -> bool {
    use notify::EventKind::*;
    if !matches!(event.kind, Create(_) | Modify(_) | Remove(_)) {
        return false;
    }
    let names = [paths.index.file_name(), paths.metadata.file_name()];
    event
        .paths
        .iter()
        .any(|path| names.contains(&path.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashProvider, SharedEmbedder};
    use crate::index::{ChunkRecord, IndexBackend};
    use crate::rag::IngestMode;
    use notify::event::{CreateKind, EventKind, ModifyKind};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn orchestrator(dir: &Path) -> Arc<RetrievalOrchestrator> {
        let embedder = Arc::new(SharedEmbedder::new(Box::new(HashProvider::new(8))));
        let orchestrator =
            RetrievalOrchestrator::new(ArtifactPaths::in_dir(dir), IndexBackend::detect(), embedder);
        orchestrator.reload().unwrap();
        Arc::new(orchestrator)
    }

    #[test]
    fn test_touches_artifacts() {
        let paths = ArtifactPaths::in_dir("/idx");
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/idx/index.bin"));
        assert!(touches_artifacts(&event, &paths));

        let tmp = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/idx/index.bin.tmp"));
        assert!(!touches_artifacts(&tmp, &paths));

        let cache = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/idx/embeddings.sqlite"));
        assert!(!touches_artifacts(&cache, &paths));
    }

    #[test]
    fn test_reloads_after_external_commit() {
        let dir = tempdir().unwrap();
        let reader = orchestrator(dir.path());
        let handle = ArtifactWatcher::new(reader.clone())
            .with_debounce(Duration::from_millis(100))
            .spawn()
            .unwrap();
        assert!(handle.is_running());

        let writer = orchestrator(dir.path());
        writer
            .commit(
                vec![ChunkRecord::new(1, 1, "fresh", "doc.txt")],
                vec![vec![1.0; 8]],
                IngestMode::Replace,
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while reader.len() != 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(reader.len(), 1);
        drop(handle);
    }
}
