//! Debounced background export.
//!
//! One worker thread exclusively owns the storage handle and serializes
//! flush requests through a channel; there is no shared mutex to forget.
//! Rapid edits collapse into a single export once the debounce window
//! goes quiet. A failed flush is recorded and retried on the next cycle,
//! never propagated to the command that marked the store dirty.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use braid_core::error::Result;
use braid_core::jsonl;

use crate::storage::Storage;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Diagnostics for `braid doctor` style surfaces.
#[derive(Debug, Clone, Default)]
pub struct FlushStats {
    pub flushes: usize,
    pub consecutive_failures: usize,
    pub last_error: Option<String>,
}

enum Request {
    /// Something changed; flush once the window goes quiet.
    Mark,
    /// Flush immediately and report back.
    Now(Sender<std::result::Result<(), String>>),
    Shutdown,
}

/// Handle to the background flush worker.
pub struct FlushScheduler {
    tx: Sender<Request>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<FlushStats>>,
}

impl FlushScheduler {
    /// Start the worker. It takes exclusive ownership of the storage
    /// handle; every other actor talks to it through this scheduler.
    #[must_use]
    pub fn spawn(
        storage: Box<dyn Storage>,
        log_path: PathBuf,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(Mutex::new(FlushStats::default()));
        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name("braid-flush".to_string())
            .spawn(move || worker_loop(storage, &log_path, debounce, &rx, &worker_stats))
            .ok();
        Self {
            tx,
            worker,
            stats,
        }
    }

    /// Note a pending change. Returns immediately; the export happens
    /// after the debounce window.
    pub fn mark_dirty(&self) {
        let _ = self.tx.send(Request::Mark);
    }

    /// Flush synchronously, bypassing the debounce window.
    ///
    /// # Errors
    ///
    /// Returns `Flush` when the export failed or the worker is gone.
    pub fn flush_now(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Request::Now(reply_tx))
            .map_err(|_| braid_core::BraidError::Flush("flush worker is not running".into()))?;
        match reply_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(braid_core::BraidError::Flush(message)),
            Err(_) => Err(braid_core::BraidError::Flush(
                "flush worker exited without replying".into(),
            )),
        }
    }

    #[must_use]
    pub fn stats(&self) -> FlushStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut storage: Box<dyn Storage>,
    log_path: &PathBuf,
    debounce: Duration,
    rx: &Receiver<Request>,
    stats: &Arc<Mutex<FlushStats>>,
) {
    let mut pending = false;
    loop {
        match rx.recv_timeout(debounce) {
            Ok(Request::Mark) => {
                // Restart the quiet period; bursts collapse to one export.
                pending = true;
            }
            Ok(Request::Now(reply)) => {
                let outcome = flush(storage.as_mut(), log_path, stats);
                pending = false;
                let _ = reply.send(outcome.map_err(|e| e.to_string()));
            }
            Ok(Request::Shutdown) => {
                if pending {
                    let _ = flush(storage.as_mut(), log_path, stats);
                }
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                if pending && flush(storage.as_mut(), log_path, stats).is_ok() {
                    pending = false;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if pending {
                    let _ = flush(storage.as_mut(), log_path, stats);
                }
                return;
            }
        }
    }
}

fn flush(
    storage: &mut dyn Storage,
    log_path: &PathBuf,
    stats: &Arc<Mutex<FlushStats>>,
) -> Result<()> {
    let outcome = try_flush(storage, log_path);
    if let Ok(mut stats) = stats.lock() {
        match &outcome {
            Ok(()) => {
                stats.flushes += 1;
                stats.consecutive_failures = 0;
                stats.last_error = None;
            }
            Err(e) => {
                stats.consecutive_failures += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }
    if let Err(e) = &outcome {
        // Degrade to "try again next cycle"; the host keeps running.
        error!(error = %e, "flush failed");
    }
    outcome
}

fn try_flush(storage: &mut dyn Storage, log_path: &PathBuf) -> Result<()> {
    let dirty = storage.dirty_count()?;
    if dirty == 0 {
        debug!("nothing to flush");
        return Ok(());
    }
    let issues = storage.export_issues()?;
    jsonl::save(log_path, &issues)?;
    storage.clear_dirty()?;
    info!(records = issues.len(), dirty, "flushed issue log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{Issue, MemStore};
    use tempfile::TempDir;

    fn dirty_store(id: &str) -> Box<MemStore> {
        let mut store = MemStore::new();
        store.put_imported(Issue {
            id: id.to_string(),
            title: "Flush me".to_string(),
            ..Default::default()
        });
        Box::new(store)
    }

    #[test]
    fn debounced_flush_writes_after_quiet_period() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let scheduler = FlushScheduler::spawn(
            dirty_store("bi-abc"),
            path.clone(),
            Duration::from_millis(20),
        );

        scheduler.mark_dirty();
        scheduler.mark_dirty();
        scheduler.mark_dirty();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !path.exists() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(path.exists(), "flush never happened");
        assert!(std::fs::read_to_string(&path).unwrap().contains("bi-abc"));
        assert_eq!(scheduler.stats().flushes, 1);
    }

    #[test]
    fn flush_now_bypasses_debounce() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let scheduler =
            FlushScheduler::spawn(dirty_store("bi-now"), path.clone(), Duration::from_secs(60));

        scheduler.flush_now().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn failure_is_tracked_not_fatal() {
        let dir = TempDir::new().unwrap();
        // Parent directory missing: the save fails.
        let path = dir.path().join("missing").join("sub").join("issues.jsonl");
        let scheduler =
            FlushScheduler::spawn(dirty_store("bi-err"), path, Duration::from_secs(60));

        assert!(scheduler.flush_now().is_err());
        let stats = scheduler.stats();
        assert_eq!(stats.consecutive_failures, 1);
        assert!(stats.last_error.is_some());

        // The worker survives and keeps answering.
        assert!(scheduler.flush_now().is_err());
        assert_eq!(scheduler.stats().consecutive_failures, 2);
    }

    #[test]
    fn clean_store_flushes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let scheduler = FlushScheduler::spawn(
            Box::new(MemStore::new()),
            path.clone(),
            Duration::from_secs(60),
        );
        scheduler.flush_now().unwrap();
        assert!(!path.exists());
    }
}
