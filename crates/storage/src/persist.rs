// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared persistence plumbing: atomic file writes, tolerant loads, and the
//! debounced background saver.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Write `bytes` to `path` via a sibling temp file and rename, so a reader
/// never sees a half-written file. Errors are returned for the caller to
/// swallow.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Best-effort load: missing, unreadable, or malformed files yield `None`.
pub(crate) fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// RFC3339 stamp for the `updatedAt` field of store files.
pub(crate) fn updated_at_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A store inner that can snapshot itself to disk.
pub(crate) trait Persist: Send + Sync + 'static {
    fn save_state(&self) -> &SaveState;
    /// Serialize and write the current snapshot, swallowing disk errors.
    fn write_now(&self);
}

/// Debounce bookkeeping shared by all stores.
pub(crate) struct SaveState {
    notify: Notify,
    saver_started: AtomicBool,
    debounce: Duration,
}

impl SaveState {
    pub(crate) fn new(debounce: Duration) -> Self {
        Self { notify: Notify::new(), saver_started: AtomicBool::new(false), debounce }
    }
}

/// Schedule a debounced save. The first call on a tokio runtime spawns the
/// saver task; callers outside a runtime only mark the store dirty and rely
/// on `flush()`.
pub(crate) fn schedule_save<P: Persist>(inner: &Arc<P>) {
    let state = inner.save_state();
    if !state.saver_started.swap(true, Ordering::SeqCst) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(inner);
                handle.spawn(async move {
                    loop {
                        inner.save_state().notify.notified().await;
                        tokio::time::sleep(inner.save_state().debounce).await;
                        inner.write_now();
                    }
                });
            }
            Err(_) => state.saver_started.store(false, Ordering::SeqCst),
        }
    }
    state.notify.notify_one();
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
