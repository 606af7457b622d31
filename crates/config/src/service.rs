//! Hot-reloadable [`RuntimeConfig`] snapshots.
//!
//! Outside of a turn the live config may be reloaded at any time (file
//! watch via `notify`); a turn acquires one [`RuntimeConfig`] snapshot
//! at entry and keeps it for the turn's whole duration so a concurrent
//! reload never flips a flag mid-turn.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use notify::{Event, RecursiveMode, Watcher};

use crate::{ConfigError, RuntimeConfig};

pub struct ConfigService {
    path: PathBuf,
    live: Arc<RwLock<Arc<RuntimeConfig>>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ConfigService {
    /// Loads the config at `path` and starts watching it for changes.
    /// A reload that fails validation is logged and discarded; the
    /// previous snapshot stays live.
    pub fn watch(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let initial = RuntimeConfig::load_from(&path)?;
        let live = Arc::new(RwLock::new(Arc::new(initial)));

        let watch_live = live.clone();
        let watch_path = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_err() {
                return;
            }
            match RuntimeConfig::load_from(&watch_path) {
                Ok(reloaded) => {
                    tracing::info!(path = %watch_path.display(), "config reloaded");
                    *watch_live.write().expect("config lock poisoned") = Arc::new(reloaded);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed validation, keeping previous snapshot");
                }
            }
        })
        .map_err(|e| ConfigError::Validation(format!("failed to start config watcher: {e}")))?;

        // Watching a possibly-not-yet-created file is fine: `notify` will
        // pick up create events once the parent directory exists.
        if let Some(parent) = path.parent().filter(|p| p.exists()) {
            let _ = watcher.watch(parent, RecursiveMode::NonRecursive);
        }

        Ok(Self {
            path,
            live,
            _watcher: Some(watcher),
        })
    }

    /// Builds a service over an in-memory config with no file watch.
    /// Used by tests and by callers who manage reload themselves.
    pub fn in_memory(config: RuntimeConfig) -> Self {
        Self {
            path: PathBuf::new(),
            live: Arc::new(RwLock::new(Arc::new(config))),
            _watcher: None,
        }
    }

    /// Acquires an immutable snapshot. Call once at turn entry and hold
    /// it for the turn's duration.
    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.live.read().expect("config lock poisoned").clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces an immediate reload outside of the watcher (used by the
    /// settings-admin PUT path after writing a new section to disk).
    pub fn reload(&self) -> Result<(), ConfigError> {
        let reloaded = RuntimeConfig::load_from(&self.path)?;
        *self.live.write().expect("config lock poisoned") = Arc::new(reloaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_snapshot_reflects_initial_config() {
        let mut cfg = RuntimeConfig::default();
        cfg.turn.max_llm_calls = 42;
        let svc = ConfigService::in_memory(cfg);
        assert_eq!(svc.snapshot().turn.max_llm_calls, 42);
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        RuntimeConfig::default().save_to(&path).unwrap();

        let svc = ConfigService::watch(&path).unwrap();
        assert_eq!(svc.snapshot().turn.max_llm_calls, 200);

        let mut updated = RuntimeConfig::default();
        updated.turn.max_llm_calls = 7;
        updated.save_to(&path).unwrap();
        svc.reload().unwrap();
        assert_eq!(svc.snapshot().turn.max_llm_calls, 7);
    }
}
