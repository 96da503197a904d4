//! Named registry of states for one target.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::error::Result;

use super::store::State;

/// A state shared between the registry and an in-flight run.
///
/// A run holds the mutex for its whole duration.
pub type SharedState = Arc<Mutex<State>>;

/// Named storage of states, injected into the execution engine.
///
/// Implementations only guard the name map; the per-state mutex is taken by
/// the engine, never while a map lock is held.
pub trait StateStore: Send + Sync {
    fn contains(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<SharedState>;

    /// Insert under a fresh name. Returns `false` if the name is taken.
    fn insert(&self, name: &str, state: State) -> bool;

    /// Remove `name` only if it still maps to `expected`.
    fn remove(&self, name: &str, expected: &SharedState) -> bool;
}

/// In-memory [`StateStore`] with snapshot persistence.
#[derive(Default)]
pub struct StateRegistry {
    states: Mutex<FxHashMap<String, SharedState>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, FxHashMap<String, SharedState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.map().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Write every state to `<dir>/<hex(name)>.state`.
    ///
    /// Each state is locked in turn, so a flush waits for in-flight runs.
    pub fn flush(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let entries: Vec<(String, SharedState)> = self
            .map()
            .iter()
            .map(|(name, state)| (name.clone(), Arc::clone(state)))
            .collect();

        for (name, state) in &entries {
            let bytes = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()?;
            fs::write(snapshot_path(dir, name), bytes)?;
        }

        tracing::debug!("Flushed {} states to {}", entries.len(), dir.display());
        Ok(entries.len())
    }

    /// Load snapshots written by [`StateRegistry::flush`].
    ///
    /// Existing states are overwritten in place, after any run holding them
    /// finishes. Files that fail to decode are skipped.
    pub fn restore(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().is_some_and(|e| e == "state")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some(name) = hex_decode(stem)
            {
                let bytes = fs::read(&path)?;
                match State::from_snapshot(&bytes) {
                    Ok(state) => {
                        self.replace(name, state);
                        count += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to restore state {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("Restored {} states", count);
        Ok(count)
    }
}

impl StateRegistry {
    /// Register `state` under `name`, replacing the contents of a live state
    /// rather than orphaning it.
    fn replace(&self, name: String, state: State) {
        // Clone out of the map so a run holding the state can still look it up.
        let existing = self.map().get(&name).cloned();
        match existing {
            Some(shared) => *shared.lock().unwrap_or_else(PoisonError::into_inner) = state,
            None => {
                self.map().insert(name, Arc::new(Mutex::new(state)));
            }
        }
    }
}

impl StateStore for StateRegistry {
    fn contains(&self, name: &str) -> bool {
        self.map().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<SharedState> {
        self.map().get(name).cloned()
    }

    fn insert(&self, name: &str, state: State) -> bool {
        let mut map = self.map();
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_string(), Arc::new(Mutex::new(state)));
        true
    }

    fn remove(&self, name: &str, expected: &SharedState) -> bool {
        let mut map = self.map();
        match map.get(name) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                map.remove(name);
                true
            }
            _ => false,
        }
    }
}

fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.state", hex_encode(name)))
}

fn hex_encode(name: &str) -> String {
    name.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(text: &str) -> Option<String> {
    if text.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IoObserver;

    #[test]
    fn test_insert_rejects_duplicate() {
        let registry = StateRegistry::new();
        assert!(registry.insert("s1", State::new()));
        assert!(!registry.insert("s1", State::new()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_requires_same_instance() {
        let registry = StateRegistry::new();
        registry.insert("s1", State::new());
        let stale = Arc::new(Mutex::new(State::new()));
        assert!(!registry.remove("s1", &stale));

        let current = registry.get("s1").unwrap();
        assert!(registry.remove("s1", &current));
        assert!(!registry.contains("s1"));
        assert!(!registry.remove("s1", &current));
    }

    #[test]
    fn test_hex_names() {
        assert_eq!(hex_encode("a/b"), "612f62");
        assert_eq!(hex_decode("612f62").as_deref(), Some("a/b"));
        assert_eq!(hex_decode("6"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn test_flush_and_restore() {
        let dir = tempfile::tempdir().unwrap();

        let registry = StateRegistry::new();
        registry.insert("counter state", State::new());
        registry
            .get("counter state")
            .unwrap()
            .lock()
            .unwrap()
            .write("n", &3i64.to_le_bytes());
        registry.insert("empty", State::new());
        assert_eq!(registry.flush(dir.path()).unwrap(), 2);

        let restored = StateRegistry::new();
        assert_eq!(restored.restore(dir.path()).unwrap(), 2);
        assert_eq!(restored.names(), vec!["counter state", "empty"]);

        let state = restored.get("counter state").unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.get("n"), Some(&3i64.to_le_bytes()[..]));
    }

    #[test]
    fn test_restore_replaces_live_state_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let saved = StateRegistry::new();
        saved.insert("s", State::new());
        saved.get("s").unwrap().lock().unwrap().write("n", b"saved");
        saved.flush(dir.path()).unwrap();

        let registry = Arc::new(StateRegistry::new());
        registry.insert("s", State::new());
        let live = registry.get("s").unwrap();
        let mut guard = live.lock().unwrap();

        let restorer = {
            let registry = Arc::clone(&registry);
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || registry.restore(dir).unwrap())
        };

        // A run still holding the state finishes before the restore lands.
        std::thread::sleep(std::time::Duration::from_millis(50));
        guard.write("n", b"from run");
        drop(guard);

        assert_eq!(restorer.join().unwrap(), 1);
        assert!(Arc::ptr_eq(&live, &registry.get("s").unwrap()));
        assert_eq!(live.lock().unwrap().get("n"), Some(&b"saved"[..]));
    }

    #[test]
    fn test_restore_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("{}.state", hex_encode("bad"))), [0xff]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = StateRegistry::new();
        assert_eq!(registry.restore(dir.path()).unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_restore_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StateRegistry::new();
        assert_eq!(registry.restore(dir.path().join("absent")).unwrap(), 0);
    }
}
