//! Named registry of compiled executables.
//!
//! Executables are immutable once inserted. Runs borrow them through an
//! [`Arc`], so a delete during a run only drops the registry's handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

/// Named storage of executables, injected into the execution engine.
pub trait ExecutableStore<E>: Send + Sync {
    fn contains(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<Arc<E>>;

    /// Insert under a fresh name. Returns `false` if the name is taken.
    fn insert(&self, name: &str, executable: E) -> bool;

    /// Returns `false` if nothing was registered under `name`.
    fn remove(&self, name: &str) -> bool;
}

/// In-memory [`ExecutableStore`].
pub struct ExecutableRegistry<E> {
    executables: Mutex<FxHashMap<String, Arc<E>>>,
}

impl<E> Default for ExecutableRegistry<E> {
    fn default() -> Self {
        Self {
            executables: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<E> ExecutableRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, FxHashMap<String, Arc<E>>> {
        self.executables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
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
}

impl<E: Send + Sync> ExecutableStore<E> for ExecutableRegistry<E> {
    fn contains(&self, name: &str) -> bool {
        self.map().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<E>> {
        self.map().get(name).cloned()
    }

    fn insert(&self, name: &str, executable: E) -> bool {
        let mut map = self.map();
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_string(), Arc::new(executable));
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.map().remove(name).is_some()
    }
}
