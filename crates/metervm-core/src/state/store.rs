//! Byte-addressed key/value state observed by running programs.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Status reported by I/O observer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    Ok,
    /// The caller's buffer cannot hold the stored value.
    BufferTooSmall,
    /// The key was never written.
    PermissionDenied,
}

impl IoStatus {
    pub fn is_ok(self) -> bool {
        self == IoStatus::Ok
    }
}

/// Interface through which an interpreter reads and writes persistent state.
pub trait IoObserver {
    /// Store `bytes` under `key`, replacing any previous value.
    fn write(&mut self, key: &str, bytes: &[u8]) -> IoStatus;

    /// Copy the value stored under `key` into `buffer`.
    ///
    /// On [`IoStatus::Ok`] and [`IoStatus::BufferTooSmall`], `size` is set to
    /// the stored size. Nothing is copied when the buffer is too small. An
    /// unknown key leaves `size` untouched.
    fn read(&self, key: &str, buffer: &mut [u8], size: &mut u64) -> IoStatus;

    /// [`IoStatus::Ok`] iff a value is stored under `key`.
    fn exists(&self, key: &str) -> IoStatus;
}

/// A mutable key/value container.
///
/// Values are owned byte buffers, so [`State::deep_copy`] yields a fully
/// independent state.
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct State {
    entries: BTreeMap<String, Vec<u8>>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy of the current contents.
    pub fn deep_copy(&self) -> State {
        State {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_vec()))
                .collect(),
        }
    }

    /// Stored bytes for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Encode the state with bincode.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a state produced by [`State::snapshot`].
    pub fn from_snapshot(bytes: &[u8]) -> Result<State> {
        let (state, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(state)
    }
}

impl IoObserver for State {
    fn write(&mut self, key: &str, bytes: &[u8]) -> IoStatus {
        self.entries.insert(key.to_string(), bytes.to_vec());
        IoStatus::Ok
    }

    fn read(&self, key: &str, buffer: &mut [u8], size: &mut u64) -> IoStatus {
        let Some(stored) = self.entries.get(key) else {
            return IoStatus::PermissionDenied;
        };

        *size = stored.len() as u64;
        if buffer.len() < stored.len() {
            return IoStatus::BufferTooSmall;
        }

        buffer[..stored.len()].copy_from_slice(stored);
        IoStatus::Ok
    }

    fn exists(&self, key: &str) -> IoStatus {
        if self.entries.contains_key(key) {
            IoStatus::Ok
        } else {
            IoStatus::PermissionDenied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut state = State::new();
        assert_eq!(state.write("key", b"value"), IoStatus::Ok);

        let mut buffer = [0u8; 5];
        let mut size = 0;
        assert_eq!(state.read("key", &mut buffer, &mut size), IoStatus::Ok);
        assert_eq!(size, 5);
        assert_eq!(&buffer, b"value");
    }

    #[test]
    fn test_read_into_larger_buffer_reports_stored_size() {
        let mut state = State::new();
        state.write("key", b"abc");

        let mut buffer = [0xffu8; 16];
        let mut size = buffer.len() as u64;
        assert_eq!(state.read("key", &mut buffer, &mut size), IoStatus::Ok);
        assert_eq!(size, 3);
        assert_eq!(&buffer[..3], b"abc");
        // Bytes past the stored value are untouched.
        assert!(buffer[3..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_read_into_smaller_buffer() {
        let mut state = State::new();
        state.write("key", b"long value");

        let mut buffer = [0u8; 4];
        let mut size = buffer.len() as u64;
        assert_eq!(
            state.read("key", &mut buffer, &mut size),
            IoStatus::BufferTooSmall
        );
        assert_eq!(size, 10);
        assert_eq!(buffer, [0u8; 4]);
    }

    #[test]
    fn test_read_unknown_key() {
        let state = State::new();
        let mut buffer = [0u8; 4];
        let mut size = 4;
        assert_eq!(
            state.read("missing", &mut buffer, &mut size),
            IoStatus::PermissionDenied
        );
        assert_eq!(size, 4);
        assert_eq!(state.exists("missing"), IoStatus::PermissionDenied);
    }

    #[test]
    fn test_write_overwrites() {
        let mut state = State::new();
        state.write("key", b"first");
        state.write("key", b"2nd");
        assert_eq!(state.get("key"), Some(&b"2nd"[..]));
        assert_eq!(state.exists("key"), IoStatus::Ok);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_deep_copy_independence() {
        let mut original = State::new();
        original.write("a", b"1");
        original.write("b", b"2");

        let mut copy = original.deep_copy();
        copy.write("a", b"changed");
        original.write("b", b"also changed");

        assert_eq!(original.get("a"), Some(&b"1"[..]));
        assert_eq!(copy.get("a"), Some(&b"changed"[..]));
        assert_eq!(copy.get("b"), Some(&b"2"[..]));
        assert_eq!(original.get("b"), Some(&b"also changed"[..]));
    }

    #[test]
    fn test_snapshot_restores_contents() {
        let mut state = State::new();
        state.write("counter", &7i64.to_le_bytes());
        state.write("empty", b"");

        let bytes = state.snapshot().unwrap();
        let restored = State::from_snapshot(&bytes).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.keys().collect::<Vec<_>>(), vec!["counter", "empty"]);
    }

    #[test]
    fn test_from_snapshot_rejects_garbage() {
        assert!(State::from_snapshot(&[0xff, 0xff, 0xff]).is_err());
    }
}
