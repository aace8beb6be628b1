//! Per-stream reconciliation state.
//!
//! A streamed reply arrives as several units sharing a stream id. The first
//! one creates a Slack message; later ones overwrite it through
//! `chat.update`. This module remembers, per stream id, the `ts` of that
//! message and whether the final chunk has been delivered.
//!
//! Entries expire `ttl` after creation. Expired entries are swept whenever a
//! new stream opens and on every tick of [`spawn_sweeper`]; when the cache is
//! full the oldest entry is dropped to make room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{DEFAULT_STREAM_CAPACITY, DEFAULT_STREAM_TTL};

/// State of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEntry {
    /// `ts` of the Slack message carrying this stream, once created.
    pub remote_ts: Option<String>,
    /// Set once the last chunk went out; later chunks are dropped.
    pub completed: bool,
    /// Text of the most recent chunk that carried any.
    pub text: Vec<String>,
}

/// Handle to an entry.
///
/// Holding the lock serializes chunks of the same stream, so a create can
/// never race another create or an update for that stream.
pub type SharedStreamEntry = Arc<tokio::sync::Mutex<StreamEntry>>;

#[derive(Debug)]
struct Slot {
    created_at: Instant,
    entry: SharedStreamEntry,
}

/// TTL- and capacity-bounded map of stream id to [`StreamEntry`].
#[derive(Debug)]
pub struct StreamStateCache {
    ttl: Duration,
    capacity: usize,
    slots: HashMap<String, Slot>,
}

impl Default for StreamStateCache {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_TTL, DEFAULT_STREAM_CAPACITY)
    }
}

impl StreamStateCache {
    /// `capacity` is clamped to at least one entry.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            slots: HashMap::new(),
        }
    }

    /// Start a fresh entry for `stream_id`, replacing any existing one.
    pub fn open(&mut self, stream_id: &str) -> SharedStreamEntry {
        self.sweep();

        if !self.slots.contains_key(stream_id) && self.slots.len() >= self.capacity {
            self.evict_oldest();
        }

        let entry = SharedStreamEntry::default();
        self.slots.insert(
            stream_id.to_string(),
            Slot {
                created_at: Instant::now(),
                entry: entry.clone(),
            },
        );
        entry
    }

    pub fn get(&self, stream_id: &str) -> Option<SharedStreamEntry> {
        self.slots.get(stream_id).map(|slot| slot.entry.clone())
    }

    /// Existing entry, or a new one if the stream is unknown.
    pub fn get_or_open(&mut self, stream_id: &str) -> SharedStreamEntry {
        match self.get(stream_id) {
            Some(entry) => entry,
            None => self.open(stream_id),
        }
    }

    pub fn remove(&mut self, stream_id: &str) -> bool {
        self.slots.remove(stream_id).is_some()
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.slots.contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every entry older than the TTL, completed or not.
    ///
    /// Returns how many entries were removed.
    pub fn sweep(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.created_at.elapsed() <= ttl);
        let removed = before - self.slots.len();
        if removed > 0 {
            debug!("Aged out {} stream state entries", removed);
        }
        removed
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.created_at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            debug!("Stream state full, evicting {}", id);
            self.slots.remove(&id);
        }
    }
}

/// Sweep `cache` every `period` until the returned task is aborted.
///
/// Age counts from when a stream opened, not from its latest chunk. A reply
/// still streaming after the TTL loses its entry and its next chunk posts a
/// new message, so keep the TTL above the longest expected stream.
pub fn spawn_sweeper(cache: Arc<Mutex<StreamStateCache>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            cache.lock().sweep();
        }
    })
}
