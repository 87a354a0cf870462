//! Durable FIFO of locally composed messages awaiting server confirmation.

use std::collections::VecDeque;

use crate::error::SyncError;
use crate::model::{Message, PendingMessage, PROVISIONAL_ID_PREFIX};
use crate::state::now_millis;

use super::cache_store::CacheStore;

pub struct Outbox {
    entries: VecDeque<PendingMessage>,
    store: CacheStore,
    seq: u64,
    draining: bool,
    max_attempts: Option<u32>,
}

impl Outbox {
    /// Load whatever a previous run left queued.
    pub fn open(store: CacheStore, max_attempts: Option<u32>) -> Self {
        let entries: VecDeque<PendingMessage> = store.load_outbox().into();
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "outbox restored");
        }
        Self {
            entries,
            store,
            seq: 0,
            draining: false,
            max_attempts,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PendingMessage> {
        self.entries.iter()
    }

    pub fn get(&self, temp_id: &str) -> Option<&PendingMessage> {
        self.entries.iter().find(|p| p.temp_id == temp_id)
    }

    /// Whether an automatic drain would attempt anything.
    pub fn has_eligible(&self) -> bool {
        self.entries.iter().any(|p| !p.parked)
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Provisional list entries for everything still queued, in queue order.
    pub fn provisional_messages(&self, author_name: &str) -> Vec<Message> {
        self.entries
            .iter()
            .map(|p| p.provisional_message(author_name))
            .collect()
    }

    pub fn enqueue(&mut self, text: &str, author_id: &str) -> PendingMessage {
        let queued_at = now_millis();
        self.seq = self.seq.wrapping_add(1);
        // Millisecond clock alone collides on rapid sends; the sequence number separates
        // sends within one run and the random suffix separates runs.
        let temp_id = format!(
            "{PROVISIONAL_ID_PREFIX}{queued_at}_{}_{:04x}",
            self.seq,
            rand::random::<u16>()
        );
        let pending = PendingMessage {
            temp_id,
            text: text.to_string(),
            author_id: author_id.to_string(),
            queued_at,
            retry_count: 0,
            last_error: None,
            parked: false,
        };
        self.entries.push_back(pending.clone());
        self.persist();
        tracing::debug!(temp_id = %pending.temp_id, queued = self.entries.len(), "outbox enqueue");
        pending
    }

    /// Start a drain pass. Returns the entries to attempt in FIFO order, or `None`
    /// when a pass is already running.
    pub fn begin_drain(&mut self) -> Option<Vec<PendingMessage>> {
        if self.draining {
            return None;
        }
        self.draining = true;
        Some(self.entries.iter().filter(|p| !p.parked).cloned().collect())
    }

    pub fn finish_drain(&mut self) {
        self.draining = false;
    }

    /// The server accepted the entry.
    pub fn confirm(&mut self, temp_id: &str) -> Option<PendingMessage> {
        let idx = self.entries.iter().position(|p| p.temp_id == temp_id)?;
        let removed = self.entries.remove(idx);
        if let Err(e) = self.store.remove_from_outbox(temp_id) {
            tracing::warn!(%e, temp_id, "failed to remove confirmed entry from persisted outbox");
            self.persist();
        }
        removed
    }

    /// The entry stays queued for the next drain. Returns whether it is now parked.
    pub fn record_failure(&mut self, temp_id: &str, error: &SyncError) -> bool {
        let max_attempts = self.max_attempts;
        let Some(entry) = self.entries.iter_mut().find(|p| p.temp_id == temp_id) else {
            return false;
        };
        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.last_error = Some(error.to_string());
        if let Some(max) = max_attempts {
            if entry.retry_count >= max {
                entry.parked = true;
            }
        }
        let parked = entry.parked;
        let retry_count = entry.retry_count;
        self.persist();
        tracing::info!(temp_id, retry_count, parked, %error, "outbox send failed");
        parked
    }

    /// Make a parked entry eligible again. Returns whether the entry exists.
    pub fn retry(&mut self, temp_id: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|p| p.temp_id == temp_id) else {
            return false;
        };
        entry.parked = false;
        entry.retry_count = 0;
        self.persist();
        true
    }

    pub fn discard(&mut self, temp_id: &str) -> Option<PendingMessage> {
        let idx = self.entries.iter().position(|p| p.temp_id == temp_id)?;
        let removed = self.entries.remove(idx);
        self.persist();
        removed
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save_outbox(self.entries.make_contiguous()) {
            tracing::warn!(%e, "failed to persist outbox");
        }
    }
}
