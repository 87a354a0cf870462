//! The de-duplicated, arrival-ordered message list the UI renders.
//!
//! Every mutation is followed by a wholesale snapshot write to the cache store.

use std::collections::HashSet;

use crate::model::{Message, MessageId};

use super::cache_store::CacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended,
    /// The id was already present; nothing changed.
    DuplicateSuppressed,
}

pub struct Timeline {
    messages: Vec<Message>,
    store: CacheStore,
    /// Confirmed ids that landed while a fetch was in flight; `None` when no fetch is.
    arrived_during_fetch: Option<HashSet<MessageId>>,
}

impl Timeline {
    /// Load the cached snapshot. Provisional entries are dropped; the outbox is the
    /// source of truth for those and re-attaches them.
    pub fn open(store: CacheStore) -> Self {
        let messages = confirmed_only(store.load());
        Self {
            messages,
            store,
            arrived_during_fetch: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn newest_confirmed(&self) -> Option<u64> {
        self.messages.iter().filter_map(|m| m.id.confirmed()).max()
    }

    /// Start recording arrivals so the next [`Timeline::replace_all`] keeps them.
    pub fn begin_fetch(&mut self) {
        self.arrived_during_fetch = Some(HashSet::new());
    }

    fn record_arrival(&mut self, id: &MessageId) {
        if let Some(arrived) = self.arrived_during_fetch.as_mut() {
            arrived.insert(id.clone());
        }
    }

    /// Live update ingest: append unless the id is already known.
    pub fn on_incoming(&mut self, message: Message) -> IngestOutcome {
        if self.contains(&message.id) {
            return IngestOutcome::DuplicateSuppressed;
        }
        self.record_arrival(&message.id);
        self.messages.push(message);
        self.persist();
        IngestOutcome::Appended
    }

    /// Append provisional entries that are not shown yet.
    pub fn attach_pending(&mut self, pending: Vec<Message>) {
        let mut changed = false;
        for m in pending {
            if !self.contains(&m.id) {
                self.messages.push(m);
                changed = true;
            }
        }
        if changed {
            self.persist();
        }
    }

    /// Swap the provisional entry for `temp_id` with its confirmed counterpart, keeping
    /// its position. A copy of the confirmed message that arrived earlier (the live echo
    /// can beat the send response) is removed. If the provisional entry is gone the
    /// confirmed message is ingested like a live update.
    pub fn confirm(&mut self, temp_id: &str, confirmed: Message) -> IngestOutcome {
        let Some(idx) = self
            .messages
            .iter()
            .position(|m| m.id.matches_temp_id(temp_id))
        else {
            return self.on_incoming(confirmed);
        };
        let confirmed_id = confirmed.id.clone();
        self.record_arrival(&confirmed_id);
        self.messages[idx] = confirmed;
        let mut i = 0;
        self.messages.retain(|m| {
            let keep = i == idx || m.id != confirmed_id;
            i += 1;
            keep
        });
        self.persist();
        IngestOutcome::Appended
    }

    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        let removed = self.messages.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Full-list replace with an authoritative fetch result.
    ///
    /// Confirmed messages that arrived while the request was in flight, or that are
    /// newer than anything in `fetched`, are kept after the fetched rows; `pending`
    /// provisional entries follow at the end.
    pub fn replace_all(&mut self, fetched: Vec<Message>, pending: Vec<Message>) {
        let arrived = self.arrived_during_fetch.take().unwrap_or_default();
        let newest_fetched = fetched.iter().filter_map(|m| m.id.confirmed()).max();
        let mut seen: HashSet<MessageId> = HashSet::new();
        let mut next: Vec<Message> = Vec::with_capacity(fetched.len() + pending.len());

        for m in fetched {
            if seen.insert(m.id.clone()) {
                next.push(m);
            }
        }
        for m in &self.messages {
            let Some(id) = m.id.confirmed() else {
                continue;
            };
            let newer = newest_fetched.is_some_and(|newest| id > newest);
            if (newer || arrived.contains(&m.id)) && seen.insert(m.id.clone()) {
                next.push(m.clone());
            }
        }
        for m in pending {
            if seen.insert(m.id.clone()) {
                next.push(m);
            }
        }

        self.messages = next;
        self.persist();
    }

    /// Reload from the cached snapshot and re-attach `pending`. Returns how many
    /// confirmed messages the cache held.
    pub fn restore_from_cache(&mut self, pending: Vec<Message>) -> usize {
        self.arrived_during_fetch = None;
        self.messages = confirmed_only(self.store.load());
        let cached = self.messages.len();
        self.attach_pending(pending);
        cached
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.messages) {
            tracing::warn!(%e, "failed to persist message snapshot");
        }
    }
}

fn confirmed_only(mut messages: Vec<Message>) -> Vec<Message> {
    messages.retain(|m| !m.id.is_provisional());
    // Older snapshots may hold duplicates; keep the first occurrence.
    let mut seen: HashSet<MessageId> = HashSet::new();
    messages.retain(|m| seen.insert(m.id.clone()));
    messages
}
