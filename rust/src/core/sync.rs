// Sync coordinator: fetch, outbox drain, live ingest and read marks.

use super::*;

use crate::error::SyncError;
use crate::model::{Message, WireMessage};
use crate::state::{now_millis, SyncPhase};

use super::api::with_timeout;
use super::timeline::IngestOutcome;

/// How a fetch resolved once the cache fallback has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FetchOutcome {
    Fresh { count: usize },
    FromCache { count: usize, error: SyncError },
    Failed(SyncError),
}

/// Highest id, among messages from other users, that the server reports as read.
fn server_read_cursor(rows: &[WireMessage], my_id: &str) -> Option<u64> {
    rows.iter()
        .filter(|r| r.is_read() == Some(true))
        .filter(|r| r.author_id().as_deref() != Some(my_id))
        .filter_map(|r| r.id.to_string().parse::<u64>().ok())
        .max()
}

fn normalize_rows(rows: Vec<WireMessage>) -> Vec<Message> {
    rows.into_iter()
        .filter_map(|row| match row.normalize() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(%e, "skipping malformed message row");
                None
            }
        })
        .collect()
}

impl AppCore {
    /// Entry point for sign-in, manual refresh and foreground: flush the outbox if it
    /// holds anything, then fetch.
    pub(super) fn start_sync(&mut self) {
        let has_pending = match self.session.as_ref() {
            Some(sess) => sess.outbox.has_eligible(),
            None => return,
        };
        if !self.is_online() {
            self.serve_cache_offline();
            return;
        }
        if has_pending {
            self.refetch_after_drain = true;
            self.start_drain();
        } else {
            self.request_fetch();
        }
    }

    fn serve_cache_offline(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let pending = sess.outbox.provisional_messages(&sess.user_name);
        let cached = sess.timeline.restore_from_cache(pending);
        tracing::info!(cached, "offline; serving cached messages");
        self.state.is_online = false;
        self.state.is_stale = true;
        self.settle_phase(SyncPhase::Ready);
        self.refresh_view();
        self.emit_state();
    }

    pub(super) fn request_fetch(&mut self) {
        if self.session.is_none() {
            return;
        }
        if !self.is_online() {
            self.serve_cache_offline();
            return;
        }
        if self.fetch_in_flight {
            self.fetch_dirty = true;
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.timeline.begin_fetch();

        self.fetch_in_flight = true;
        self.fetch_dirty = false;
        self.fetch_token = self.fetch_token.wrapping_add(1);
        let token = self.fetch_token;

        let api = self.api.clone();
        let tx = self.core_sender.clone();
        let alive = sess.alive.clone();
        let user_id = sess.user_id.clone();
        let limit = self.config.request_timeout();

        self.settle_phase(SyncPhase::Fetching);
        self.emit_state();

        self.runtime.spawn(async move {
            let result = with_timeout(limit, api.fetch_messages(&user_id)).await;
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::FetchCompleted {
                token,
                result,
            })));
        });
    }

    pub(super) fn on_fetch_completed(&mut self, result: Result<Vec<WireMessage>, SyncError>) {
        self.fetch_in_flight = false;
        let Some(outcome) = self.apply_fetch_result(result) else {
            return;
        };

        let resting = match &outcome {
            FetchOutcome::Fresh { count } => {
                tracing::info!(count, "fetch completed");
                self.state.is_stale = false;
                self.state.error = None;
                SyncPhase::Ready
            }
            FetchOutcome::FromCache { count, error } => {
                tracing::info!(count, %error, "fetch failed; serving cached messages");
                self.state.is_stale = true;
                self.state.error = None;
                SyncPhase::Ready
            }
            FetchOutcome::Failed(e) => {
                tracing::warn!(%e, "fetch failed with nothing cached");
                self.state.is_stale = true;
                self.state.error = Some(e.user_visible_message());
                SyncPhase::Error
            }
        };
        self.settle_phase(resting);
        self.refresh_view();
        self.emit_state();

        // An unreachable server is already reflected by the stale flag.
        if let FetchOutcome::FromCache {
            error: error @ SyncError::ServerRejected { .. },
            ..
        } = &outcome
        {
            self.toast(error.user_visible_message());
        }

        if self.fetch_dirty {
            self.fetch_dirty = false;
            self.request_fetch();
        }
    }

    fn apply_fetch_result(
        &mut self,
        result: Result<Vec<WireMessage>, SyncError>,
    ) -> Option<FetchOutcome> {
        let sess = self.session.as_mut()?;
        let pending = sess.outbox.provisional_messages(&sess.user_name);
        match result {
            Ok(rows) => {
                let server_cursor = server_read_cursor(&rows, &sess.user_id);
                let fetched = normalize_rows(rows);
                let count = fetched.len();
                sess.timeline.replace_all(fetched, pending);
                if let Some(id) = server_cursor {
                    sess.cursor.advance(id);
                }
                let now = now_millis();
                if let Err(e) = self.store.save_last_sync(now) {
                    tracing::warn!(%e, "failed to persist last sync timestamp");
                }
                self.state.last_synced_at = Some(now);
                Some(FetchOutcome::Fresh { count })
            }
            Err(e) => {
                let count = sess.timeline.restore_from_cache(pending);
                if count == 0 {
                    return Some(FetchOutcome::Failed(e));
                }
                Some(FetchOutcome::FromCache { count, error: e })
            }
        }
    }

    pub(super) fn send_message(&mut self, text: String) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let pending = sess.outbox.enqueue(&text, &sess.user_id);
        sess.timeline
            .attach_pending(vec![pending.provisional_message(&sess.user_name)]);
        self.refresh_view();
        self.emit_state();
        self.start_drain();
    }

    /// Deliver every eligible outbox entry, oldest first. Coalesces with a pass already
    /// in flight.
    pub(super) fn start_drain(&mut self) {
        if !self.is_online() {
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let Some(batch) = sess.outbox.begin_drain() else {
            self.drain_dirty = true;
            return;
        };
        if batch.is_empty() {
            sess.outbox.finish_drain();
            if std::mem::take(&mut self.refetch_after_drain) {
                self.request_fetch();
            }
            return;
        }

        self.drain_dirty = false;
        self.drain_token = self.drain_token.wrapping_add(1);
        let token = self.drain_token;
        tracing::info!(count = batch.len(), "outbox drain");

        let api = self.api.clone();
        let tx = self.core_sender.clone();
        let alive = sess.alive.clone();
        let limit = self.config.request_timeout();

        // Publish the syncing state before any result can race it.
        self.settle_phase(SyncPhase::Ready);
        self.emit_state();

        self.runtime.spawn(async move {
            for entry in batch {
                let result =
                    with_timeout(limit, api.send_message(&entry.author_id, &entry.text)).await;
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                // Once the server is unreachable the rest of the queue would fail the same way.
                let unreachable = matches!(&result, Err(e) if e.is_network_unavailable());
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                    token,
                    temp_id: entry.temp_id,
                    result,
                })));
                if unreachable {
                    break;
                }
            }
            if alive.load(Ordering::SeqCst) {
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::DrainFinished {
                    token,
                })));
            }
        });
    }

    pub(super) fn on_send_completed(
        &mut self,
        temp_id: String,
        result: Result<WireMessage, SyncError>,
    ) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        match result.and_then(WireMessage::normalize) {
            Ok(confirmed) => {
                let confirmed_id = confirmed.id.clone();
                sess.outbox.confirm(&temp_id);
                sess.timeline.confirm(&temp_id, confirmed);
                tracing::info!(temp_id, message_id = %confirmed_id, "message confirmed");
                self.refresh_view();
                self.emit_state();
                self.emit_message_confirmed(temp_id, confirmed_id.to_string());
                if let Some(id) = confirmed_id.confirmed() {
                    self.mark_read(id);
                }
            }
            Err(SyncError::InvalidResponse(reason)) => {
                // Accepted by the server but unreadable: drop the local copy and let the
                // refetch show the stored row.
                tracing::warn!(temp_id, reason, "send response unreadable");
                sess.outbox.confirm(&temp_id);
                sess.timeline
                    .remove(&crate::model::MessageId::Provisional { temp_id });
                self.refetch_after_drain = true;
                self.refresh_view();
                self.emit_state();
            }
            Err(e) => {
                sess.outbox.record_failure(&temp_id, &e);
                self.refresh_view();
                if let SyncError::ServerRejected { .. } = e {
                    self.toast(e.user_visible_message());
                } else {
                    self.emit_state();
                }
            }
        }
    }

    pub(super) fn on_drain_finished(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.outbox.finish_drain();
        let run_again = std::mem::take(&mut self.drain_dirty) && sess.outbox.has_eligible();

        self.settle_phase(SyncPhase::Ready);
        self.refresh_view();
        self.emit_state();

        if run_again && self.is_online() {
            self.start_drain();
            return;
        }
        if std::mem::take(&mut self.refetch_after_drain) {
            self.request_fetch();
        }
    }

    pub(super) fn on_connectivity_changed(&mut self, reported: bool) {
        // Re-read rather than trust the event; the monitor may have flipped again since.
        let online = self.is_online();
        tracing::info!(reported, online, "connectivity event");
        if online == self.state.is_online {
            return;
        }
        self.state.is_online = online;
        if !online {
            self.state.is_stale = true;
            self.emit_state();
            return;
        }
        self.emit_state();
        self.start_sync();
    }

    pub(super) fn on_live_message(&mut self, message: WireMessage) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let message = match message.normalize() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%e, "dropping malformed live message");
                return;
            }
        };
        let id = message.id.clone();
        match sess.timeline.on_incoming(message) {
            IngestOutcome::Appended => {
                tracing::debug!(message_id = %id, "live message appended");
                self.refresh_view();
                self.emit_state();
            }
            IngestOutcome::DuplicateSuppressed => {
                tracing::debug!(message_id = %id, "live message duplicate suppressed");
            }
        }
    }

    /// Advance the read cursor and tell the server. Dropped while offline.
    pub(super) fn mark_read(&mut self, message_id: u64) {
        let online = self.is_online();
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if !sess.cursor.would_advance(message_id) {
            return;
        }
        if !online {
            tracing::debug!(message_id, "mark-read dropped while offline");
            return;
        }
        sess.cursor.advance(message_id);

        let api = self.api.clone();
        let tx = self.core_sender.clone();
        let alive = sess.alive.clone();
        let user_id = sess.user_id.clone();
        let limit = self.config.request_timeout();
        self.runtime.spawn(async move {
            let result = with_timeout(limit, api.mark_read(&user_id, message_id)).await;
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::MarkReadCompleted { message_id, result },
            )));
        });

        self.refresh_view();
        self.emit_state();
    }

    /// Derive the phase from what is in flight, falling back to `resting`.
    fn settle_phase(&mut self, resting: SyncPhase) {
        let draining = self
            .session
            .as_ref()
            .is_some_and(|s| s.outbox.is_draining());
        self.state.is_syncing = draining;
        self.state.phase = if draining {
            SyncPhase::Syncing
        } else if self.fetch_in_flight {
            SyncPhase::Fetching
        } else {
            resting
        };
    }
}
