pub mod api;
pub mod cache_store;
mod config;
pub mod outbox;
pub mod read_cursor;
mod sync;
pub mod timeline;
mod view;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::network::NetworkMonitor;
use crate::state::AppState;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use api::MessageApi;
use cache_store::CacheStore;
use outbox::Outbox;
use read_cursor::ReadCursor;
use timeline::Timeline;

pub use config::{load_app_config, AppConfig};

/// Everything the actor needs that has to exist before it starts.
pub struct CoreServices {
    pub config: AppConfig,
    pub runtime: tokio::runtime::Runtime,
    pub monitor: NetworkMonitor,
    pub api: Arc<dyn MessageApi>,
    pub store: CacheStore,
}

struct Session {
    user_id: String,
    user_name: String,
    alive: Arc<AtomicBool>,
    timeline: Timeline,
    outbox: Outbox,
    cursor: ReadCursor,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    data_dir: String,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    monitor: NetworkMonitor,
    api: Arc<dyn MessageApi>,
    store: CacheStore,

    session: Option<Session>,

    fetch_in_flight: bool,
    fetch_dirty: bool,
    fetch_token: u64,

    drain_dirty: bool,
    drain_token: u64,
    // Set when a drain was started by a reconnect or a sync trigger; the pass ends
    // with a fresh fetch.
    refetch_after_drain: bool,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        services: CoreServices,
    ) -> Self {
        let CoreServices {
            config,
            runtime,
            monitor,
            api,
            store,
        } = services;

        let mut this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            config,
            runtime,
            monitor,
            api,
            store,
            session: None,
            fetch_in_flight: false,
            fetch_dirty: false,
            fetch_token: 0,
            drain_dirty: false,
            drain_token: 0,
            refetch_after_drain: false,
        };
        this.state.is_online = this.is_online();
        this.state.last_synced_at = this.store.load_last_sync();
        tracing::info!(data_dir = %this.data_dir, online = this.state.is_online, "app core ready");

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_message_confirmed(&mut self, temp_id: String, message_id: String) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::MessageConfirmed {
            rev,
            temp_id,
            message_id,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ConnectivityChanged { online } => {
                self.on_connectivity_changed(online);
            }
            InternalEvent::LiveMessageReceived { message } => {
                self.on_live_message(message);
            }
            InternalEvent::FetchCompleted { token, result } => {
                // Ignore stale results (e.g., sign-out during a fetch).
                if token != self.fetch_token {
                    return;
                }
                self.on_fetch_completed(result);
            }
            InternalEvent::SendCompleted {
                token,
                temp_id,
                result,
            } => {
                if token != self.drain_token {
                    return;
                }
                self.on_send_completed(temp_id, result);
            }
            InternalEvent::DrainFinished { token } => {
                if token != self.drain_token {
                    return;
                }
                self.on_drain_finished();
            }
            InternalEvent::MarkReadCompleted { message_id, result } => match result {
                Ok(()) => tracing::debug!(message_id, "mark-read acknowledged"),
                // The local cursor already moved; the server catches up on the next mark.
                Err(e) => tracing::warn!(%e, message_id, "mark-read failed"),
            },
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::SignIn {
                user_id,
                user_name,
                last_read_message_id,
            } => {
                let user_id = user_id.trim().to_string();
                if user_id.is_empty() {
                    self.toast("Missing user id");
                    return;
                }
                self.start_session(user_id, user_name, last_read_message_id);
            }
            AppAction::SignOut => {
                self.stop_session();
                if let Err(e) = self.store.clear() {
                    tracing::warn!(%e, "failed to clear cache on sign-out");
                }
                self.state = AppState::empty();
                self.state.is_online = self.is_online();
                self.emit_state();
            }
            AppAction::SendMessage { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                self.send_message(text.to_string());
            }
            AppAction::RetryMessage { temp_id } => {
                let Some(sess) = self.session.as_mut() else {
                    return;
                };
                if !sess.outbox.retry(&temp_id) {
                    tracing::debug!(temp_id, "retry for unknown outbox entry");
                    return;
                }
                self.refresh_view();
                self.emit_state();
                self.start_drain();
            }
            AppAction::DiscardMessage { temp_id } => {
                let Some(sess) = self.session.as_mut() else {
                    return;
                };
                if sess.outbox.discard(&temp_id).is_none() {
                    return;
                }
                sess.timeline
                    .remove(&crate::model::MessageId::Provisional { temp_id });
                self.refresh_view();
                self.emit_state();
            }
            AppAction::Refresh | AppAction::Foregrounded => {
                self.start_sync();
            }
            AppAction::MarkRead { message_id } => {
                match message_id.parse::<crate::model::MessageId>() {
                    Ok(id) => match id.confirmed() {
                        Some(id) => self.mark_read(id),
                        None => tracing::debug!("ignoring mark-read for provisional message"),
                    },
                    Err(e) => tracing::warn!(%e, "ignoring mark-read with malformed id"),
                }
            }
            AppAction::MarkLatestRead => {
                let newest = self
                    .session
                    .as_ref()
                    .and_then(|s| s.timeline.newest_confirmed());
                if let Some(id) = newest {
                    self.mark_read(id);
                }
            }
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn start_session(
        &mut self,
        user_id: String,
        user_name: String,
        last_read_message_id: Option<String>,
    ) {
        // Tear down any existing session first.
        self.stop_session();

        let user_name = match user_name.trim() {
            "" => format!("User {user_id}"),
            name => name.to_string(),
        };
        tracing::info!(user_id = %user_id, "start_session");

        let timeline = Timeline::open(self.store.clone());
        let outbox = Outbox::open(self.store.clone(), self.config.max_send_attempts);
        let mut cursor = ReadCursor::open(self.store.clone(), &user_id);
        // The login response carries the server-side cursor; it can only move ours forward.
        if let Some(id) = last_read_message_id.and_then(|s| s.trim().parse::<u64>().ok()) {
            cursor.advance(id);
        }

        let mut sess = Session {
            user_id: user_id.clone(),
            user_name: user_name.clone(),
            alive: Arc::new(AtomicBool::new(true)),
            timeline,
            outbox,
            cursor,
        };
        let pending = sess.outbox.provisional_messages(&sess.user_name);
        sess.timeline.attach_pending(pending);
        self.session = Some(sess);

        self.state.session = Some(crate::state::SessionInfo { user_id, user_name });
        self.state.phase = crate::state::SyncPhase::Idle;
        self.state.error = None;
        self.state.last_synced_at = self.store.load_last_sync();
        self.refresh_view();
        self.emit_state();

        self.start_sync();
    }

    fn stop_session(&mut self) {
        // Invalidate any in-flight fetch/drain results.
        self.fetch_token = self.fetch_token.wrapping_add(1);
        self.fetch_in_flight = false;
        self.fetch_dirty = false;
        self.drain_token = self.drain_token.wrapping_add(1);
        self.drain_dirty = false;
        self.refetch_after_drain = false;

        if let Some(sess) = self.session.take() {
            sess.alive.store(false, Ordering::SeqCst);
            tracing::info!(user_id = %sess.user_id, "stop_session");
        }
    }
}
