mod actions;
mod core;
mod error;
mod logging;
mod model;
mod network;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use crate::core::api::{HttpMessageApi, MessageApi};
pub use crate::core::cache_store::CacheStore;
pub use crate::core::outbox::Outbox;
pub use crate::core::read_cursor::ReadCursor;
pub use crate::core::timeline::{IngestOutcome, Timeline};
pub use crate::core::{load_app_config, AppConfig};
pub use error::{InitError, StorageError, SyncError};
pub use model::{
    Message, MessageId, PendingMessage, WireBool, WireId, WireMessage, WireTimestamp,
    PROVISIONAL_ID_PREFIX,
};
pub use network::{ConnectivityProbe, NetworkMonitor, Subscription};
pub use state::*;
pub use updates::*;

/// Live channel event carrying a newly stored message.
pub const LIVE_EVENT_NEW_MESSAGE: &str = "message:new";

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    monitor: NetworkMonitor,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Result<Arc<Self>, InitError> {
        Self::start(data_dir, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Forwarded from the platform's reachability listener.
    pub fn set_network_reachable(&self, online: bool) {
        self.monitor.report(online);
    }

    pub fn set_connectivity_probe(&self, probe: Box<dyn ConnectivityProbe>) {
        self.monitor.set_probe(Arc::from(probe));
    }

    /// Forwarded from the real-time channel. Only `message:new` is consumed.
    pub fn push_live_event(&self, event: String, payload_json: String) {
        if event != LIVE_EVENT_NEW_MESSAGE {
            tracing::debug!(event, "ignoring live event");
            return;
        }
        let message = match serde_json::from_str::<WireMessage>(&payload_json) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%e, "dropping undecodable live event");
                return;
            }
        };
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::LiveMessageReceived { message },
        )));
    }

    /// Stop listening for connectivity changes. Dispatch keeps working.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }
}

impl FfiApp {
    /// Start against a caller-provided message source instead of the HTTP backend.
    pub fn with_message_api(
        data_dir: String,
        api: Arc<dyn MessageApi>,
    ) -> Result<Arc<Self>, InitError> {
        Self::start(data_dir, Some(api))
    }

    pub fn network_monitor(&self) -> NetworkMonitor {
        self.monitor.clone()
    }

    fn start(data_dir: String, api: Option<Arc<dyn MessageApi>>) -> Result<Arc<Self>, InitError> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let config = crate::core::load_app_config(&data_dir);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .map_err(|e| InitError::RuntimeUnavailable {
                reason: e.to_string(),
            })?;
        let store =
            CacheStore::open(&data_dir).map_err(|e| InitError::StorageUnavailable {
                reason: e.to_string(),
            })?;
        let api: Arc<dyn MessageApi> = match api {
            Some(api) => api,
            None => Arc::new(
                HttpMessageApi::new(&config.api_base_url(), config.request_timeout()).map_err(
                    |e| InitError::HttpClientUnavailable {
                        reason: format!("{e:#}"),
                    },
                )?,
            ),
        };

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let monitor = NetworkMonitor::new();

        // Flips reach the actor through the same queue as actions, so they apply in order.
        let core_tx_for_monitor = core_tx.clone();
        monitor.subscribe(move |online| {
            let _ = core_tx_for_monitor.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConnectivityChanged { online },
            )));
        });

        let services = crate::core::CoreServices {
            config,
            runtime,
            monitor: monitor.clone(),
            api,
            store,
        };

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                services,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            monitor,
        }))
    }
}
