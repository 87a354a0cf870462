#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tern_core::{AppAction, AppReconciler, AppState, AppUpdate, ChatMessage, FfiApp, SyncPhase};

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, v: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("tern_config.json");
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn sign_in(app: &FfiApp, user_id: &str, user_name: &str) {
    app.dispatch(AppAction::SignIn {
        user_id: user_id.to_string(),
        user_name: user_name.to_string(),
        last_read_message_id: None,
    });
}

pub fn wait_ready(app: &FfiApp) {
    wait_until("sync ready", Duration::from_secs(5), || {
        let s = app.state();
        s.session.is_some() && s.phase == SyncPhase::Ready && !s.is_syncing
    });
}

pub fn ids(state: &AppState) -> Vec<String> {
    state.messages.iter().map(|m| m.id.clone()).collect()
}

pub fn texts(state: &AppState) -> Vec<String> {
    state.messages.iter().map(|m| m.text.clone()).collect()
}

pub fn find_by_text<'a>(state: &'a AppState, text: &str) -> Option<&'a ChatMessage> {
    state.messages.iter().find(|m| m.text == text)
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn updates(&self) -> Vec<AppUpdate> {
        self.0.lock().unwrap().clone()
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
            _ => None,
        })
    }

    /// The full state published right before the confirmation of `temp_id`.
    pub fn state_at_confirmation(&self, temp_id: &str) -> Option<AppState> {
        let updates = self.0.lock().unwrap();
        let idx = updates.iter().position(|u| {
            matches!(u, AppUpdate::MessageConfirmed { temp_id: t, .. } if t == temp_id)
        })?;
        updates[..idx].iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => Some(s.clone()),
            _ => None,
        })
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}
