use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tern_core::{MessageApi, SyncError, WireMessage};

#[derive(Clone)]
struct Row {
    id: u64,
    user_id: String,
    user_name: String,
    text: String,
}

#[derive(Default)]
struct Script {
    rows: Vec<Row>,
    next_id: u64,
    reachable: bool,
    fetch_error: Option<SyncError>,
    send_error: Option<SyncError>,
    send_delay: Duration,
    fetch_delay: Duration,
    fetch_calls: usize,
    send_calls: usize,
    sent_texts: Vec<String>,
    mark_reads: Vec<(String, u64)>,
}

/// In-memory `MessageApi` whose answers the test scripts.
pub struct ScriptedApi {
    script: Mutex<Script>,
    sends_in_flight: AtomicUsize,
    max_sends_in_flight: AtomicUsize,
    fetches_in_flight: AtomicUsize,
    max_fetches_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                next_id: 1,
                reachable: true,
                ..Script::default()
            }),
            sends_in_flight: AtomicUsize::new(0),
            max_sends_in_flight: AtomicUsize::new(0),
            fetches_in_flight: AtomicUsize::new(0),
            max_fetches_in_flight: AtomicUsize::new(0),
        }
    }

    /// Store a message as if another client had posted it. Returns its id.
    pub fn seed(&self, user_id: &str, text: &str) -> u64 {
        let mut s = self.script.lock().unwrap();
        let id = s.next_id;
        s.next_id += 1;
        s.rows.push(Row {
            id,
            user_id: user_id.to_string(),
            user_name: format!("name-{user_id}"),
            text: text.to_string(),
        });
        id
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.script.lock().unwrap().reachable = reachable;
    }

    pub fn fail_fetch(&self, error: Option<SyncError>) {
        self.script.lock().unwrap().fetch_error = error;
    }

    pub fn fail_send(&self, error: Option<SyncError>) {
        self.script.lock().unwrap().send_error = error;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.script.lock().unwrap().send_delay = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.script.lock().unwrap().fetch_delay = delay;
    }

    pub fn fetch_calls(&self) -> usize {
        self.script.lock().unwrap().fetch_calls
    }

    /// Send attempts, including failed ones.
    pub fn send_calls(&self) -> usize {
        self.script.lock().unwrap().send_calls
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.script.lock().unwrap().sent_texts.clone()
    }

    pub fn mark_reads(&self) -> Vec<(String, u64)> {
        self.script.lock().unwrap().mark_reads.clone()
    }

    pub fn max_sends_in_flight(&self) -> usize {
        self.max_sends_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_fetches_in_flight(&self) -> usize {
        self.max_fetches_in_flight.load(Ordering::SeqCst)
    }

    /// Wire payload for a `message:new` event.
    pub fn live_payload(id: u64, user_id: &str, text: &str) -> String {
        json!({
            "id": id,
            "user_id": user_id,
            "user_name": format!("name-{user_id}"),
            "text": text,
            "created_at": "2026-01-01T00:00:00.000Z",
        })
        .to_string()
    }

    fn wire(row: &Row) -> WireMessage {
        serde_json::from_value(json!({
            "id": row.id,
            "user_id": row.user_id,
            "user_name": row.user_name,
            "text": row.text,
            "created_at": row.id as i64 * 1000,
        }))
        .unwrap()
    }

    fn unreachable() -> SyncError {
        SyncError::NetworkUnavailable("connection refused".into())
    }
}

#[async_trait]
impl MessageApi for ScriptedApi {
    async fn fetch_messages(&self, _user_id: &str) -> Result<Vec<WireMessage>, SyncError> {
        let in_flight = self.fetches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetches_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = {
            let mut s = self.script.lock().unwrap();
            s.fetch_calls += 1;
            s.fetch_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let s = self.script.lock().unwrap();
            if !s.reachable {
                Err(Self::unreachable())
            } else if let Some(e) = s.fetch_error.clone() {
                Err(e)
            } else {
                let start = s.rows.len().saturating_sub(50);
                Ok(s.rows[start..].iter().map(Self::wire).collect())
            }
        };
        self.fetches_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn send_message(&self, user_id: &str, text: &str) -> Result<WireMessage, SyncError> {
        let in_flight = self.sends_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_sends_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = {
            let mut s = self.script.lock().unwrap();
            s.send_calls += 1;
            s.send_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut s = self.script.lock().unwrap();
            if !s.reachable {
                Err(Self::unreachable())
            } else if let Some(e) = s.send_error.clone() {
                Err(e)
            } else {
                let id = s.next_id;
                s.next_id += 1;
                let row = Row {
                    id,
                    user_id: user_id.to_string(),
                    user_name: format!("name-{user_id}"),
                    text: text.to_string(),
                };
                s.rows.push(row.clone());
                s.sent_texts.push(text.to_string());
                Ok(Self::wire(&row))
            }
        };
        self.sends_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn mark_read(&self, user_id: &str, message_id: u64) -> Result<(), SyncError> {
        let mut s = self.script.lock().unwrap();
        if !s.reachable {
            return Err(Self::unreachable());
        }
        s.mark_reads.push((user_id.to_string(), message_id));
        Ok(())
    }
}
