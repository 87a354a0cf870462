use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Spawn a one-shot HTTP mock server that accepts a single request, captures it,
/// and responds with the given status line and body. Returns the base URL and a
/// receiver that yields the captured request.
pub fn spawn_one_shot_server(
    status_line: &str,
    response_body: &str,
) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().expect("read mock server addr");
    let (tx, rx) = mpsc::channel();
    let status_line = status_line.to_string();
    let response_body = response_body.to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept mock request");
        let req = read_http_request(&mut stream);
        tx.send(req).expect("send captured request");
        write_response(&mut stream, &status_line, &response_body);
    });

    (format!("http://{addr}"), rx)
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    user_id: String,
    user_name: String,
    text: String,
    created_at: String,
}

#[derive(Debug, Default)]
struct BackendState {
    messages: Vec<StoredMessage>,
    next_id: u64,
    user_names: HashMap<String, String>,
    cursors: HashMap<String, u64>,
    failure: Option<(u16, String)>,
    broadcasts: Vec<Value>,
    requests: Vec<CapturedRequest>,
}

/// In-process stand-in for the chat backend's message routes:
/// `GET /api/messages`, `POST /api/messages` and `POST /api/messages/mark-read`.
///
/// Rows created through `POST /api/messages` are recorded as broadcasts so tests can
/// replay them into a client's live channel.
pub struct MockBackend {
    pub base_url: String,
    state: Arc<Mutex<BackendState>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockBackend {
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
        listener
            .set_nonblocking(true)
            .expect("set mock backend nonblocking");
        let addr = listener.local_addr().expect("read mock backend addr");
        let state = Arc::new(Mutex::new(BackendState {
            next_id: 1,
            ..BackendState::default()
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let state_for_thread = state.clone();
        let shutdown_for_thread = shutdown.clone();
        let thread = thread::spawn(move || {
            while !shutdown_for_thread.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        let req = read_http_request(&mut stream);
                        let (status_line, body) = route(&state_for_thread, req);
                        write_response(&mut stream, &status_line, &body);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn register_user(&self, user_id: &str, user_name: &str) {
        let mut st = self.state.lock().unwrap();
        st.user_names
            .insert(user_id.to_string(), user_name.to_string());
    }

    /// Insert a message directly, as if another client had posted it. Returns its id.
    pub fn seed_message(&self, user_id: &str, text: &str) -> u64 {
        let mut st = self.state.lock().unwrap();
        insert_message(&mut st, user_id, text).id
    }

    /// Make every subsequent request answer with `status` and an error body until cleared.
    pub fn fail_with(&self, status: u16, message: &str) {
        self.state.lock().unwrap().failure = Some((status, message.to_string()));
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().failure = None;
    }

    /// Set a user's server-side read cursor, as a previous session would have.
    pub fn set_cursor(&self, user_id: &str, message_id: u64) {
        self.state
            .lock()
            .unwrap()
            .cursors
            .insert(user_id.to_string(), message_id);
    }

    pub fn cursor_for(&self, user_id: &str) -> Option<u64> {
        self.state.lock().unwrap().cursors.get(user_id).copied()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    /// `message:new` payloads emitted so far, in order.
    pub fn broadcasts(&self) -> Vec<Value> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn insert_message(st: &mut BackendState, user_id: &str, text: &str) -> StoredMessage {
    let id = st.next_id;
    st.next_id += 1;
    let user_name = st
        .user_names
        .get(user_id)
        .cloned()
        .unwrap_or_else(|| format!("User {user_id}"));
    let msg = StoredMessage {
        id,
        user_id: user_id.to_string(),
        user_name,
        text: text.to_string(),
        created_at: format!(
            "2026-01-01T{:02}:{:02}:{:02}.000Z",
            (id / 3600) % 24,
            (id / 60) % 60,
            id % 60
        ),
    };
    st.messages.push(msg.clone());
    msg
}

fn row_json(m: &StoredMessage, is_read: Option<bool>) -> Value {
    let mut v = json!({
        "id": m.id,
        "user_id": m.user_id,
        "user_name": m.user_name,
        "text": m.text,
        "created_at": m.created_at,
    });
    if let Some(is_read) = is_read {
        v["is_read"] = Value::Bool(is_read);
    }
    v
}

fn error_body(error: &str, message: &str) -> String {
    json!({ "error": error, "message": message }).to_string()
}

fn query_param(path: &str, key: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

fn route(state: &Mutex<BackendState>, req: CapturedRequest) -> (String, String) {
    let mut st = state.lock().unwrap();
    st.requests.push(req.clone());

    if let Some((status, message)) = st.failure.clone() {
        return (
            format!("{status} Error"),
            error_body("Request failed", &message),
        );
    }

    let route_path = req.path.split('?').next().unwrap_or_default();
    match (req.method.as_str(), route_path) {
        ("GET", "/api/messages") => {
            let user_id = query_param(&req.path, "user_id");
            let cursor = user_id.as_ref().and_then(|u| st.cursors.get(u).copied());
            let start = st.messages.len().saturating_sub(50);
            let rows: Vec<Value> = st.messages[start..]
                .iter()
                .map(|m| {
                    let is_read = user_id.as_ref().map(|u| {
                        &m.user_id == u || cursor.map(|c| m.id <= c).unwrap_or(true)
                    });
                    row_json(m, is_read)
                })
                .collect();
            ("200 OK".into(), Value::Array(rows).to_string())
        }
        ("POST", "/api/messages") => {
            let body: Value = serde_json::from_str(&req.body).unwrap_or(Value::Null);
            let user_id = body.get("user_id").and_then(Value::as_str);
            let text = body.get("text").and_then(Value::as_str);
            let (Some(user_id), Some(text)) = (user_id, text) else {
                return (
                    "400 Bad Request".into(),
                    json!({ "error": "user_id and text are required" }).to_string(),
                );
            };
            let user_id = user_id.to_string();
            let text = text.to_string();
            let msg = insert_message(&mut st, &user_id, &text);
            let row = row_json(&msg, None);
            st.broadcasts.push(row.clone());
            ("201 Created".into(), row.to_string())
        }
        ("POST", "/api/messages/mark-read") => {
            let body: Value = serde_json::from_str(&req.body).unwrap_or(Value::Null);
            let user_id = body.get("user_id").and_then(Value::as_str);
            let message_id = body.get("message_id").and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse::<u64>().ok(),
                _ => None,
            });
            let (Some(user_id), Some(message_id)) = (user_id, message_id) else {
                return (
                    "400 Bad Request".into(),
                    json!({ "error": "user_id and message_id are required" }).to_string(),
                );
            };
            st.cursors.insert(user_id.to_string(), message_id);
            (
                "200 OK".into(),
                json!({ "success": true, "message": "Messages marked as read" }).to_string(),
            )
        }
        _ => (
            "404 Not Found".into(),
            error_body("Not found", route_path),
        ),
    }
}

fn write_response(stream: &mut TcpStream, status_line: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn read_http_request(stream: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut header_end = None;
    let mut content_length = 0usize;

    loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if header_end.is_none() {
            header_end = buf
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
                .map(|idx| idx + 4);
            if let Some(end) = header_end {
                let headers = String::from_utf8_lossy(&buf[..end]);
                for line in headers.lines() {
                    if let Some((key, value)) = line.split_once(':') {
                        if key.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse::<usize>().unwrap_or(0);
                        }
                    }
                }
            }
        }
        if let Some(end) = header_end {
            if buf.len() >= end + content_length {
                break;
            }
        }
    }

    let end = header_end.unwrap_or(buf.len());
    let headers_raw = String::from_utf8_lossy(&buf[..end]);
    let mut lines = headers_raw.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let body_end = (end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[end..body_end]).into_owned();

    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}
