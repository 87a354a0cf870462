#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub session: Option<SessionInfo>,
    pub phase: SyncPhase,
    /// Effective connectivity (network monitor state, unless networking is disabled).
    pub is_online: bool,
    /// Outbox flush in progress.
    pub is_syncing: bool,
    /// Messages come from the on-device cache rather than a fresh fetch.
    pub is_stale: bool,
    pub messages: Vec<ChatMessage>,
    pub pending_count: u32,
    pub last_read_message_id: Option<String>,
    /// Id of the first unread message from someone else, where the "new messages"
    /// divider goes.
    pub unread_divider_id: Option<String>,
    /// Unix milliseconds of the last successful fetch.
    pub last_synced_at: Option<i64>,
    pub error: Option<String>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            session: None,
            phase: SyncPhase::Idle,
            is_online: true,
            is_syncing: false,
            is_stale: false,
            messages: vec![],
            pending_count: 0,
            last_read_message_id: None,
            unread_divider_id: None,
            last_synced_at: None,
            error: None,
            toast: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    pub user_name: String,
}

/// Sync coordinator phase.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    /// Outbox flush in progress.
    Syncing,
    Ready,
    /// Fetch failed and there was nothing cached to fall back to.
    Error,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: i64,
    pub is_mine: bool,
    pub is_read: bool,
    pub is_provisional: bool,
    pub delivery: MessageDeliveryState,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
