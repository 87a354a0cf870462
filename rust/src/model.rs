//! Canonical message records and the loosely-typed wire shapes they are normalized from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::state::now_millis;

/// Prefix marking a locally generated, not yet confirmed message id.
pub const PROVISIONAL_ID_PREFIX: &str = "temp_";

/// Identity of a message in the visible list.
///
/// Persisted and displayed in string form: confirmed ids as the decimal server id,
/// provisional ids as `temp_...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MessageId {
    Provisional { temp_id: String },
    Confirmed { id: u64 },
}

impl MessageId {
    pub fn confirmed(&self) -> Option<u64> {
        match self {
            Self::Confirmed { id } => Some(*id),
            Self::Provisional { .. } => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional { .. })
    }

    pub fn matches_temp_id(&self, temp_id: &str) -> bool {
        matches!(self, Self::Provisional { temp_id: t } if t == temp_id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional { temp_id } => f.write_str(temp_id),
            Self::Confirmed { id } => write!(f, "{id}"),
        }
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with(PROVISIONAL_ID_PREFIX) {
            return Ok(Self::Provisional {
                temp_id: s.to_string(),
            });
        }
        s.parse::<u64>()
            .map(|id| Self::Confirmed { id })
            .map_err(|_| format!("invalid message id: {s:?}"))
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One chat message, whatever path it arrived by (fetch, live push, local compose).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// A locally composed message waiting for the server to accept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub temp_id: String,
    pub text: String,
    pub author_id: String,
    /// Unix milliseconds.
    pub queued_at: i64,
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Set once the retry cap is reached; automatic drains skip parked entries.
    #[serde(default)]
    pub parked: bool,
}

impl PendingMessage {
    pub fn provisional_message(&self, author_name: &str) -> Message {
        Message {
            id: MessageId::Provisional {
                temp_id: self.temp_id.clone(),
            },
            text: self.text.clone(),
            author_id: self.author_id.clone(),
            author_name: author_name.to_string(),
            created_at: self.queued_at,
        }
    }
}

/// Ids arrive as JSON numbers from the database driver and as strings from older caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Int(u64),
    Str(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

/// MySQL hands booleans back as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireBool {
    Bool(bool),
    Int(i64),
}

impl WireBool {
    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
        }
    }
}

/// Message row as the backend and the live channel emit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: WireId,
    #[serde(default, alias = "senderId")]
    pub user_id: Option<WireId>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "timestamp")]
    pub created_at: Option<WireTimestamp>,
    #[serde(default)]
    pub is_read: Option<WireBool>,
}

impl WireMessage {
    pub fn is_read(&self) -> Option<bool> {
        self.is_read.map(WireBool::as_bool)
    }

    pub fn author_id(&self) -> Option<String> {
        self.user_id.as_ref().map(ToString::to_string)
    }

    /// Normalize into the canonical record. Authoritative rows must carry a numeric id.
    pub fn normalize(self) -> Result<Message, SyncError> {
        let id = match &self.id {
            WireId::Int(v) => MessageId::Confirmed { id: *v },
            WireId::Str(s) => s
                .parse::<MessageId>()
                .map_err(SyncError::InvalidResponse)?,
        };
        if id.is_provisional() {
            return Err(SyncError::InvalidResponse(format!(
                "server row carries provisional id {id}"
            )));
        }
        let author_id = self
            .author_id()
            .ok_or_else(|| SyncError::InvalidResponse(format!("message {id} has no author")))?;
        let author_name = self
            .user_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("User {author_id}"));
        let created_at = self
            .created_at
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(now_millis);
        Ok(Message {
            id,
            text: self.text,
            author_id,
            author_name,
            created_at,
        })
    }
}

fn parse_timestamp(ts: &WireTimestamp) -> Option<i64> {
    match ts {
        WireTimestamp::Millis(ms) => Some(*ms),
        WireTimestamp::Text(s) => {
            let s = s.trim();
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(naive.and_utc().timestamp_millis());
            }
            s.parse::<i64>().ok()
        }
    }
}
