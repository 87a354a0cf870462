use crate::error::SyncError;
use crate::model::WireMessage;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// A provisional message was swapped for its server-assigned id.
    MessageConfirmed {
        rev: u64,
        temp_id: String,
        message_id: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::MessageConfirmed { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Platform signals
    ConnectivityChanged {
        online: bool,
    },
    LiveMessageReceived {
        message: WireMessage,
    },

    // Async results. `token` ties a result to the request that produced it; results
    // for superseded requests are dropped.
    FetchCompleted {
        token: u64,
        result: Result<Vec<WireMessage>, SyncError>,
    },
    SendCompleted {
        token: u64,
        temp_id: String,
        result: Result<WireMessage, SyncError>,
    },
    DrainFinished {
        token: u64,
    },
    MarkReadCompleted {
        message_id: u64,
        result: Result<(), SyncError>,
    },
}
