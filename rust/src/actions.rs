#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    SignIn {
        user_id: String,
        user_name: String,
        last_read_message_id: Option<String>,
    },
    SignOut,

    // Messages
    SendMessage {
        text: String,
    },
    RetryMessage {
        temp_id: String,
    },
    DiscardMessage {
        temp_id: String,
    },
    Refresh,

    // Read state
    MarkRead {
        message_id: String,
    },
    MarkLatestRead,

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::SignIn { .. } => "SignIn",
            AppAction::SignOut => "SignOut",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DiscardMessage { .. } => "DiscardMessage",
            AppAction::Refresh => "Refresh",

            // Read state
            AppAction::MarkRead { .. } => "MarkRead",
            AppAction::MarkLatestRead => "MarkLatestRead",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
