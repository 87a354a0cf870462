// Projection of the session's timeline, outbox and read cursor into `AppState`.

use std::collections::HashMap;

use super::*;

use crate::model::{Message, PendingMessage};
use crate::state::{ChatMessage, MessageDeliveryState};

fn delivery_state(message: &Message, pending: Option<&PendingMessage>) -> MessageDeliveryState {
    if !message.id.is_provisional() {
        return MessageDeliveryState::Sent;
    }
    match pending {
        Some(p) if p.parked => MessageDeliveryState::Failed {
            reason: p
                .last_error
                .clone()
                .unwrap_or_else(|| "Message not sent".to_string()),
        },
        _ => MessageDeliveryState::Pending,
    }
}

fn chat_message(
    message: &Message,
    my_id: &str,
    cursor: &ReadCursor,
    pending: Option<&PendingMessage>,
) -> ChatMessage {
    ChatMessage {
        id: message.id.to_string(),
        text: message.text.clone(),
        author_id: message.author_id.clone(),
        author_name: message.author_name.clone(),
        created_at: message.created_at,
        is_mine: message.author_id == my_id,
        is_read: cursor.is_read(message),
        is_provisional: message.id.is_provisional(),
        delivery: delivery_state(message, pending),
    }
}

impl AppCore {
    pub(super) fn refresh_view(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            self.state.messages.clear();
            self.state.pending_count = 0;
            self.state.last_read_message_id = None;
            self.state.unread_divider_id = None;
            self.state.is_syncing = false;
            return;
        };

        let pending: HashMap<&str, &PendingMessage> = sess
            .outbox
            .entries()
            .map(|p| (p.temp_id.as_str(), p))
            .collect();
        self.state.messages = sess
            .timeline
            .messages()
            .iter()
            .map(|m| {
                let entry = match &m.id {
                    crate::model::MessageId::Provisional { temp_id } => {
                        pending.get(temp_id.as_str()).copied()
                    }
                    crate::model::MessageId::Confirmed { .. } => None,
                };
                chat_message(m, &sess.user_id, &sess.cursor, entry)
            })
            .collect();
        self.state.pending_count = sess.outbox.len() as u32;
        self.state.last_read_message_id = sess.cursor.value().map(|id| id.to_string());
        self.state.unread_divider_id = sess
            .cursor
            .unread_divider(sess.timeline.messages())
            .map(ToString::to_string);
        self.state.is_syncing = sess.outbox.is_draining();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageId;

    fn provisional(temp_id: &str) -> Message {
        Message {
            id: MessageId::Provisional {
                temp_id: temp_id.into(),
            },
            text: "hi".into(),
            author_id: "me".into(),
            author_name: "Me".into(),
            created_at: 1,
        }
    }

    fn pending(temp_id: &str, parked: bool) -> PendingMessage {
        PendingMessage {
            temp_id: temp_id.into(),
            text: "hi".into(),
            author_id: "me".into(),
            queued_at: 1,
            retry_count: 3,
            last_error: Some("server rejected request (500): boom".into()),
            parked,
        }
    }

    #[test]
    fn provisional_messages_show_pending_until_parked() {
        let m = provisional("temp_a");
        assert_eq!(
            delivery_state(&m, Some(&pending("temp_a", false))),
            MessageDeliveryState::Pending
        );
        assert_eq!(
            delivery_state(&m, Some(&pending("temp_a", true))),
            MessageDeliveryState::Failed {
                reason: "server rejected request (500): boom".into()
            }
        );
    }

    #[test]
    fn projection_marks_own_and_unread_messages() {
        let mut cursor = ReadCursor::open(CacheStore::open_in_memory().unwrap(), "me");
        cursor.advance(3);
        let theirs = Message {
            id: MessageId::Confirmed { id: 4 },
            text: "yo".into(),
            author_id: "bob".into(),
            author_name: "Bob".into(),
            created_at: 2,
        };
        let view = chat_message(&theirs, "me", &cursor, None);
        assert!(!view.is_mine);
        assert!(!view.is_read);
        assert_eq!(view.delivery, MessageDeliveryState::Sent);

        let mine = chat_message(&provisional("temp_b"), "me", &cursor, None);
        assert!(mine.is_mine);
        assert!(mine.is_read);
        assert!(mine.is_provisional);
        assert_eq!(mine.id, "temp_b");
    }
}
