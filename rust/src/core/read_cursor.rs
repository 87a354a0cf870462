//! Per-user "last read message" watermark. Only ever moves forward.

use crate::model::{Message, MessageId};

use super::cache_store::CacheStore;

pub struct ReadCursor {
    user_id: String,
    value: Option<u64>,
    store: CacheStore,
}

impl ReadCursor {
    pub fn open(store: CacheStore, user_id: &str) -> Self {
        let value = store.load_read_cursor(user_id);
        Self {
            user_id: user_id.to_string(),
            value,
            store,
        }
    }

    pub fn value(&self) -> Option<u64> {
        self.value
    }

    pub fn would_advance(&self, message_id: u64) -> bool {
        self.value.map_or(true, |current| message_id > current)
    }

    /// Move the cursor to `message_id` if that is forward. Returns whether it moved.
    pub fn advance(&mut self, message_id: u64) -> bool {
        if !self.would_advance(message_id) {
            return false;
        }
        self.value = Some(message_id);
        if let Err(e) = self.store.save_read_cursor(&self.user_id, message_id) {
            tracing::warn!(%e, message_id, "failed to persist read cursor");
        }
        true
    }

    /// Own messages are always read; with no cursor yet everything counts as read.
    pub fn is_read(&self, message: &Message) -> bool {
        if message.author_id == self.user_id {
            return true;
        }
        match (message.id.confirmed(), self.value) {
            (Some(id), Some(cursor)) => id <= cursor,
            (None, _) => true,
            (_, None) => true,
        }
    }

    /// Earliest message from someone else past the cursor. Server ids are assigned in
    /// creation order, so the smallest qualifying id wins regardless of arrival order.
    /// No cursor, no divider.
    pub fn unread_divider<'a>(&self, messages: &'a [Message]) -> Option<&'a MessageId> {
        let cursor = self.value?;
        messages
            .iter()
            .filter(|m| m.author_id != self.user_id)
            .filter_map(|m| m.id.confirmed().filter(|id| *id > cursor).map(|id| (id, &m.id)))
            .min_by_key(|(id, _)| *id)
            .map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, author: &str) -> Message {
        Message {
            id: MessageId::Confirmed { id },
            text: String::new(),
            author_id: author.into(),
            author_name: author.into(),
            created_at: 0,
        }
    }

    fn cursor() -> ReadCursor {
        ReadCursor::open(CacheStore::open_in_memory().unwrap(), "u1")
    }

    #[test]
    fn never_moves_backwards() {
        let mut c = cursor();
        assert!(c.advance(5));
        assert!(!c.advance(3));
        assert!(!c.advance(5));
        assert_eq!(c.value(), Some(5));
    }

    #[test]
    fn persists_per_user() {
        let store = CacheStore::open_in_memory().unwrap();
        let mut c = ReadCursor::open(store.clone(), "u1");
        c.advance(12);
        assert_eq!(ReadCursor::open(store.clone(), "u1").value(), Some(12));
        assert_eq!(ReadCursor::open(store, "u2").value(), None);
    }

    #[test]
    fn read_flags_follow_cursor() {
        let mut c = cursor();
        assert!(c.is_read(&msg(10, "bob")));
        c.advance(5);
        assert!(c.is_read(&msg(5, "bob")));
        assert!(!c.is_read(&msg(6, "bob")));
        assert!(c.is_read(&msg(6, "u1")));
    }

    #[test]
    fn divider_skips_own_messages() {
        let mut c = cursor();
        let list = vec![msg(4, "bob"), msg(6, "u1"), msg(7, "bob"), msg(8, "bob")];
        assert_eq!(c.unread_divider(&list), None);
        c.advance(5);
        assert_eq!(
            c.unread_divider(&list),
            Some(&MessageId::Confirmed { id: 7 })
        );
        c.advance(8);
        assert_eq!(c.unread_divider(&list), None);
    }

    #[test]
    fn divider_follows_id_order_not_arrival_order() {
        let mut c = cursor();
        c.advance(5);
        // 9 was pushed live before the fetch brought in 7.
        let list = vec![msg(4, "bob"), msg(9, "carol"), msg(7, "bob")];
        assert_eq!(
            c.unread_divider(&list),
            Some(&MessageId::Confirmed { id: 7 })
        );
    }
}
