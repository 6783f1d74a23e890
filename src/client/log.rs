use crate::models::chat::{ChatMessage, HistoryPage};
use std::collections::HashSet;
use uuid::Uuid;

/// Client-side copy of the conversation, loaded page by page.
///
/// Page 0 replaces whatever is held; later pages and pushed messages only add
/// ids not already present, so overlapping pages never duplicate a message.
/// Messages stay ordered by `(created_at, id)` however they arrive.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<Uuid>,
    loaded_pages: u32,
    has_more: bool,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_page(&mut self, page: HistoryPage) {
        if page.page == 0 {
            self.messages.clear();
            self.ids.clear();
        }

        for message in page.messages {
            self.push(message);
        }
        self.loaded_pages = self.loaded_pages.max(page.page + 1);
        self.has_more = page.has_more;
    }

    /// Adds a message unless its id is already held. Returns whether it was added.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        let key = (message.created_at, message.id);
        let at = self.messages.partition_point(|m| (m.created_at, m.id) <= key);
        self.messages.insert(at, message);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.messages.retain(|m| m.id != id);
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.loaded_pages = 0;
        self.has_more = false;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// The next server page, holding messages newer than those loaded from pages.
    pub fn next_page(&self) -> u32 {
        self.loaded_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::MessageType;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn message_at(content: &str, created_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind: MessageType::User,
            created_at,
        }
    }

    fn message(content: &str) -> ChatMessage {
        message_at(content, Utc::now())
    }

    fn contents(log: &ConversationLog) -> Vec<&str> {
        log.messages().iter().map(|m| m.content.as_str()).collect()
    }

    fn page(page: u32, messages: Vec<ChatMessage>, has_more: bool) -> HistoryPage {
        HistoryPage {
            total: messages.len() as i64,
            messages,
            page,
            has_more,
        }
    }

    #[test]
    fn later_pages_never_reintroduce_known_ids() {
        let a = message_at("a", at(0));
        let b = message_at("b", at(1));
        let c = message_at("c", at(2));

        let mut log = ConversationLog::new();
        log.merge_page(page(0, vec![a.clone(), b.clone()], true));
        // The next window overlaps by one after a concurrent insert shifted offsets.
        log.merge_page(page(1, vec![b.clone(), c.clone()], false));

        let ids: Vec<Uuid> = log.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert!(!log.has_more());
        assert_eq!(log.next_page(), 2);
    }

    #[test]
    fn first_page_replaces_the_list() {
        let mut log = ConversationLog::new();
        log.merge_page(page(0, vec![message("old")], false));
        let fresh = message("fresh");
        log.merge_page(page(0, vec![fresh.clone()], false));

        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].id, fresh.id);
    }

    #[test]
    fn push_and_remove_by_id() {
        let mut log = ConversationLog::new();
        let m = message("hello");

        assert!(log.push(m.clone()));
        assert!(!log.push(m.clone()));
        assert_eq!(log.len(), 1);

        assert!(log.remove(m.id));
        assert!(!log.remove(m.id));
        assert!(log.is_empty());
    }

    #[test]
    fn pushed_messages_keep_creation_order_across_pages() {
        let mut log = ConversationLog::new();
        let first: Vec<ChatMessage> = (0..20).map(|i| message_at(&format!("m{}", i), at(i))).collect();
        log.merge_page(page(0, first, true));

        // A turn finishes before the rest of the history has been fetched.
        assert!(log.push(message_at("live", at(3_600))));

        let second: Vec<ChatMessage> = (20..25).map(|i| message_at(&format!("m{}", i), at(i))).collect();
        log.merge_page(page(1, second, false));

        let all = contents(&log);
        assert_eq!(all.len(), 26);
        assert_eq!(&all[18..], ["m18", "m19", "m20", "m21", "m22", "m23", "m24", "live"]);
        assert!(log
            .messages()
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));
    }

    #[test]
    fn equal_timestamps_are_ordered_by_id() {
        let mut log = ConversationLog::new();
        let a = message_at("a", at(5));
        let b = message_at("b", at(5));
        log.push(a.clone());
        log.push(b.clone());

        let ids: Vec<Uuid> = log.messages().iter().map(|m| m.id).collect();
        let mut sorted = vec![a.id, b.id];
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
