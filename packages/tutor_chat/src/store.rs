use tracing::{debug, info, warn};

use crate::error::Result;
use crate::persist::{self, DEFAULT_STORAGE_KEY, KeyValueStorage, MemoryStorage, PersistedState};
use crate::types::{Conversation, MessageRole};

/// The chat state holder: conversations (newest first), the active
/// conversation, and the transient typing flag.
///
/// Every mutation that changes persisted state writes the full state back to
/// storage. Storage failures are logged and do not undo the in-memory change;
/// call [`ChatStore::flush`] to observe them.
pub struct ChatStore {
    conversations: Vec<Conversation>,
    active: Option<String>,
    is_typing: bool,
    storage: Box<dyn KeyValueStorage>,
    key: String,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("conversations", &self.conversations.len())
            .field("active", &self.active)
            .field("is_typing", &self.is_typing)
            .field("key", &self.key)
            .finish()
    }
}

impl ChatStore {
    /// Rehydrate from `storage`. A missing, unreadable or unparseable blob
    /// yields an empty store.
    pub fn open(storage: impl KeyValueStorage + 'static, key: impl Into<String>) -> Self {
        let key = key.into();
        let state = match storage.get(&key) {
            Ok(Some(raw)) => match persist::decode(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding unreadable chat state");
                    PersistedState::default()
                }
            },
            Ok(None) => PersistedState::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read chat state");
                PersistedState::default()
            }
        };

        let mut store = Self {
            conversations: state.chats,
            active: state.active_chat,
            is_typing: false,
            storage: Box::new(storage),
            key,
        };
        store.repair_active();
        info!(
            conversations = store.conversations.len(),
            "chat state loaded"
        );
        store
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY)
    }

    /// Create a conversation and make it active.
    ///
    /// Returns `None` without touching state when the title is blank.
    pub fn create_conversation(&mut self, title: &str, subject: &str) -> Option<String> {
        if title.trim().is_empty() {
            debug!("ignoring conversation with blank title");
            return None;
        }

        let conversation = Conversation::new(title, subject);
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active = Some(id.clone());
        self.persist();
        info!(conversation_id = %id, subject = %subject, "conversation created");
        Some(id)
    }

    /// Append a message, returning its id, or `None` if the conversation
    /// does not exist.
    pub fn append_message(
        &mut self,
        conversation_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Option<String> {
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)?;
        let message_id = conversation.push_message(content, role).id.clone();
        self.persist();
        debug!(conversation_id, %role, "message appended");
        Some(message_id)
    }

    /// Delete a conversation and all of its messages.
    ///
    /// Deleting the active conversation moves the active id to the first
    /// remaining conversation, or clears it.
    pub fn delete_conversation(&mut self, conversation_id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != conversation_id);
        if self.conversations.len() == before {
            return false;
        }

        if self.active.as_deref() == Some(conversation_id) {
            self.active = self.conversations.first().map(|c| c.id.clone());
        }
        self.persist();
        info!(conversation_id, "conversation deleted");
        true
    }

    /// Make `conversation_id` active. Unknown ids are refused.
    pub fn set_active_conversation(&mut self, conversation_id: &str) -> bool {
        if self.conversation(conversation_id).is_none() {
            return false;
        }
        if self.active.as_deref() != Some(conversation_id) {
            self.active = Some(conversation_id.to_string());
            self.persist();
        }
        true
    }

    pub fn set_typing(&mut self, is_typing: bool) {
        self.is_typing = is_typing;
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_deref().and_then(|id| self.conversation(id))
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            chats: self.conversations.clone(),
            active_chat: self.active.clone(),
        }
    }

    /// Write the current state to storage.
    pub fn flush(&self) -> Result<()> {
        let raw = persist::encode(&self.snapshot())?;
        self.storage.set(&self.key, &raw)
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            warn!(key = %self.key, error = %e, "failed to persist chat state");
        }
    }

    fn repair_active(&mut self) {
        let resolves = self
            .active
            .as_deref()
            .is_some_and(|id| self.conversation(id).is_some());
        if !resolves {
            self.active = self.conversations.first().map(|c| c.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    struct FailingStorage;

    impl KeyValueStorage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(std::io::Error::other("disk on fire").into())
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(std::io::Error::other("disk on fire").into())
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    fn total_messages(store: &ChatStore) -> usize {
        store.conversations().iter().map(|c| c.message_count()).sum()
    }

    #[test]
    fn create_seeds_welcome_and_activates() {
        let mut store = ChatStore::in_memory();
        let id = store.create_conversation("Algebra", "math").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.active_id(), Some(id.as_str()));
        let convo = store.active_conversation().unwrap();
        assert_eq!(convo.messages.len(), 1);
        assert_eq!(convo.messages[0].role, MessageRole::Assistant);
        assert!(convo.messages[0].content.contains("Algebra"));
        assert!(convo.messages[0].content.contains("Mathematics"));
    }

    #[test]
    fn blank_title_is_ignored() {
        let mut store = ChatStore::in_memory();
        store.create_conversation("Existing", "general").unwrap();
        assert!(store.create_conversation("", "math").is_none());
        assert!(store.create_conversation("   \t\n", "math").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn newest_first() {
        let mut store = ChatStore::in_memory();
        let a = store.create_conversation("First", "art").unwrap();
        let b = store.create_conversation("Second", "music").unwrap();
        let ids: Vec<_> = store.conversations().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![b.clone(), a]);
        assert_eq!(store.active_id(), Some(b.as_str()));
    }

    #[test]
    fn append_to_unknown_is_noop() {
        let mut store = ChatStore::in_memory();
        store.create_conversation("History", "history").unwrap();
        let before = total_messages(&store);
        assert!(
            store
                .append_message("does-not-exist", "hello", MessageRole::User)
                .is_none()
        );
        assert_eq!(total_messages(&store), before);
    }

    #[test]
    fn append_refreshes_updated_at() {
        let mut store = ChatStore::in_memory();
        let id = store.create_conversation("Cells", "biology").unwrap();
        let before = store.conversation(&id).unwrap().updated_at;
        let msg_id = store
            .append_message(&id, "what is mitosis", MessageRole::User)
            .unwrap();
        let convo = store.conversation(&id).unwrap();
        assert!(convo.updated_at >= before);
        assert_eq!(convo.messages.last().unwrap().id, msg_id);
    }

    #[test]
    fn delete_active_reassigns() {
        let mut store = ChatStore::in_memory();
        let a = store.create_conversation("A", "general").unwrap();
        let b = store.create_conversation("B", "general").unwrap();
        assert_eq!(store.active_id(), Some(b.as_str()));

        assert!(store.delete_conversation(&b));
        assert_eq!(store.active_id(), Some(a.as_str()));

        assert!(store.delete_conversation(&a));
        assert_eq!(store.active_id(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_inactive_keeps_active() {
        let mut store = ChatStore::in_memory();
        let a = store.create_conversation("A", "general").unwrap();
        let b = store.create_conversation("B", "general").unwrap();
        assert!(store.delete_conversation(&a));
        assert_eq!(store.active_id(), Some(b.as_str()));
        assert!(!store.delete_conversation(&a));
    }

    #[test]
    fn set_active_refuses_unknown() {
        let mut store = ChatStore::in_memory();
        let a = store.create_conversation("A", "general").unwrap();
        store.create_conversation("B", "general").unwrap();
        assert!(!store.set_active_conversation("nope"));
        assert!(store.set_active_conversation(&a));
        assert_eq!(store.active_id(), Some(a.as_str()));
    }

    #[test]
    fn typing_is_not_persisted() {
        let storage = MemoryStorage::new();
        let mut store = ChatStore::open(storage.clone(), "k");
        store.create_conversation("A", "general").unwrap();
        store.set_typing(true);
        assert!(store.is_typing());

        let reopened = ChatStore::open(storage, "k");
        assert!(!reopened.is_typing());
    }

    #[test]
    fn rehydrates_from_storage() {
        let storage = MemoryStorage::new();
        let mut store = ChatStore::open(storage.clone(), "k");
        let a = store.create_conversation("A", "physics").unwrap();
        store.append_message(&a, "why is the sky blue", MessageRole::User);
        store.create_conversation("B", "art").unwrap();
        store.set_active_conversation(&a);

        let reopened = ChatStore::open(storage, "k");
        assert_eq!(reopened.snapshot(), store.snapshot());
        assert_eq!(reopened.active_id(), Some(a.as_str()));
    }

    #[test]
    fn dangling_active_is_repaired_on_open() {
        let storage = MemoryStorage::new();
        let mut state = PersistedState {
            chats: vec![Conversation::new("Only", "general")],
            active_chat: Some("ghost".into()),
        };
        storage.set("k", &persist::encode(&state).unwrap()).unwrap();
        let store = ChatStore::open(storage.clone(), "k");
        assert_eq!(store.active_id(), Some(state.chats[0].id.as_str()));

        state.chats.clear();
        storage.set("k", &persist::encode(&state).unwrap()).unwrap();
        let store = ChatStore::open(storage, "k");
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn corrupt_blob_opens_empty() {
        let storage = MemoryStorage::new();
        storage.set("k", "{{{{").unwrap();
        let store = ChatStore::open(storage, "k");
        assert!(store.is_empty());
    }

    #[test]
    fn storage_failures_do_not_lose_memory_state() {
        let mut store = ChatStore::open(FailingStorage, "k");
        let id = store.create_conversation("Offline", "general").unwrap();
        assert!(store.append_message(&id, "still here", MessageRole::User).is_some());
        assert_eq!(store.conversation(&id).unwrap().message_count(), 2);
        assert!(matches!(store.flush(), Err(StoreError::Io(_))));
    }
}
