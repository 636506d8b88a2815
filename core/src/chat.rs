use crate::error::StoreError;
use crate::observable::{Readable, Subscription};
use crate::state::{ChatCollection, ChatMessage, Conversation, ConversationPatch, MessageRole};
use crate::store::{KeyValueStore, PersistedStore, CHAT_SLOT};
use std::sync::Arc;
use uuid::Uuid;

/// Persisted conversations keyed by identifier.
///
/// Missing conversations are created on demand by [`ChatStore::update_conversation`]
/// and [`ChatStore::append_message`]; the deleting operations report
/// [`StoreError::NotFound`] instead. Every successful call notifies subscribers
/// with the whole collection.
pub struct ChatStore {
    inner: PersistedStore<ChatCollection>,
}

impl ChatStore {
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: PersistedStore::open(backend, CHAT_SLOT, ChatCollection::new()),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ChatCollection) + Send + Sync + 'static,
    {
        self.inner.subscribe(observer)
    }

    pub fn set(&self, conversations: ChatCollection) {
        self.inner.set(conversations);
    }

    pub fn update<F>(&self, transform: F)
    where
        F: FnOnce(ChatCollection) -> ChatCollection,
    {
        self.inner.update(transform);
    }

    pub fn get(&self) -> ChatCollection {
        self.inner.get()
    }

    pub fn readonly(&self) -> Readable<ChatCollection> {
        self.inner.readonly()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.with(|chats| chats.get(id).cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.with(|chats| chats.contains_key(id))
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }

    pub fn sync(&self) -> Result<(), StoreError> {
        self.inner.sync()
    }

    /// Stores `conversation` under a fresh identifier and returns it.
    pub fn create_conversation(&self, conversation: Conversation) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let key = id.clone();
        self.inner.update(move |mut chats| {
            chats.insert(key, conversation);
            chats
        });
        id
    }

    pub fn update_conversation(&self, id: &str, patch: ConversationPatch) {
        self.inner.update(|mut chats| {
            chats.entry(id.to_string()).or_default().apply(patch);
            chats
        });
    }

    pub fn append_message(&self, id: &str, message: ChatMessage) {
        self.inner.update(|mut chats| {
            chats.entry(id.to_string()).or_default().messages.push(message);
            chats
        });
    }

    /// Drops the final message when it was written by the user. Returns whether
    /// anything was removed; a missing conversation or empty history is a no-op.
    pub fn remove_last_user_message(&self, id: &str) -> bool {
        let removed: Result<bool, StoreError> = self.inner.try_update(|chats| {
            let Some(conversation) = chats.get_mut(id) else {
                return Ok(false);
            };
            let ends_with_user = matches!(
                conversation.last_message(),
                Some(last) if last.role == MessageRole::User
            );
            if ends_with_user {
                conversation.messages.pop();
            }
            Ok(ends_with_user)
        });
        removed.unwrap_or(false)
    }

    /// Removes the message at `index`, shifting later messages left.
    pub fn delete_message(&self, id: &str, index: usize) -> Result<ChatMessage, StoreError> {
        self.inner.try_update(|chats| {
            let conversation = chats.get_mut(id).ok_or_else(|| StoreError::not_found(id))?;
            let len = conversation.messages.len();
            if index >= len {
                return Err(StoreError::IndexOutOfRange {
                    id: id.to_string(),
                    index,
                    len,
                });
            }
            Ok(conversation.messages.remove(index))
        })
    }

    /// Clears the continuation token, returning the previous one.
    pub fn delete_update_token(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.inner.try_update(|chats| {
            let conversation = chats.get_mut(id).ok_or_else(|| StoreError::not_found(id))?;
            Ok(conversation.update_token.take())
        })
    }

    pub fn delete_conversation(&self, id: &str) -> bool {
        let removed: Result<bool, StoreError> =
            self.inner.try_update(|chats| Ok(chats.remove(id).is_some()));
        removed.unwrap_or(false)
    }
}
