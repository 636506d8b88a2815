use crate::chat::ChatStore;
use crate::config::StoreConfig;
use crate::event_source::{EventSource, StreamChunk};
use crate::observable::{Readable, Writable};
use crate::state::{ChatMessage, ClientSettings, MessageRole};
use crate::store::{FileStore, KeyValueStore, MemoryStore, PersistedStore, SETTINGS_SLOT};
use std::sync::Arc;

/// All client-side state for one application session.
///
/// Settings and conversations are persisted through the backend handed to
/// [`ClientState::open`]; the answer and flag stores start fresh every session.
/// The two persisted stores are independent: no update spans both atomically.
pub struct ClientState {
    pub settings: PersistedStore<ClientSettings>,
    pub chats: ChatStore,
    pub live_answer: Writable<ChatMessage>,
    pub is_loading_answer: Writable<bool>,
    pub is_initialized: Writable<bool>,
    event_source: Readable<EventSource>,
}

impl ClientState {
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            settings: PersistedStore::open(
                backend.clone(),
                SETTINGS_SLOT,
                ClientSettings::default(),
            ),
            chats: ChatStore::open(backend),
            live_answer: Writable::new(empty_answer()),
            is_loading_answer: Writable::new(false),
            is_initialized: Writable::new(false),
            event_source: Readable::new(EventSource::new()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let backend: Arc<dyn KeyValueStore> = if config.persist {
            tracing::info!(dir = %config.data_dir.display(), "opening persisted client state");
            Arc::new(FileStore::new(config.data_dir.clone()))
        } else {
            tracing::info!("persistence disabled, client state lives in memory");
            Arc::new(MemoryStore::new())
        };
        Self::open(backend)
    }

    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()))
    }

    pub fn event_source(&self) -> EventSource {
        self.event_source.get()
    }

    pub fn event_source_store(&self) -> &Readable<EventSource> {
        &self.event_source
    }

    /// Starts a new streamed answer: clears the live answer and raises the
    /// loading flag.
    pub fn begin_answer(&self) {
        self.live_answer.set(empty_answer());
        self.is_loading_answer.set(true);
    }

    pub fn apply_chunk(&self, chunk: &StreamChunk) {
        if chunk.delta.is_empty() {
            return;
        }
        self.live_answer.update(|mut answer| {
            answer.content.push_str(&chunk.delta);
            answer
        });
    }

    /// Moves the live answer into conversation `id`. Empty answers are dropped.
    /// Returns the stored message, if any.
    pub fn finish_answer(&self, id: &str) -> Option<ChatMessage> {
        let answer = self.live_answer.get();
        self.live_answer.set(empty_answer());
        self.is_loading_answer.set(false);
        if answer.content.is_empty() {
            return None;
        }
        self.chats.append_message(id, answer.clone());
        Some(answer)
    }

    /// Abandons the in-flight answer without storing it.
    pub fn cancel_answer(&self) {
        self.event_source.with(|source| source.close());
        self.live_answer.set(empty_answer());
        self.is_loading_answer.set(false);
    }

    pub fn mark_initialized(&self) {
        self.is_initialized.set(true);
    }
}

fn empty_answer() -> ChatMessage {
    ChatMessage::new(MessageRole::Assistant, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::ReadyState;

    #[test]
    fn transient_stores_start_reset() {
        let state = ClientState::in_memory();
        assert_eq!(state.live_answer.get(), ChatMessage::assistant(""));
        assert!(!state.is_loading_answer.get());
        assert!(!state.is_initialized.get());
        assert_eq!(state.settings.get(), ClientSettings::default());
        assert!(state.chats.get().is_empty());
    }

    #[test]
    fn streamed_answer_lands_in_conversation() {
        let state = ClientState::in_memory();
        state.chats.append_message("c1", ChatMessage::user("2+2?"));
        state.begin_answer();
        assert!(state.is_loading_answer.get());
        for piece in ["It is ", "4."] {
            state.apply_chunk(&StreamChunk::delta(piece));
        }
        assert_eq!(state.live_answer.get().content, "It is 4.");

        let stored = state.finish_answer("c1").expect("stored answer");
        assert_eq!(stored, ChatMessage::assistant("It is 4."));
        assert!(!state.is_loading_answer.get());
        assert_eq!(state.live_answer.get().content, "");
        assert_eq!(state.chats.conversation("c1").unwrap().messages.len(), 2);
    }

    #[test]
    fn empty_answer_is_not_stored() {
        let state = ClientState::in_memory();
        state.begin_answer();
        assert!(state.finish_answer("c1").is_none());
        assert!(!state.chats.contains("c1"));
    }

    #[test]
    fn whitespace_answer_is_kept() {
        let state = ClientState::in_memory();
        state.begin_answer();
        state.apply_chunk(&StreamChunk::delta("\n"));
        assert_eq!(state.finish_answer("c1"), Some(ChatMessage::assistant("\n")));
        assert_eq!(state.chats.conversation("c1").unwrap().messages.len(), 1);
    }

    #[test]
    fn cancel_closes_stream_and_discards_answer() {
        let state = ClientState::in_memory();
        let _rx = state
            .event_source()
            .open("https://chat.example/stream")
            .expect("open");
        state.begin_answer();
        state.apply_chunk(&StreamChunk::delta("partial"));
        state.cancel_answer();
        assert_eq!(state.event_source().ready_state(), ReadyState::Closed);
        assert_eq!(state.live_answer.get().content, "");
        assert!(!state.is_loading_answer.get());
    }
}
