pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod event_source;
pub mod observable;
pub mod state;
pub mod store;
pub mod telemetry;

pub use chat::ChatStore;
pub use client::ClientState;
pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use event_source::{EventSource, ReadyState, StreamChunk};
pub use observable::{Readable, Subscription, Writable};
pub use state::{
    ChatCollection, ChatMessage, ClientSettings, Conversation, ConversationPatch, MessageRole,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistedStore, CHAT_SLOT, SETTINGS_SLOT};
