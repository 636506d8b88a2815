use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// A persisted conversation. The identifier is the key it is stored under.
///
/// Fields written by other clients are kept in `extra` so that a load/save
/// cycle does not drop them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Continuation token for resuming a paused answer. Opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_message: Option<ChatMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Merges the fields present in `patch`; absent fields keep their value.
    pub fn apply(&mut self, patch: ConversationPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(messages) = patch.messages {
            self.messages = messages;
        }
        if let Some(token) = patch.update_token {
            self.update_token = Some(token);
        }
        if let Some(context) = patch.context_message {
            self.context_message = Some(context);
        }
        self.extra.extend(patch.extra);
    }
}

/// Partial update for a [`Conversation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub update_token: Option<String>,
    pub context_message: Option<ChatMessage>,
    pub extra: Map<String, Value>,
}

impl ConversationPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn update_token(token: impl Into<String>) -> Self {
        Self {
            update_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

/// Every stored conversation, keyed by identifier.
pub type ChatCollection = BTreeMap<String, Conversation>;

/// Client preferences. Unknown keys are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(default, rename = "openAiApiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_language_hint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_title_suggestions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
