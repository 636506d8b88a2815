use parlor_core::client::ClientState;
use parlor_core::config::StoreConfig;
use parlor_core::state::{ChatMessage, ClientSettings, Conversation, ConversationPatch};
use parlor_core::store::{FileStore, KeyValueStore, CHAT_SLOT, SETTINGS_SLOT};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn conversations_and_settings_survive_restart() {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = StoreConfig::at(temp_dir.path().join("data"));

    {
        let state = ClientState::from_config(&config);
        state.settings.update(|mut settings| {
            settings.api_key = Some("sk-test".into());
            settings
        });
        state
            .chats
            .update_conversation("abc", ConversationPatch::update_token("resume"));
        state.chats.append_message("abc", ChatMessage::user("hi"));
        state.chats.append_message("abc", ChatMessage::assistant("hello"));
        state.chats.delete_message("abc", 0).expect("delete");
        state.live_answer.set(ChatMessage::assistant("unsaved"));
        state.is_initialized.set(true);
    }

    let state = ClientState::from_config(&config);
    assert_eq!(state.settings.get().api_key.as_deref(), Some("sk-test"));
    let conversation = state.chats.conversation("abc").expect("persisted conversation");
    assert_eq!(conversation.messages, vec![ChatMessage::assistant("hello")]);
    assert_eq!(conversation.update_token.as_deref(), Some("resume"));
    assert_eq!(state.live_answer.get().content, "");
    assert!(!state.is_initialized.get());
}

#[test]
fn deleted_conversation_stays_deleted_on_disk() {
    let temp_dir = TempDir::new().expect("temp dir");
    let backend = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));

    let state = ClientState::open(backend.clone());
    let id = state.chats.create_conversation(Conversation::new("Temporary"));
    assert!(state.chats.delete_conversation(&id));

    let raw = backend.read(CHAT_SLOT).unwrap().expect("chat slot");
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, serde_json::json!({}));

    let reopened = ClientState::open(backend);
    assert!(reopened.chats.conversation(&id).is_none());
}

#[test]
fn absent_or_corrupt_slots_load_as_empty() {
    let temp_dir = TempDir::new().expect("temp dir");
    let backend = FileStore::new(temp_dir.path().to_path_buf());
    backend.write(SETTINGS_SLOT, "][").unwrap();

    let state = ClientState::open(Arc::new(backend.clone()));
    assert_eq!(state.settings.get(), ClientSettings::default());
    assert!(state.chats.get().is_empty());
    assert!(state.chats.is_persistent());
    assert_eq!(backend.read(SETTINGS_SLOT).unwrap().as_deref(), Some("{}"));
}

#[test]
fn slot_format_matches_browser_layout() {
    let temp_dir = TempDir::new().expect("temp dir");
    let backend = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
    let state = ClientState::open(backend.clone());
    state.chats.append_message("slug", ChatMessage::user("hey"));

    let raw = backend.read(CHAT_SLOT).unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "slug": {
                "title": "",
                "messages": [{"role": "user", "content": "hey"}]
            }
        })
    );
    assert_eq!(
        backend.keys().unwrap(),
        vec![CHAT_SLOT.to_string(), SETTINGS_SLOT.to_string()]
    );
}

#[test]
fn memory_config_never_writes() {
    let state = ClientState::from_config(&StoreConfig::in_memory());
    state.chats.append_message("x", ChatMessage::user("ephemeral"));
    assert!(state.chats.contains("x"));
    let fresh = ClientState::from_config(&StoreConfig::in_memory());
    assert!(!fresh.chats.contains("x"));
}
