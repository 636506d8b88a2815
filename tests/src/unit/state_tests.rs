use parking_lot::Mutex;
use parlor_core::client::ClientState;
use parlor_core::event_source::ReadyState;
use parlor_core::state::{ChatMessage, ConversationPatch, MessageRole};
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

#[test]
fn client_state_records_streamed_exchange() {
    let runtime = test_runtime();
    let state = ClientState::in_memory();
    let source = state.event_source();

    state.chats.update_conversation("abc", ConversationPatch::title("Greeting"));
    state.chats.append_message("abc", ChatMessage::user("hi"));
    state.begin_answer();

    let mut rx = source.open("https://chat.example/api/answer").expect("open");
    for piece in ["hel", "lo"] {
        assert!(source.emit(parlor_core::StreamChunk::delta(piece)));
    }
    source.emit(parlor_core::StreamChunk::done());

    runtime.block_on(async {
        while let Some(chunk) = rx.recv().await {
            if chunk.done {
                break;
            }
            state.apply_chunk(&chunk);
        }
    });
    state.finish_answer("abc");

    let conversation = state.chats.conversation("abc").expect("conversation");
    assert_eq!(
        conversation.messages,
        vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
    );
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert!(!state.is_loading_answer.get());
}

#[test]
fn regenerate_flow_drops_dangling_user_message() {
    let state = ClientState::in_memory();
    state.chats.append_message("c", ChatMessage::user("first"));
    state.chats.append_message("c", ChatMessage::assistant("reply"));
    state.chats.append_message("c", ChatMessage::user("unanswered"));

    assert!(state.chats.remove_last_user_message("c"));
    assert!(!state.chats.remove_last_user_message("c"));

    let roles: Vec<MessageRole> = state
        .chats
        .conversation("c")
        .unwrap()
        .messages
        .iter()
        .map(|message| message.role)
        .collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
}

#[test]
fn observers_see_every_committed_collection() {
    let state = ClientState::in_memory();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = state.chats.subscribe(move |chats| {
        sink.lock().push(chats.keys().cloned().collect::<Vec<_>>());
    });

    state.chats.append_message("a", ChatMessage::user("1"));
    state.chats.append_message("b", ChatMessage::user("2"));
    state.chats.delete_conversation("a");
    subscription.unsubscribe();
    state.chats.delete_conversation("b");

    assert_eq!(
        *seen.lock(),
        vec![
            Vec::<String>::new(),
            vec!["a".to_string()],
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string()],
        ]
    );
}

#[test]
fn flags_are_independent() {
    let state = ClientState::in_memory();
    state.mark_initialized();
    assert!(state.is_initialized.get());
    assert!(!state.is_loading_answer.get());
    state.is_loading_answer.set(true);
    state.is_initialized.set(false);
    assert!(state.is_loading_answer.get());
}
