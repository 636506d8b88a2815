use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use url::Url;

/// One increment of a streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            delta: String::new(),
            done: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Idle,
    Open,
    Closed,
}

#[derive(Default)]
struct Connection {
    target: Option<Url>,
    sender: Option<UnboundedSender<StreamChunk>>,
    closed: bool,
}

/// Handle to the stream an external transport feeds answer chunks into.
///
/// Only one stream is live at a time: opening a new one closes the previous
/// receiver. Cloned handles share the same connection.
#[derive(Clone, Default)]
pub struct EventSource {
    connection: Arc<Mutex<Connection>>,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, target: &str) -> Result<UnboundedReceiver<StreamChunk>, StoreError> {
        let url = Url::parse(target)
            .map_err(|err| StoreError::InvalidTarget(format!("{target}: {err}")))?;
        let (tx, rx) = unbounded_channel();
        let mut connection = self.connection.lock();
        if connection.sender.take().is_some() {
            tracing::debug!("replacing open event stream");
        }
        tracing::debug!(url = %url, "event stream opened");
        connection.target = Some(url);
        connection.sender = Some(tx);
        connection.closed = false;
        Ok(rx)
    }

    /// Forwards `chunk` to the open stream. A `done` chunk closes it.
    /// Returns false when nothing is listening.
    pub fn emit(&self, chunk: StreamChunk) -> bool {
        let mut connection = self.connection.lock();
        let finished = chunk.done;
        let delivered = match &connection.sender {
            Some(sender) => sender.send(chunk).is_ok(),
            None => false,
        };
        if (finished || !delivered) && connection.sender.take().is_some() {
            connection.closed = true;
        }
        delivered
    }

    pub fn close(&self) {
        let mut connection = self.connection.lock();
        if connection.sender.take().is_some() {
            connection.closed = true;
            tracing::debug!("event stream closed");
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        let connection = self.connection.lock();
        match (&connection.sender, connection.closed) {
            (Some(_), _) => ReadyState::Open,
            (None, true) => ReadyState::Closed,
            (None, false) => ReadyState::Idle,
        }
    }

    pub fn target(&self) -> Option<Url> {
        self.connection.lock().target.clone()
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("state", &self.ready_state())
            .field("target", &self.target().map(|url| url.to_string()))
            .finish()
    }
}
