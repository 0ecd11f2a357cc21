//! Socket session management for the active conversation.
//!
//! One [`Session`] exists per active-conversation selection. Selecting another
//! conversation closes the current session before the next one is opened, and
//! dropping a session aborts its socket task, so no listener outlives the
//! selection it was opened for. Sessions carry a generation number; status
//! updates and replies from an older generation are discarded.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ConnectError, SendError};
use crate::protocol::{ClientEnvelope, ServerEnvelope};
use crate::store::ChatStore;
use crate::types::MessageRole;

pub type SharedStore = Arc<Mutex<ChatStore>>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<StdMutex<VecDeque<String>>>;

const CLOSE_GRACE: Duration = Duration::from_millis(500);
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: Attempt },
    Connected,
    Error { attempt: Attempt },
}

impl ConnectionState {
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting {
                attempt: Attempt::Initial,
            } => "Connecting…",
            Self::Connecting {
                attempt: Attempt::Reconnect,
            } => "Reconnecting…",
            Self::Connected => "Connected",
            Self::Error {
                attempt: Attempt::Initial,
            } => "Connection Error",
            Self::Error {
                attempt: Attempt::Reconnect,
            } => "Reconnection Failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status_text())
    }
}

/// How an incoming reply is matched to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyBinding {
    /// The conversation that sent the request: the echoed `conversationId`,
    /// else the oldest unanswered request on the session, else the active
    /// conversation.
    #[default]
    Originating,
    /// Whatever conversation is active when the reply arrives.
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StatusChanged(ConnectionState),
    Reply {
        conversation_id: String,
        message_id: String,
    },
    Dropped {
        reason: String,
    },
}

#[derive(Clone)]
struct Shared {
    store: SharedStore,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<ChatEvent>,
    generation: Arc<AtomicU64>,
    binding: ReplyBinding,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, state: ConnectionState) {
        if !self.is_current(generation) {
            debug!(?state, generation, "ignoring status from a closed session");
            return;
        }
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(status = %state, "connection status changed");
            let _ = self.events.send(ChatEvent::StatusChanged(state));
        }
    }

    fn drop_reply(&self, reason: String) {
        let _ = self.events.send(ChatEvent::Dropped { reason });
    }

    async fn receive(&self, generation: u64, pending: &Pending, raw: &str) {
        let envelope = match ServerEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed server frame");
                self.drop_reply(format!("malformed frame: {}", e));
                return;
            }
        };

        let mut store = self.store.lock().await;
        if !self.is_current(generation) {
            debug!(generation, "dropping reply for a closed session");
            return;
        }

        let queued = pending.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let target = match self.binding {
            ReplyBinding::Originating => envelope
                .conversation_id
                .or(queued)
                .or_else(|| store.active_id().map(str::to_owned)),
            ReplyBinding::Active => store.active_id().map(str::to_owned),
        };
        store.set_typing(false);

        let Some(conversation_id) = target else {
            warn!("dropping reply: no conversation to deliver to");
            self.drop_reply("no active conversation".to_string());
            return;
        };

        match store.append_message(&conversation_id, &envelope.message, MessageRole::Assistant) {
            Some(message_id) => {
                drop(store);
                debug!(%conversation_id, %message_id, "reply delivered");
                let _ = self.events.send(ChatEvent::Reply {
                    conversation_id,
                    message_id,
                });
            }
            None => {
                warn!(%conversation_id, "dropping reply for a deleted conversation");
                self.drop_reply(format!("conversation {} no longer exists", conversation_id));
            }
        }
    }
}

enum Outbound {
    Frame(String),
    Close,
}

/// A live socket bound to one conversation selection.
struct Session {
    conversation_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Pending,
    task: Option<JoinHandle<()>>,
}

impl Session {
    async fn close(mut self) {
        let _ = self.outbound.send(Outbound::Close);
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Keeps one socket session open for the active conversation and feeds
/// replies back into the store.
pub struct ConnectionManager {
    url: String,
    shared: Shared,
    session: Option<Session>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, store: SharedStore) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.into(),
            shared: Shared {
                store,
                state: Arc::new(state),
                events,
                generation: Arc::new(AtomicU64::new(0)),
                binding: ReplyBinding::default(),
            },
            session: None,
        }
    }

    pub fn with_binding(mut self, binding: ReplyBinding) -> Self {
        self.shared.binding = binding;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn binding(&self) -> ReplyBinding {
        self.shared.binding
    }

    pub fn store(&self) -> &SharedStore {
        &self.shared.store
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    /// Conversation the current session was opened for, if any.
    pub fn session_conversation(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.conversation_id.as_str())
    }

    /// Make `conversation_id` active and open a fresh session for it.
    pub async fn select(&mut self, conversation_id: &str) -> Result<(), ConnectError> {
        let known = self
            .shared
            .store
            .lock()
            .await
            .set_active_conversation(conversation_id);
        if !known {
            return Err(ConnectError::UnknownConversation(conversation_id.to_string()));
        }
        self.open(conversation_id.to_string(), Attempt::Initial).await
    }

    /// Manually re-open the session for the active conversation.
    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        let active = self
            .shared
            .store
            .lock()
            .await
            .active_id()
            .map(str::to_owned)
            .ok_or(ConnectError::NoActiveConversation)?;
        self.open(active, Attempt::Reconnect).await
    }

    pub async fn disconnect(&mut self) {
        let generation = self.teardown().await;
        self.shared.publish(generation, ConnectionState::Disconnected);
    }

    /// Create a conversation through the store and connect to it.
    ///
    /// A connection failure leaves the conversation in place; the status
    /// reflects the failure.
    pub async fn create_conversation(&mut self, title: &str, subject: &str) -> Option<String> {
        let id = self
            .shared
            .store
            .lock()
            .await
            .create_conversation(title, subject)?;
        self.follow_active().await;
        Some(id)
    }

    /// Delete a conversation through the store, moving the session to the
    /// newly active conversation if the active one was removed.
    pub async fn delete_conversation(&mut self, conversation_id: &str) -> bool {
        let deleted = self
            .shared
            .store
            .lock()
            .await
            .delete_conversation(conversation_id);
        if deleted {
            self.follow_active().await;
        }
        deleted
    }

    /// Transmit `text` for `conversation_id`, which must be active on a
    /// connected session. Nothing is sent otherwise.
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        subject: &str,
    ) -> Result<(), SendError> {
        let store = self.shared.store.lock().await;
        self.queue_frame(&store, conversation_id, text, subject)
    }

    /// The user flow: append the text as a `user` message to the active
    /// conversation, raise the typing flag, and send it.
    ///
    /// The store stays locked from the checks until the message is appended,
    /// and the frame is queued before the append, so a rejected submit never
    /// leaves an unsent message behind.
    pub async fn submit(&self, text: &str) -> Result<String, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let mut store = self.shared.store.lock().await;
        let (conversation_id, subject) = store
            .active_conversation()
            .map(|c| (c.id.clone(), c.subject.clone()))
            .ok_or(SendError::NoActiveConversation)?;

        self.queue_frame(&store, &conversation_id, text, &subject)?;
        let message_id = store
            .append_message(&conversation_id, text, MessageRole::User)
            .ok_or(SendError::NoActiveConversation)?;
        store.set_typing(true);
        Ok(message_id)
    }

    /// Check the session and hand one frame to its socket task. Replies are
    /// processed under the store lock, so holding `store` here keeps the
    /// reply from overtaking the caller's own bookkeeping.
    fn queue_frame(
        &self,
        store: &ChatStore,
        conversation_id: &str,
        text: &str,
        subject: &str,
    ) -> Result<(), SendError> {
        if !self.state().is_connected() {
            return Err(SendError::NotConnected);
        }
        let Some(session) = self.session.as_ref() else {
            return Err(SendError::NotConnected);
        };
        if store.active_id() != Some(conversation_id) || session.conversation_id != conversation_id
        {
            return Err(SendError::NotActive(conversation_id.to_string()));
        }

        let frame = ClientEnvelope {
            message: text.to_string(),
            subject: subject.to_string(),
            conversation_id: Some(conversation_id.to_string()),
        }
        .to_json()?;

        let mut pending = session.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_back(conversation_id.to_string());
        if session.outbound.send(Outbound::Frame(frame)).is_err() {
            pending.pop_back();
            return Err(SendError::NotConnected);
        }
        debug!(conversation_id, subject, "message sent");
        Ok(())
    }

    /// Handle one raw server frame as if it arrived on the current session.
    pub async fn on_receive(&self, raw: &str) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let pending = self
            .session
            .as_ref()
            .map(|s| s.pending.clone())
            .unwrap_or_default();
        self.shared.receive(generation, &pending, raw).await;
    }

    async fn follow_active(&mut self) {
        let active = self.shared.store.lock().await.active_id().map(str::to_owned);
        match active {
            Some(id) if self.session_conversation() == Some(id.as_str()) => {}
            Some(id) => {
                if let Err(e) = self.open(id, Attempt::Initial).await {
                    warn!(error = %e, "could not connect to the active conversation");
                }
            }
            None => self.disconnect().await,
        }
    }

    /// Close the current session, if any, and invalidate its generation.
    ///
    /// Replies still owed to the closed session are never delivered, so the
    /// typing flag they would have cleared is cleared here.
    async fn teardown(&mut self) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(session) = self.session.take() {
            debug!(conversation_id = %session.conversation_id, "closing session");
            let owed = !session
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_empty();
            session.close().await;
            if owed {
                self.shared.store.lock().await.set_typing(false);
            }
        }
        generation
    }

    async fn open(&mut self, conversation_id: String, attempt: Attempt) -> Result<(), ConnectError> {
        let generation = self.teardown().await;
        self.shared
            .publish(generation, ConnectionState::Connecting { attempt });

        let ws = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(source) => {
                warn!(url = %self.url, error = %source, "connection failed");
                self.shared
                    .publish(generation, ConnectionState::Error { attempt });
                return Err(ConnectError::Socket {
                    url: self.url.clone(),
                    source,
                });
            }
        };

        info!(url = %self.url, %conversation_id, "connected");
        self.shared.publish(generation, ConnectionState::Connected);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = Pending::default();
        let task = tokio::spawn(run_session(
            ws,
            outbound_rx,
            self.shared.clone(),
            generation,
            attempt,
            pending.clone(),
        ));
        self.session = Some(Session {
            conversation_id,
            outbound,
            pending,
            task: Some(task),
        });
        Ok(())
    }
}

async fn run_session(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Shared,
    generation: u64,
    attempt: Attempt,
    pending: Pending,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(json)) => {
                    if let Err(e) = write.send(WsFrame::Text(json.into())).await {
                        warn!(error = %e, "socket write failed");
                        shared.publish(generation, ConnectionState::Error { attempt });
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(WsFrame::Close(None)).await;
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsFrame::Text(text))) => {
                    shared.receive(generation, &pending, text.as_str()).await;
                }
                Some(Ok(WsFrame::Close(_))) | None => {
                    info!("server closed the connection");
                    shared.publish(generation, ConnectionState::Disconnected);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "socket error");
                    shared.publish(generation, ConnectionState::Error { attempt });
                    break;
                }
            },
        }
    }
}
