//! # Tutor Chat
//!
//! Client-side state and socket plumbing for a subject-tagged tutoring chat.
//!
//! ## Overview
//!
//! - [`ChatStore`] owns the conversations (newest first), the active
//!   conversation and the "assistant is typing" flag. Every mutation is
//!   written back to a [`KeyValueStorage`] as one versioned JSON blob.
//! - [`ConnectionManager`] keeps one WebSocket session per active
//!   conversation. Submitted text is appended as a `user` message and sent as
//!   `{message, subject}`; replies (`{message}`) are appended as `assistant`
//!   messages and clear the typing flag.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use tutor_chat::{ChatStore, ConnectionManager, FileStorage, DEFAULT_STORAGE_KEY};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = ChatStore::open(FileStorage::new("/tmp/tutor"), DEFAULT_STORAGE_KEY);
//! let store = Arc::new(Mutex::new(store));
//!
//! let mut conn = ConnectionManager::new("ws://localhost:8081", store.clone());
//! let _id = conn.create_conversation("Algebra", "math").await;
//!
//! if conn.state().is_connected() {
//!     conn.submit("solve for x").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod persist;
pub mod protocol;
pub mod store;
pub mod subject;
pub mod types;

pub use connection::{
    Attempt, ChatEvent, ConnectionManager, ConnectionState, ReplyBinding, SharedStore,
};
pub use error::{ConnectError, Result, SendError, StoreError};
pub use persist::{
    DEFAULT_STORAGE_KEY, FileStorage, KeyValueStorage, MemoryStorage, PersistedState,
    SCHEMA_VERSION,
};
pub use protocol::{ClientEnvelope, ServerEnvelope};
pub use store::ChatStore;
pub use subject::{DEFAULT_SUBJECT, SUBJECTS, SubjectInfo};
pub use types::{Conversation, Message, MessageRole};
