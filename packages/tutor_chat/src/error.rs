use thiserror::Error;

/// Errors raised while reading or writing persisted chat state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid persisted state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persisted state version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Reasons a user message was not transmitted.
///
/// Every variant is returned before anything is appended to the store.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no active conversation")]
    NoActiveConversation,

    #[error("conversation {0} is not the active conversation")]
    NotActive(String),

    #[error("not connected")]
    NotConnected,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised while opening a socket session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("no active conversation")]
    NoActiveConversation,

    #[error("failed to connect to {url}: {source}")]
    Socket {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_version_message() {
        let err = StoreError::UnsupportedVersion {
            found: 7,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "persisted state version 7 is newer than supported version 1"
        );
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = parse.into();
        assert!(matches!(err, StoreError::Json(_)));
    }
}
