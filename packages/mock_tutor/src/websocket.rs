use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::reply::reply_for;

/// A question from the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub message: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// A reply to the client. `conversationId` is echoed only when the question
/// carried one.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Answer {
    pub fn for_question(question: Question) -> Self {
        Self {
            message: reply_for(&question.message, &question.subject),
            conversation_id: question.conversation_id,
        }
    }
}

/// Serve one client: every question is answered after `delay`.
///
/// Questions keep being read while earlier answers wait, and answers leave in
/// the order the questions arrived.
pub async fn handle_websocket(socket: WebSocket, delay: Duration) {
    let session_id = uuid::Uuid::new_v4();
    info!(%session_id, "client connected");

    let (mut sender, mut receiver) = socket.split();
    let (answer_tx, mut answer_rx) = tokio::sync::mpsc::unbounded_channel::<(Instant, String)>();

    let writer = tokio::spawn(async move {
        while let Some((due, json)) = answer_rx.recv().await {
            tokio::time::sleep_until(due).await;
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let question = match serde_json::from_str::<Question>(text.as_str()) {
                    Ok(q) => q,
                    Err(e) => {
                        warn!(%session_id, error = %e, "ignoring malformed question");
                        continue;
                    }
                };
                debug!(%session_id, subject = %question.subject, "question received");
                let answer = Answer::for_question(question);
                match serde_json::to_string(&answer) {
                    Ok(json) => {
                        if answer_tx.send((Instant::now() + delay, json)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%session_id, error = %e, "failed to encode answer"),
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer.abort();
    info!(%session_id, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_echoes_conversation_id() {
        let q: Question =
            serde_json::from_str(r#"{"message":"solve for x","subject":"math","conversationId":"c9"}"#)
                .unwrap();
        let json = serde_json::to_string(&Answer::for_question(q)).unwrap();
        assert_eq!(
            json,
            r#"{"message":"To solve \"solve for x\", use algebra or calculus!","conversationId":"c9"}"#
        );
    }

    #[test]
    fn legacy_question_gets_legacy_answer() {
        let q: Question = serde_json::from_str(r#"{"message":"hi","subject":"general"}"#).unwrap();
        let json = serde_json::to_string(&Answer::for_question(q)).unwrap();
        assert_eq!(json, r#"{"message":"Interesting! Here's what I think: hi"}"#);
    }

    #[test]
    fn missing_subject_falls_through_to_echo() {
        let q: Question = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(
            Answer::for_question(q).message,
            "Interesting! Here's what I think: hi"
        );
        assert!(serde_json::from_str::<Question>(r#"{"subject":"math"}"#).is_err());
    }
}
