use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};
use tutor_chat::{ChatEvent, ConnectionManager, SendError, SharedStore};

use crate::cli::{match_conversation, open_store, print_header};
use crate::config::TutorConfig;

/// A line typed into the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Reconnect,
    Text(&'a str),
    Blank,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Blank,
        "/quit" | "/exit" => Input::Quit,
        "/reconnect" => Input::Reconnect,
        text => Input::Text(text),
    }
}

/// Interactive session against the tutor for one conversation.
///
/// Lines read from stdin are submitted; replies and status changes are
/// printed as they arrive. `/reconnect` re-opens the socket, `/quit` leaves.
pub async fn chat_command(
    config: &TutorConfig,
    target: Option<&str>,
    url_override: Option<String>,
) -> Result<()> {
    let fc = config.file_config()?;
    let store = open_store(config, &fc);
    let id = match target {
        Some(target) => match_conversation(store.conversations(), target)?,
        None => store
            .active_id()
            .map(str::to_owned)
            .context("No conversations yet. Use `tutor new <title>` to start one.")?,
    };

    let url = url_override.unwrap_or(fc.server.url);
    let store: SharedStore = Arc::new(Mutex::new(store));
    let mut conn =
        ConnectionManager::new(url, store.clone()).with_binding(fc.chat.reply_binding);
    let mut events = conn.subscribe();

    {
        let guard = store.lock().await;
        if let Some(convo) = guard.conversation(&id) {
            print_header(convo);
            for message in &convo.messages {
                println!("{}: {}", message.role, message.content);
            }
        }
    }

    println!("Connecting to {} ...", conn.url());
    if let Err(e) = conn.select(&id).await {
        println!("{}. Type /reconnect to retry.", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Blank => {}
                    Input::Quit => break,
                    Input::Reconnect => {
                        if let Err(e) = conn.reconnect().await {
                            println!("{}", e);
                        }
                    }
                    Input::Text(text) => println!("{}", try_submit(&conn, &store, text).await),
                }
            }
            event = events.recv() => match event {
                Ok(ChatEvent::StatusChanged(state)) => println!("[{}]", state),
                Ok(ChatEvent::Reply { conversation_id, message_id }) => {
                    print_reply(&store, &id, &conversation_id, &message_id).await;
                }
                Ok(ChatEvent::Dropped { reason }) => debug!(%reason, "reply dropped"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "chat events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    conn.disconnect().await;
    store
        .lock()
        .await
        .flush()
        .context("Failed to save conversations")?;
    Ok(())
}

/// Submit one line and describe the outcome. Only one question may be
/// outstanding: while a reply is owed the line is refused.
async fn try_submit(conn: &ConnectionManager, store: &SharedStore, text: &str) -> String {
    if store.lock().await.is_typing() {
        return "(tutor is still typing)".to_string();
    }
    match conn.submit(text).await {
        Ok(_) => "(tutor is typing...)".to_string(),
        Err(SendError::NotConnected) => {
            format!("Not connected ({}). Type /reconnect to retry.", conn.state())
        }
        Err(e) => e.to_string(),
    }
}

async fn print_reply(store: &SharedStore, current: &str, conversation_id: &str, message_id: &str) {
    let store = store.lock().await;
    let Some(convo) = store.conversation(conversation_id) else {
        return;
    };
    let Some(message) = convo.messages.iter().find(|m| m.id == message_id) else {
        return;
    };
    if conversation_id == current {
        println!("{}: {}", message.role, message.content);
    } else {
        println!("(reply saved to \"{}\") {}", convo.title, message.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("  /exit "), Input::Quit);
        assert_eq!(parse_input("/reconnect"), Input::Reconnect);
        assert_eq!(parse_input("   "), Input::Blank);
    }

    #[tokio::test]
    async fn submit_is_refused_while_tutor_is_typing() {
        let store: SharedStore = Arc::new(Mutex::new(tutor_chat::ChatStore::in_memory()));
        let id = store
            .lock()
            .await
            .create_conversation("Algebra", "math")
            .unwrap();
        let conn = ConnectionManager::new("ws://127.0.0.1:9", store.clone());

        store.lock().await.set_typing(true);
        assert_eq!(
            try_submit(&conn, &store, "solve for x").await,
            "(tutor is still typing)"
        );

        store.lock().await.set_typing(false);
        assert_eq!(
            try_submit(&conn, &store, "solve for x").await,
            "Not connected (Disconnected). Type /reconnect to retry."
        );

        let store = store.lock().await;
        assert_eq!(store.conversation(&id).unwrap().message_count(), 1);
    }

    #[test]
    fn parse_text_is_trimmed() {
        assert_eq!(parse_input("  solve for x \n"), Input::Text("solve for x"));
        assert_eq!(parse_input("/unknown"), Input::Text("/unknown"));
    }
}
