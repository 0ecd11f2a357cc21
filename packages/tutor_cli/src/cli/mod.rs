pub mod chat;

use anyhow::{Context, Result};
use tracing::debug;
use tutor_chat::{ChatStore, Conversation, FileStorage, SUBJECTS, subject};

use crate::config::{FileConfig, TutorConfig};
use crate::format::{relative_time, short_id};

/// Open the conversation store kept under the data directory.
pub fn open_store(config: &TutorConfig, fc: &FileConfig) -> ChatStore {
    debug!(dir = ?config.state_dir, key = %fc.chat.storage_key, "opening chat store");
    ChatStore::open(
        FileStorage::new(&config.state_dir),
        fc.chat.storage_key.as_str(),
    )
}

pub fn new_command(config: &TutorConfig, title: &str, subject_tag: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        anyhow::bail!("Title cannot be empty");
    }
    if let Some(note) = unknown_subject_note(subject_tag) {
        println!("{}", note);
    }

    let fc = config.file_config()?;
    let mut store = open_store(config, &fc);
    let id = store
        .create_conversation(title, subject_tag)
        .context("Conversation was not created")?;
    store.flush().context("Failed to save conversations")?;
    println!("{}", id);
    Ok(())
}

pub fn list_command(config: &TutorConfig) -> Result<()> {
    let fc = config.file_config()?;
    let store = open_store(config, &fc);

    if store.is_empty() {
        println!("No conversations yet. Use `tutor new <title>` to start one.");
        return Ok(());
    }

    println!(
        "  {:<9} {:<24} {:<22} {:>5}  {}",
        "ID", "TITLE", "SUBJECT", "MSGS", "UPDATED"
    );
    println!("{}", "-".repeat(80));
    for convo in store.conversations() {
        let marker = if store.active_id() == Some(convo.id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{} {:<9} {:<24} {:<22} {:>5}  {}",
            marker,
            short_id(&convo.id),
            format!("{} {}", icon_of(convo), convo.title),
            convo.subject_info().label,
            convo.message_count(),
            relative_time(convo.updated_at)
        );
    }
    println!("\n{} conversation(s)", store.len());
    Ok(())
}

pub fn show_command(config: &TutorConfig, target: Option<&str>) -> Result<()> {
    let fc = config.file_config()?;
    let store = open_store(config, &fc);
    let id = resolve_or_active(&store, target)?;
    let convo = store
        .conversation(&id)
        .with_context(|| format!("Conversation {} not found", id))?;

    print_header(convo);
    for message in &convo.messages {
        println!(
            "[{}] {}: {}",
            message
                .created_at
                .with_timezone(&chrono::Local)
                .format("%H:%M"),
            message.role,
            message.content
        );
    }
    Ok(())
}

pub fn delete_command(config: &TutorConfig, target: &str) -> Result<()> {
    let fc = config.file_config()?;
    let mut store = open_store(config, &fc);
    let id = match_conversation(store.conversations(), target)?;
    store.delete_conversation(&id);
    store.flush().context("Failed to save conversations")?;
    println!("Deleted {}", short_id(&id));
    if let Some(active) = store.active_conversation() {
        println!("Active: {} ({})", active.title, short_id(&active.id));
    }
    Ok(())
}

pub fn select_command(config: &TutorConfig, target: &str) -> Result<()> {
    let fc = config.file_config()?;
    let mut store = open_store(config, &fc);
    let id = match_conversation(store.conversations(), target)?;
    store.set_active_conversation(&id);
    store.flush().context("Failed to save conversations")?;
    if let Some(convo) = store.conversation(&id) {
        println!("Active: {} ({})", convo.title, short_id(&convo.id));
    }
    Ok(())
}

pub fn subjects_command() {
    for info in SUBJECTS {
        println!("{} {:<12} {}", info.icon, info.value, info.label);
    }
}

fn unknown_subject_note(tag: &str) -> Option<String> {
    if subject::lookup(tag).is_some() {
        return None;
    }
    Some(format!(
        "Note: '{}' is not a known subject; using {} for display.",
        tag,
        subject::resolve(tag).label
    ))
}

fn icon_of(convo: &Conversation) -> &str {
    if convo.icon.is_empty() {
        convo.subject_info().icon
    } else {
        &convo.icon
    }
}

fn print_header(convo: &Conversation) {
    println!(
        "{} {} ({})",
        icon_of(convo),
        convo.title,
        convo.subject_info().label
    );
    println!("{}", "-".repeat(60));
}

/// Resolve `target`, or fall back to the active conversation.
fn resolve_or_active(store: &ChatStore, target: Option<&str>) -> Result<String> {
    match target {
        Some(target) => match_conversation(store.conversations(), target),
        None => store
            .active_id()
            .map(str::to_owned)
            .context("No active conversation. Use `tutor new <title>` to start one."),
    }
}

/// Resolve a conversation target: exact id, then title, then an id prefix
/// or the short id shown by `list`.
fn match_conversation(conversations: &[Conversation], target: &str) -> Result<String> {
    if conversations.is_empty() {
        anyhow::bail!("No conversations yet. Use `tutor new <title>` to start one.");
    }

    if let Some(convo) = conversations.iter().find(|c| c.id == target) {
        return Ok(convo.id.clone());
    }
    if let Some(convo) = conversations.iter().find(|c| c.title == target) {
        return Ok(convo.id.clone());
    }
    let prefix_matches: Vec<_> = conversations
        .iter()
        .filter(|c| c.id.starts_with(target) || short_id(&c.id) == target)
        .collect();
    match prefix_matches.len() {
        0 => anyhow::bail!("No conversation found matching '{}'", target),
        1 => Ok(prefix_matches[0].id.clone()),
        n => anyhow::bail!(
            "Ambiguous: '{}' matches {} conversations. Be more specific.",
            target,
            n
        ),
    }
}
