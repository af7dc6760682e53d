//! Chat CLI commands: create-chat, send, delete-chat, messages, members.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use chatserver_core::chat::context::CallContext;
use chatserver_types::chat::{ChatId, NewMessage};

use crate::state::AppState;

/// A call context that is also cancelled by Ctrl+C.
fn interruptible_context(state: &AppState) -> CallContext {
    let ctx = state.call_context();
    let token = ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });
    ctx
}

/// Create a chat for the given usernames.
///
/// ```bash
/// chatserver create-chat Alan Browdi
/// ```
pub async fn create_chat(state: &AppState, usernames: Vec<String>, json: bool) -> Result<()> {
    let ctx = interruptible_context(state);
    let result = state.chat_service.create_chat(&usernames, &ctx).await;
    ctx.cancel();
    let chat_id = result?;

    if json {
        println!("{}", serde_json::json!({ "id": chat_id }));
        return Ok(());
    }

    println!();
    println!(
        "  {} Created chat {} with {}",
        style("✓").green().bold(),
        style(chat_id).cyan().bold(),
        usernames.join(", ")
    );
    println!();
    Ok(())
}

/// Send a message, timestamped now, to the sender's most recent chat.
pub async fn send(state: &AppState, from: String, text: String, json: bool) -> Result<()> {
    let message = NewMessage::new(from, text, chrono::Utc::now());

    let ctx = interruptible_context(state);
    let result = state.chat_service.send_message(&message, &ctx).await;
    ctx.cancel();
    result?;

    if json {
        println!("{}", serde_json::json!({ "sent": true }));
        return Ok(());
    }

    println!(
        "  {} Message from {} sent",
        style("✓").green().bold(),
        style(&message.from).cyan()
    );
    Ok(())
}

pub async fn delete_chat(state: &AppState, id: i64, json: bool) -> Result<()> {
    let chat_id = ChatId(id);

    let ctx = interruptible_context(state);
    let result = state.chat_service.delete_chat(chat_id, &ctx).await;
    ctx.cancel();
    result?;

    if json {
        println!("{}", serde_json::json!({ "deleted": true, "id": chat_id }));
        return Ok(());
    }

    println!(
        "  {} Deleted chat {}",
        style("✓").green().bold(),
        style(chat_id).cyan()
    );
    Ok(())
}

/// Print the most recent messages as a table, newest first.
pub async fn messages(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let ctx = interruptible_context(state);
    let result = state.chat_service.recent_messages(limit, &ctx).await;
    ctx.cancel();
    let messages = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages yet. Send one with: {}",
            style("i").blue().bold(),
            style("chatserver send --from <user> <text>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Chat").fg(Color::Cyan),
        Cell::new("From").fg(Color::Cyan),
        Cell::new("Message").fg(Color::Cyan),
        Cell::new("Sent").fg(Color::Cyan),
    ]);

    for m in &messages {
        table.add_row(vec![
            Cell::new(m.chat_id),
            Cell::new(&m.sender).fg(Color::Green),
            Cell::new(&m.text),
            Cell::new(m.timestamp.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub async fn members(state: &AppState, id: i64, json: bool) -> Result<()> {
    let chat_id = ChatId(id);

    let ctx = interruptible_context(state);
    let result = state.chat_service.chat_members(chat_id, &ctx).await;
    ctx.cancel();
    let users = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("User ID").fg(Color::Cyan),
        Cell::new("Username").fg(Color::Cyan),
    ]);
    for user in &users {
        table.add_row(vec![Cell::new(user.id), Cell::new(&user.username)]);
    }

    println!();
    println!("  Members of chat {}", style(chat_id).cyan().bold());
    println!("{table}");
    Ok(())
}
