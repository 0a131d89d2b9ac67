//! History and search commands.

use talkbox_client::ChatClient;

use crate::format::{OutputFormat, message_line};
use crate::theme::Theme;

/// Load `pages` pages of a conversation, newest first, and print them
/// oldest first.
pub(crate) async fn run(
    client: &ChatClient,
    conversation: &str,
    pages: u32,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let mut page = client.load_messages(conversation).await?;
    for _ in 1..pages {
        let Some(oldest) = page.first().map(|m| m.id.clone()) else {
            break;
        };
        page = client.load_older(conversation, &oldest).await?;
    }

    let messages = client.messages(conversation);
    if output == OutputFormat::Pretty {
        if messages.is_empty() {
            println!("{}", Theme::info("No messages"));
            return Ok(());
        }
        println!("\n{}", Theme::header(&format!("Conversation {conversation}")));
        println!("{}", Theme::separator());
    }
    for message in &messages {
        println!("{}", message_line(message, output));
    }
    Ok(())
}

/// Search a conversation and print the hits as returned by the server.
pub(crate) async fn search(
    client: &ChatClient,
    conversation: &str,
    query: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let hits = client.search(conversation, query).await?;
    if output == OutputFormat::Pretty {
        println!(
            "{}",
            Theme::info(&format!("{} result(s) for \"{query}\"", hits.len()))
        );
    }
    for message in &hits {
        println!("{}", message_line(message, output));
    }
    Ok(())
}
