//! Tail command - follow the event stream.

use anyhow::bail;
use talkbox_client::ChatClient;
use tracing::info;

use crate::format::{OutputFormat, message_line};
use crate::theme::Theme;

/// Print incoming messages until interrupted or the stream gives up.
pub(crate) async fn run(
    client: &ChatClient,
    conversation: Option<&str>,
    backfill: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    if let Some(id) = conversation.filter(|_| backfill) {
        for message in client.load_messages(id).await? {
            println!("{}", message_line(&message, output));
        }
    }

    let filter = conversation.map(str::to_owned);
    client.on_message(move |message| {
        if filter
            .as_deref()
            .is_none_or(|id| id == message.conversation_id)
        {
            println!("{}", message_line(&message, output));
        }
    });
    client.on_mentioned(|mention| {
        let place = mention.conversation_id().unwrap_or("a conversation");
        eprintln!("{}", Theme::info(&format!("You were mentioned in {place}")));
    });
    client.on_connection_error(|message| eprintln!("{}", Theme::warning(&message)));
    client.on_connected_changed(|connected| {
        if connected {
            eprintln!("{}", Theme::success("Connected"));
        } else {
            eprintln!("{}", Theme::dimmed("Disconnected"));
        }
    });

    client.connect()?;
    let mut states = client.subscribe_state();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, closing event stream");
            client.disconnect();
            Ok(())
        }
        closed = states.wait_for(|s| s.is_final()) => {
            drop(closed);
            bail!("Event stream closed");
        }
    }
}
