//! Send command - post a text message.

use std::time::Duration;

use anyhow::bail;
use talkbox_client::{ChatClient, MessageDraft};

use crate::format::{OutputFormat, message_line};
use crate::theme::Theme;

/// What to send and how.
pub(crate) struct SendRequest<'a> {
    pub(crate) conversation: &'a str,
    pub(crate) text: String,
    pub(crate) reply_to: Option<String>,
    /// Use the event stream instead of the HTTP API.
    pub(crate) over_stream: bool,
    /// How long to wait for the stream to connect, and again to flush.
    pub(crate) connect_timeout: Duration,
}

impl SendRequest<'_> {
    fn draft(&self) -> MessageDraft {
        let draft = MessageDraft::text(self.text.clone());
        match &self.reply_to {
            Some(id) => draft.replying_to(id.clone()),
            None => draft,
        }
    }
}

/// Send one message.
pub(crate) async fn run(
    client: &ChatClient,
    request: SendRequest<'_>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let draft = request.draft();

    if !request.over_stream {
        let created = client.submit_message(request.conversation, &draft).await?;
        match output {
            OutputFormat::Json => println!("{}", message_line(&created, output)),
            OutputFormat::Pretty => {
                println!("{}", Theme::success(&format!("Posted {}", created.id)));
            },
        }
        return Ok(());
    }

    client.connect()?;
    let mut states = client.subscribe_state();
    let connected = tokio::time::timeout(
        request.connect_timeout,
        states.wait_for(|s| s.is_connected() || s.is_final()),
    )
    .await
    .ok()
    .and_then(Result::ok)
    .is_some_and(|state| state.is_connected());

    if !connected {
        client.disconnect();
        bail!("Event stream did not connect");
    }

    client.send_message(request.conversation, &draft);
    if tokio::time::timeout(request.connect_timeout, client.disconnect_flushed())
        .await
        .is_err()
    {
        bail!("Timed out writing the message to the event stream");
    }
    if output == OutputFormat::Pretty {
        println!("{}", Theme::success("Sent over the event stream"));
    }
    Ok(())
}
