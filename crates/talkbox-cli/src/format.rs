//! Message rendering for terminal and JSON output.

use chrono::Local;
use talkbox_client::{Message, SenderKind};

use crate::theme::Theme;

/// How command output is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Human-readable, colored.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    /// Parse a `--format` value. Unknown names fall back to pretty.
    pub(crate) fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Render one message as a single line.
pub(crate) fn message_line(message: &Message, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(message).unwrap_or_default(),
        OutputFormat::Pretty => {
            let time = message
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M");
            let sender = Theme::sender(
                &message.sender.nickname,
                message.sender.kind == SenderKind::Bot,
            );
            let reply = match (&message.reply_to, &message.reply_to_id) {
                (Some(preview), _) => Theme::dimmed(&format!(" (re: {})", preview.sender_name)),
                (None, Some(id)) => Theme::dimmed(&format!(" (re: {id})")),
                (None, None) => String::new(),
            };
            format!(
                "{} {}{}: {}",
                Theme::dimmed(&time.to_string()),
                sender,
                reply,
                plain_summary(message)
            )
        },
    }
}

/// Summary text with line breaks folded so a message stays on one line.
pub(crate) fn plain_summary(message: &Message) -> String {
    message
        .body
        .summary()
        .lines()
        .collect::<Vec<_>>()
        .join(" / ")
}
