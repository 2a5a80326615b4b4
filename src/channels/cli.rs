//! CLI channel: stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::store::UserId;

/// The single local user a CLI session talks as.
pub const CLI_USER_ID: UserId = 1;

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user_name: String,
}

impl CliChannel {
    pub fn new() -> Self {
        let user_name = std::env::var("USER").unwrap_or_else(|_| "local user".to_string());
        Self { user_name }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render quick-reply labels as `[a] [b]`.
fn format_options(options: &[String]) -> String {
    options
        .iter()
        .map(|o| format!("[{o}]"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_name = self.user_name.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", CLI_USER_ID, line)
                            .with_user_name(user_name.clone());
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _user_id: UserId, response: OutgoingResponse) -> Result<(), ChannelError> {
        println!("\n{}", response.content);
        if let Some(options) = response.options.as_deref().filter(|o| !o.is_empty()) {
            println!("{}", format_options(options));
        }
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
