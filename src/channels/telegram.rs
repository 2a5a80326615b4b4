//! Telegram channel: long-polls the Bot API for updates.
//!
//! The bot talks to users in private chats, where the chat id equals the
//! user id, so `send` can address a user without an inbound message.

use std::time::Duration;

use async_trait::async_trait;

use crate::channels::{BotCommand, Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::store::UserId;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll when Telegram gives no retry hint.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.allowed_users, identities)
    }

    /// POST a Bot API method and fail on a non-2xx status.
    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {err}"),
            });
        }
        Ok(())
    }

    /// Send a text message, splitting at Telegram's 4096 char limit. The
    /// keyboard (or keyboard removal) rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: UserId,
        text: &str,
        options: Option<&[String]>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                body["reply_markup"] = reply_markup(options);
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                if let Some(wait) = poll_backoff(&data) {
                    tokio::time::sleep(wait).await;
                    continue;
                }
                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    let username = incoming.metadata["username"].as_str().unwrap_or("unknown");
                    let user_id_str = incoming.user_id.to_string();
                    if !check_user_allowed(&allowed_users, [username, user_id_str.as_str()]) {
                        tracing::warn!(
                            username,
                            user_id = incoming.user_id,
                            "Telegram: ignoring message from unauthorized user"
                        );
                        continue;
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, user_id: UserId, response: OutgoingResponse) -> Result<(), ChannelError> {
        self.send_message(user_id, &response.content, response.options.as_deref())
            .await
    }

    async fn send_typing(&self, user_id: UserId) -> Result<(), ChannelError> {
        self.call(
            "sendChatAction",
            &serde_json::json!({ "chat_id": user_id, "action": "typing" }),
        )
        .await
    }

    async fn register_commands(&self, commands: &[BotCommand]) -> Result<(), ChannelError> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|c| serde_json::json!({ "command": c.command, "description": c.description }))
            .collect();
        self.call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        tracing::info!(count = commands.len(), "Telegram command menu registered");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Map one getUpdates entry to an inbound message. Non-text updates and
/// updates without a sender are skipped.
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(serde_json::Value::as_i64)?;

    let username = from
        .get("username")
        .and_then(|u| u.as_str())
        .unwrap_or("unknown");
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(user_id);

    let first_name = from.get("first_name").and_then(|n| n.as_str());
    let last_name = from.get("last_name").and_then(|n| n.as_str());
    let full_name = match (first_name, last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        (None, Some(last)) => last.to_string(),
        (None, None) => username.to_string(),
    };

    Some(
        IncomingMessage::new("telegram", user_id, text)
            .with_user_name(full_name)
            .with_metadata(serde_json::json!({
                "chat_id": chat_id,
                "username": username,
            })),
    )
}

/// Reply keyboard with one button per row, or a keyboard removal.
fn reply_markup(options: Option<&[String]>) -> serde_json::Value {
    match options {
        Some(labels) => {
            let rows: Vec<serde_json::Value> = labels
                .iter()
                .map(|label| serde_json::json!([{ "text": label }]))
                .collect();
            serde_json::json!({ "keyboard": rows, "resize_keyboard": true })
        }
        None => serde_json::json!({ "remove_keyboard": true }),
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

/// How long to wait before polling again after an `ok: false` reply
/// (bad token, a second poller, rate limiting). `None` for a good reply.
fn poll_backoff(data: &serde_json::Value) -> Option<Duration> {
    if data.get("ok").and_then(serde_json::Value::as_bool) != Some(false) {
        return None;
    }
    let description = data
        .get("description")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("no description");
    let retry_after = data
        .pointer("/parameters/retry_after")
        .and_then(serde_json::Value::as_u64)
        .map(Duration::from_secs);
    tracing::warn!(
        code = data.get("error_code").and_then(serde_json::Value::as_i64),
        "Telegram rejected getUpdates: {description}"
    );
    Some(retry_after.unwrap_or(POLL_RETRY_DELAY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into(), vec!["*".into()]);
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into(), vec![]);
        assert_eq!(
            ch.api_url("setMyCommands"),
            "https://api.telegram.org/bot123:ABC/setMyCommands"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        let ch = TelegramChannel::new("t".into(), vec!["*".into()]);
        assert!(ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into(), "bob".into()]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        let ch = TelegramChannel::new("t".into(), vec![]);
        assert!(!ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into()]);
        assert!(!ch.is_user_allowed("alice_bot"));
        assert!(!ch.is_user_allowed("malice"));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        let ch = TelegramChannel::new("t".into(), vec!["123456789".into()]);
        assert!(ch.is_any_user_allowed(["unknown", "123456789"]));
        assert!(!ch.is_any_user_allowed(["unknown", "42"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_update_builds_full_name() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "text": "Yes",
                "from": {"id": 77, "first_name": "Anna", "last_name": "Petrova", "username": "anna"},
                "chat": {"id": 77}
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.user_id, 77);
        assert_eq!(msg.user_name, "Anna Petrova");
        assert_eq!(msg.content, "Yes");
        assert_eq!(msg.metadata["username"], "anna");
        assert_eq!(msg.metadata["chat_id"], 77);
    }

    #[test]
    fn parse_update_falls_back_to_username() {
        let update = serde_json::json!({
            "message": {"text": "hi", "from": {"id": 5, "username": "ghost"}}
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.user_name, "ghost");
    }

    #[test]
    fn parse_update_skips_non_text() {
        let update = serde_json::json!({
            "message": {"sticker": {}, "from": {"id": 5}}
        });
        assert!(parse_update(&update).is_none());
    }

    // ── Reply keyboards ─────────────────────────────────────────────

    #[test]
    fn reply_markup_one_button_per_row() {
        let labels = vec!["Write".to_string(), "Read".to_string()];
        let markup = reply_markup(Some(&labels));
        assert_eq!(markup["keyboard"][0][0]["text"], "Write");
        assert_eq!(markup["keyboard"][1][0]["text"], "Read");
        assert_eq!(markup["resize_keyboard"], true);
    }

    #[test]
    fn reply_markup_none_removes_keyboard() {
        assert_eq!(
            reply_markup(None),
            serde_json::json!({ "remove_keyboard": true })
        );
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn telegram_send_fails_without_valid_token() {
        let ch = TelegramChannel::new("fake-token".into(), vec!["*".into()]);
        let result = ch.send(123456, OutgoingResponse::text("hello")).await;
        assert!(result.is_err());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // Cyrillic letters are two bytes each.
        let msg = "я".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.concat(), msg);
        assert!(chunks.iter().all(|c| c.len() <= 4095));
    }

    #[test]
    fn successful_poll_has_no_backoff() {
        let data = serde_json::json!({"ok": true, "result": []});
        assert_eq!(poll_backoff(&data), None);
    }

    #[test]
    fn rejected_poll_waits_before_retrying() {
        let unauthorized = serde_json::json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        });
        assert_eq!(poll_backoff(&unauthorized), Some(POLL_RETRY_DELAY));

        let conflict = serde_json::json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        });
        assert_eq!(poll_backoff(&conflict), Some(POLL_RETRY_DELAY));
    }

    #[test]
    fn rate_limited_poll_honours_retry_after() {
        let data = serde_json::json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 17",
            "parameters": {"retry_after": 17}
        });
        assert_eq!(poll_backoff(&data), Some(Duration::from_secs(17)));
    }
}
