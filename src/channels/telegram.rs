//! Telegram dispatcher: pushes messages through the Bot API `sendMessage`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::Dispatcher;
use crate::error::DispatchError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram chat dispatcher. Without a bot token it only logs.
pub struct TelegramDispatcher {
    bot_token: Option<SecretString>,
    client: reqwest::Client,
}

impl TelegramDispatcher {
    pub fn new(bot_token: Option<SecretString>) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    /// Whether a real bot token is configured.
    pub fn is_live(&self) -> bool {
        self.bot_token.is_some()
    }

    fn api_url(token: &SecretString, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            token.expose_secret()
        )
    }

    /// Send one chunk, trying Markdown first with plain text fallback.
    async fn send_chunk(
        &self,
        token: &SecretString,
        chat_id: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        let url = Self::api_url(token, "sendMessage");
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(&url)
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| DispatchError::SendFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        tracing::warn!(
            status = ?markdown_resp.status(),
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(&url)
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| DispatchError::SendFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let status = plain_resp.status();
            let err = plain_resp.text().await.unwrap_or_default();
            return Err(DispatchError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed ({status}): {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for TelegramDispatcher {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn dispatch(&self, recipient: &str, message: &str) -> Result<(), DispatchError> {
        let chat_id = recipient.trim();
        if !is_valid_chat_id(chat_id) {
            return Err(DispatchError::InvalidRecipient {
                name: "telegram".into(),
                reason: format!("not a chat id: {recipient:?}"),
            });
        }

        let Some(token) = &self.bot_token else {
            tracing::info!(chat_id, "Simulated chat delivery");
            return Ok(());
        };

        for chunk in split_message(message, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_chunk(token, chat_id, &chunk).await?;
        }
        tracing::info!(chat_id, "Telegram message sent");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Numeric chat id (groups are negative) or a public `@channel` username.
fn is_valid_chat_id(chat_id: &str) -> bool {
    if let Some(name) = chat_id.strip_prefix('@') {
        return name.len() >= 5 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    }
    let digits = chat_id.strip_prefix('-').unwrap_or(chat_id);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
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

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_token() {
        let token = SecretString::from("123:abc");
        assert_eq!(
            TelegramDispatcher::api_url(&token, "sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn chat_id_validation() {
        assert!(is_valid_chat_id("99887766"));
        assert!(is_valid_chat_id("-1001234567890"));
        assert!(is_valid_chat_id("@engage_news"));
        assert!(!is_valid_chat_id(""));
        assert!(!is_valid_chat_id("-"));
        assert!(!is_valid_chat_id("ada@example.com"));
        assert!(!is_valid_chat_id("@abc"));
    }

    #[tokio::test]
    async fn simulated_delivery_succeeds() {
        let dispatcher = TelegramDispatcher::new(None);
        assert!(!dispatcher.is_live());
        dispatcher.dispatch("42", "Subject: Hi\nBody").await.unwrap();
    }

    #[tokio::test]
    async fn bad_chat_id_is_rejected_before_sending() {
        let dispatcher = TelegramDispatcher::new(Some(SecretString::from("t")));
        let err = dispatcher.dispatch("nobody", "hello").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRecipient { .. }));
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_hard_cut() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let msg = "é".repeat(10);
        let chunks = split_message(&msg, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), msg);
    }
}
