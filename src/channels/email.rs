//! Email dispatcher: SMTP via lettre.
//!
//! The SMTP transport is blocking, so every send runs on `spawn_blocking`.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::Dispatcher;
use crate::error::DispatchError;

/// Subject used when a message has no `Subject:` line.
const DEFAULT_SUBJECT: &str = "Event update";

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (delivery is simulated).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST")
            .ok()
            .filter(|s| !s.trim().is_empty())?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Sends rendered messages by email. Without config it only logs.
pub struct EmailDispatcher {
    config: Option<EmailConfig>,
}

impl EmailDispatcher {
    pub fn new(config: Option<EmailConfig>) -> Self {
        Self { config }
    }

    /// Whether a real SMTP relay is configured.
    pub fn is_live(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl Dispatcher for EmailDispatcher {
    fn name(&self) -> &str {
        "email"
    }

    async fn dispatch(&self, recipient: &str, message: &str) -> Result<(), DispatchError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| DispatchError::InvalidRecipient {
                name: "email".into(),
                reason: format!("{recipient}: {e}"),
            })?;
        let (subject, body) = extract_subject(message);

        let Some(config) = self.config.clone() else {
            tracing::info!(to = %recipient, subject = %subject, "Simulated email delivery");
            return Ok(());
        };

        let body = body.to_string();
        tokio::task::spawn_blocking(move || send_email(&config, to, &subject, body))
            .await
            .map_err(|e| DispatchError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP task panicked: {e}"),
            })??;

        tracing::info!(to = %recipient, "Email sent");
        Ok(())
    }
}

/// Send one email via SMTP (blocking).
fn send_email(
    config: &EmailConfig,
    to: Mailbox,
    subject: &str,
    body: String,
) -> Result<(), DispatchError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| DispatchError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(config.from_address.parse().map_err(|e| {
            DispatchError::SendFailed {
                name: "email".into(),
                reason: format!("Invalid from address: {e}"),
            }
        })?)
        .to(to)
        .subject(subject)
        .body(body)
        .map_err(|e| DispatchError::SendFailed {
            name: "email".into(),
            reason: format!("Failed to build email: {e}"),
        })?;

    transport.send(&email).map_err(|e| DispatchError::SendFailed {
        name: "email".into(),
        reason: format!("SMTP send failed: {e}"),
    })?;
    Ok(())
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Split rendered content into subject and body.
///
/// If content starts with a `Subject:` line, uses that line as subject
/// and the rest as body. Otherwise uses a default subject.
pub fn extract_subject(content: &str) -> (String, &str) {
    if let Some(rest) = content.strip_prefix("Subject:")
        && let Some((line, body)) = rest.split_once('\n')
    {
        let subject = line.trim();
        if !subject.is_empty() {
            return (subject.to_string(), body.trim_start());
        }
    }
    (DEFAULT_SUBJECT.to_string(), content)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_subject_present() {
        let (subject, body) = extract_subject("Subject: Welcome!\n\nHi Ada,\nSee you there.");
        assert_eq!(subject, "Welcome!");
        assert_eq!(body, "Hi Ada,\nSee you there.");
    }

    #[test]
    fn extract_subject_missing_uses_default() {
        let (subject, body) = extract_subject("Just a plain message");
        assert_eq!(subject, DEFAULT_SUBJECT);
        assert_eq!(body, "Just a plain message");
    }

    #[test]
    fn extract_subject_accepts_unspaced_marker() {
        let (subject, body) = extract_subject("Subject:Welcome!\nHi Ada");
        assert_eq!(subject, "Welcome!");
        assert_eq!(body, "Hi Ada");
    }

    #[test]
    fn extract_subject_without_body_is_left_alone() {
        let (subject, body) = extract_subject("Subject: Only subject");
        assert_eq!(subject, DEFAULT_SUBJECT);
        assert_eq!(body, "Subject: Only subject");
    }

    #[test]
    fn config_from_env_returns_none_when_no_host() {
        // SAFETY: no other test reads SMTP_HOST.
        unsafe { std::env::remove_var("SMTP_HOST") };
        assert!(EmailConfig::from_env().is_none());
    }

    #[tokio::test]
    async fn simulated_delivery_succeeds() {
        let dispatcher = EmailDispatcher::new(None);
        assert!(!dispatcher.is_live());
        dispatcher
            .dispatch("ada@example.com", "Subject: Hi\nBody")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_recipient_is_rejected() {
        let dispatcher = EmailDispatcher::new(None);
        let err = dispatcher
            .dispatch("not-an-address", "Subject: Hi\nBody")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRecipient { .. }));
    }
}
