//! Outbound messaging dispatchers.
//!
//! Each dispatcher takes a rendered message (leading `Subject:` line plus
//! body) and a destination, and hands it to its provider. A dispatcher whose
//! provider is not configured simulates delivery by logging.

pub mod email;
pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::DispatchError;
use crate::users::model::{ContactChannel, User};

pub use email::{EmailConfig, EmailDispatcher};
pub use telegram::TelegramDispatcher;

/// A single outbound messaging provider.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Deliver `message` to `recipient`.
    async fn dispatch(&self, recipient: &str, message: &str) -> Result<(), DispatchError>;
}

/// The email and chat dispatchers, routed by a user's preferred channel.
#[derive(Clone)]
pub struct Dispatchers {
    pub email: Arc<dyn Dispatcher>,
    pub chat: Arc<dyn Dispatcher>,
}

impl Dispatchers {
    pub fn new(email: Arc<dyn Dispatcher>, chat: Arc<dyn Dispatcher>) -> Self {
        Self { email, chat }
    }

    /// Build both dispatchers from config; missing credentials mean simulated delivery.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            email: Arc::new(EmailDispatcher::new(config.email.clone())),
            chat: Arc::new(TelegramDispatcher::new(config.telegram_bot_token.clone())),
        }
    }

    /// Send `message` to `user` on their preferred channel.
    pub async fn deliver(&self, user: &User, message: &str) -> Result<(), DispatchError> {
        match user.preferred_channel {
            ContactChannel::Email => self.email.dispatch(&user.email, message).await,
            ContactChannel::Chat => {
                let chat_id = user
                    .chat_id
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| DispatchError::MissingDestination {
                        name: self.chat.name().to_string(),
                        user: user.id.to_string(),
                    })?;
                self.chat.dispatch(chat_id, message).await
            }
        }
    }
}
