//! Chatbot intent parsing.

use serde_json::Value;

use super::generator::extract_json_object;

/// Reply sent when the model asks for something we cannot do.
pub const UNSUPPORTED_REPLY: &str =
    "Sorry, I can only answer questions, register you for events, or list your registrations.";

/// What the chat model decided to do with a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatIntent {
    Register { event_name: String },
    ListRegistrations,
    Reply(String),
}

/// Interpret the chat model's JSON reply.
pub fn parse_intent(raw: &str) -> ChatIntent {
    let value: Value = match serde_json::from_str(&extract_json_object(raw)) {
        Ok(v) => v,
        Err(_) => return ChatIntent::Reply(UNSUPPORTED_REPLY.to_string()),
    };

    match value.get("action").and_then(Value::as_str) {
        Some("register") => match value
            .get("event_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            Some(name) => ChatIntent::Register {
                event_name: name.to_string(),
            },
            None => ChatIntent::Reply("Which event would you like to register for?".to_string()),
        },
        Some("list_registrations") => ChatIntent::ListRegistrations,
        Some(other) => {
            tracing::debug!(action = other, "Unsupported chat action");
            ChatIntent::Reply(UNSUPPORTED_REPLY.to_string())
        }
        None => match value.get("response").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => ChatIntent::Reply(text.to_string()),
            _ => ChatIntent::Reply(UNSUPPORTED_REPLY.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_action() {
        assert_eq!(
            parse_intent(r#"{"action": "register", "event_name": " Data Summit "}"#),
            ChatIntent::Register {
                event_name: "Data Summit".into()
            }
        );
    }

    #[test]
    fn register_without_name_asks_back() {
        let ChatIntent::Reply(text) = parse_intent(r#"{"action": "register"}"#) else {
            panic!("expected a reply");
        };
        assert!(text.contains("Which event"));
    }

    #[test]
    fn list_action() {
        assert_eq!(
            parse_intent(r#"{"action": "list_registrations"}"#),
            ChatIntent::ListRegistrations
        );
    }

    #[test]
    fn conversational_reply_is_verbatim() {
        assert_eq!(
            parse_intent(r#"{"response": "The summit is on Friday."}"#),
            ChatIntent::Reply("The summit is on Friday.".into())
        );
    }

    #[test]
    fn cancel_and_garbage_are_unsupported() {
        assert_eq!(
            parse_intent(r#"{"action": "cancel", "event_name": "X"}"#),
            ChatIntent::Reply(UNSUPPORTED_REPLY.into())
        );
        assert_eq!(
            parse_intent("not json"),
            ChatIntent::Reply(UNSUPPORTED_REPLY.into())
        );
    }
}
