//! Message content: touchpoint rendering plus extraction and chat prompts.

pub mod chat;
pub mod generator;
pub mod prompts;

pub use chat::{ChatIntent, parse_intent};
pub use generator::{ContentGenerator, extract_json_object, fallback_message};
