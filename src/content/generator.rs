//! Content generator: model-backed touchpoint messages with a template fallback.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::LlmError;
use crate::events::model::Event;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::users::model::User;
use crate::workflow::model::Touchpoint;

use super::prompts;

const SUBJECT_MARKER: &str = "Subject:";

/// Reply used when the chat model returns something that is not JSON.
pub const CHAT_UNPARSEABLE_REPLY: &str = r#"{"response": "I'm sorry, I had a little trouble understanding that. Could you please rephrase?"}"#;

/// Reply used when the chat model cannot be reached at all.
pub const CHAT_UNAVAILABLE_REPLY: &str = r#"{"response": "I'm sorry, the assistant is unavailable right now. Please try again in a moment."}"#;

/// Renders notification text, extracts event fields, and answers chat queries.
///
/// With no provider every call takes its fallback path.
pub struct ContentGenerator {
    llm: Option<Arc<dyn LlmProvider>>,
    config: GenerationConfig,
}

impl ContentGenerator {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    /// Whether model-backed generation is available.
    pub fn is_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Run one completion under the configured timeout.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let llm = self.llm.as_ref().ok_or(LlmError::Disabled)?;
        let request = CompletionRequest::new(messages)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);

        let response = tokio::time::timeout(self.config.timeout, llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: llm.model_name().to_string(),
                timeout: self.config.timeout,
            })??;

        debug!(
            model = llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Completion finished"
        );
        Ok(response.content)
    }

    /// Produce the message for one touchpoint. Never empty, always starts with `Subject:`.
    pub async fn render(&self, touchpoint: Touchpoint, user: &User, event: &Event) -> String {
        if !self.is_enabled() {
            return fallback_message(touchpoint, user, event);
        }

        let messages = vec![
            ChatMessage::system(prompts::touchpoint_system_prompt(touchpoint, event)),
            ChatMessage::user(prompts::touchpoint_user_prompt(user, event)),
        ];

        match self
            .complete(messages, self.config.max_tokens, self.config.temperature)
            .await
        {
            Ok(text) => match normalize_message(&text, &fallback_subject(touchpoint, event)) {
                Some(message) => {
                    info!(touchpoint = %touchpoint, user_id = %user.id, "Generated personalized message");
                    message
                }
                None => {
                    warn!(touchpoint = %touchpoint, "Model returned empty message; using template");
                    fallback_message(touchpoint, user, event)
                }
            },
            Err(e) => {
                warn!(touchpoint = %touchpoint, error = %e, "Generation failed; using template");
                fallback_message(touchpoint, user, event)
            }
        }
    }

    /// Ask the model to pull event fields out of page text. Returns the raw model output.
    pub async fn extract_event_fields(&self, page_text: &str) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::system(prompts::EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::extraction_user_prompt(page_text)),
        ];
        self.complete(messages, self.config.extraction_max_tokens, 0.0)
            .await
    }

    /// Answer a chatbot query. Always returns a JSON object as text.
    pub async fn chat(&self, query: &str, context: &str) -> String {
        let messages = vec![
            ChatMessage::system(prompts::CHAT_SYSTEM_PROMPT),
            ChatMessage::user(prompts::chat_user_prompt(query, context)),
        ];

        match self
            .complete(messages, self.config.chat_max_tokens, 0.0)
            .await
        {
            Ok(text) => {
                let json = extract_json_object(&text);
                if serde_json::from_str::<serde_json::Value>(&json).is_ok_and(|v| v.is_object()) {
                    json
                } else {
                    warn!(response = %text, "Chat model returned invalid JSON");
                    CHAT_UNPARSEABLE_REPLY.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "Chat generation failed");
                CHAT_UNAVAILABLE_REPLY.to_string()
            }
        }
    }
}

fn fallback_subject(touchpoint: Touchpoint, event: &Event) -> String {
    match touchpoint {
        Touchpoint::Welcome => format!("You're registered for {}", event.name),
        Touchpoint::Reminder24h => format!("Tomorrow: {}", event.name),
        Touchpoint::Reminder1h => format!("Starting soon: {}", event.name),
        Touchpoint::FollowUp => format!("Thanks for joining {}", event.name),
    }
}

/// Static template used whenever the model is off or fails.
pub fn fallback_message(touchpoint: Touchpoint, user: &User, event: &Event) -> String {
    let mut body = format!(
        "Hi {name},\n\nThis is a {kind} message for the event '{event}'.\n\nEvent Time: {time}",
        name = user.name,
        kind = touchpoint.as_str(),
        event = event.name,
        time = event.starts_at.format("%Y-%m-%d %H:%M UTC"),
    );
    if touchpoint == Touchpoint::FollowUp
        && let Some(url) = &event.recording_url
    {
        body.push_str(&format!("\n\nRecording: {url}"));
    }
    format!(
        "Subject: {subject}\n\n{body}\n\nBest,\nEvent Team",
        subject = fallback_subject(touchpoint, event),
    )
}

/// Trim model output down to the message, guaranteeing a leading line in the
/// canonical `Subject: <text>` form that the email channel splits on.
fn normalize_message(text: &str, subject: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(pos) = trimmed.find(SUBJECT_MARKER) {
        let (line, body) = trimmed[pos..].split_once('\n')?;
        if body.trim().is_empty() {
            return None;
        }
        let found = line[SUBJECT_MARKER.len()..].trim();
        let found = if found.is_empty() { subject } else { found };
        return Some(format!("Subject: {found}\n{body}"));
    }
    Some(format!("Subject: {subject}\n\n{trimmed}"))
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    debug!(text = trimmed, "Could not extract JSON object from LLM response");
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::events::model::EventSource;
    use crate::llm::provider::{CompletionResponse, FinishReason};
    use crate::users::model::{ContactChannel, InterestProfile, UserRole};

    /// Scripted provider: returns a fixed reply, an error, or hangs.
    struct StubLlm {
        reply: Result<String, ()>,
        delay: Duration,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl StubLlm {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn slow() -> Arc<Self> {
            Arc::new(Self {
                reply: Ok("Subject: Late\n\nToo late".to_string()),
                delay: Duration::from_secs(5),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    fn generator(llm: Option<Arc<dyn LlmProvider>>) -> ContentGenerator {
        ContentGenerator::new(
            llm,
            GenerationConfig {
                timeout: Duration::from_millis(100),
                ..GenerationConfig::default()
            },
        )
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            password_hash: String::new(),
            job_title: Some("Engineer".into()),
            role: UserRole::Regular,
            interests: InterestProfile::new(),
            preferred_channel: ContactChannel::Email,
            chat_id: None,
            created_at: Utc::now(),
        }
    }

    fn event() -> Event {
        let start = Utc::now() + chrono::Duration::days(2);
        Event {
            id: Uuid::new_v4(),
            name: "Async Rust".into(),
            description: "Futures and executors".into(),
            starts_at: start,
            ends_at: start + chrono::Duration::hours(1),
            source: EventSource::Manual,
            owner_id: Uuid::new_v4(),
            recording_url: Some("https://rec.example/async".into()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn disabled_generator_uses_template() {
        let text = generator(None)
            .render(Touchpoint::Welcome, &user(), &event())
            .await;
        assert!(text.starts_with("Subject: You're registered for Async Rust"));
        assert!(text.contains("Hi Ada,"));
        assert!(text.contains("welcome message for the event 'Async Rust'"));
    }

    #[tokio::test]
    async fn model_output_is_used_when_available() {
        let llm = StubLlm::replying("Subject: See you soon\n\nHi Ada,\n\nGreat to have you.");
        let text = generator(Some(llm.clone()))
            .render(Touchpoint::Reminder1h, &user(), &event())
            .await;
        assert_eq!(text, "Subject: See you soon\n\nHi Ada,\n\nGreat to have you.");

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(250));
        assert!(requests[0].messages[1].content.contains("Async Rust"));
    }

    #[tokio::test]
    async fn preamble_before_subject_is_dropped() {
        let llm = StubLlm::replying("Sure! Here it is:\nSubject: Hello\n\nBody text");
        let text = generator(Some(llm))
            .render(Touchpoint::Welcome, &user(), &event())
            .await;
        assert_eq!(text, "Subject: Hello\n\nBody text");
    }

    #[tokio::test]
    async fn cramped_subject_line_is_respaced() {
        let llm = StubLlm::replying("Subject:Hello\n\nBody text");
        let text = generator(Some(llm))
            .render(Touchpoint::Welcome, &user(), &event())
            .await;
        assert_eq!(text, "Subject: Hello\n\nBody text");

        let (subject, body) = crate::channels::email::extract_subject(&text);
        assert_eq!(subject, "Hello");
        assert_eq!(body, "Body text");
    }

    #[tokio::test]
    async fn blank_subject_line_takes_the_template_subject() {
        let llm = StubLlm::replying("Subject:   \nHi Ada, see you tomorrow.");
        let text = generator(Some(llm))
            .render(Touchpoint::Reminder24h, &user(), &event())
            .await;
        assert_eq!(text, "Subject: Tomorrow: Async Rust\nHi Ada, see you tomorrow.");
    }

    #[tokio::test]
    async fn missing_subject_gets_one() {
        let llm = StubLlm::replying("Hi Ada, the event is tomorrow!");
        let text = generator(Some(llm))
            .render(Touchpoint::Reminder24h, &user(), &event())
            .await;
        assert!(text.starts_with("Subject: Tomorrow: Async Rust\n\n"));
        assert!(text.ends_with("Hi Ada, the event is tomorrow!"));
    }

    #[tokio::test]
    async fn failure_falls_back_to_template() {
        let (user, event) = (user(), event());
        let text = generator(Some(StubLlm::failing()))
            .render(Touchpoint::FollowUp, &user, &event)
            .await;
        assert_eq!(text, fallback_message(Touchpoint::FollowUp, &user, &event));
        assert!(text.contains("Recording: https://rec.example/async"));
    }

    #[tokio::test]
    async fn empty_output_falls_back_to_template() {
        let text = generator(Some(StubLlm::replying("   ")))
            .render(Touchpoint::Welcome, &user(), &event())
            .await;
        assert!(text.starts_with("Subject: "));
        assert!(text.contains("Event Team"));
    }

    #[tokio::test]
    async fn timeout_falls_back_to_template() {
        let text = generator(Some(StubLlm::slow()))
            .render(Touchpoint::Welcome, &user(), &event())
            .await;
        assert!(!text.contains("Too late"));
        assert!(text.starts_with("Subject: You're registered"));
    }

    #[tokio::test]
    async fn extraction_requires_model() {
        let err = generator(None)
            .extract_event_fields("page")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
    }

    #[tokio::test]
    async fn chat_returns_json_or_fixed_reply() {
        let ok = generator(Some(StubLlm::replying(
            "```json\n{\"action\": \"list_registrations\"}\n```",
        )))
        .chat("what am I in?", "")
        .await;
        assert_eq!(ok, r#"{"action": "list_registrations"}"#);

        let garbled = generator(Some(StubLlm::replying("no idea")))
            .chat("hi", "")
            .await;
        assert_eq!(garbled, CHAT_UNPARSEABLE_REPLY);

        let down = generator(None).chat("hi", "").await;
        assert_eq!(down, CHAT_UNAVAILABLE_REPLY);
    }

    #[test]
    fn extract_json_object_variants() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), r#"{"a": 1}"#);
        assert_eq!(
            extract_json_object("Here:\n```json\n{\"a\": 1}\n```"),
            r#"{"a": 1}"#
        );
        assert_eq!(
            extract_json_object("Result: {\"a\": 1} done"),
            r#"{"a": 1}"#
        );
    }
}
