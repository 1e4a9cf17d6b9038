//! Prompt templates for touchpoint messages, event extraction, and the chatbot.

use crate::events::model::Event;
use crate::users::model::User;
use crate::workflow::model::Touchpoint;

/// Characters of page text sent for extraction.
pub const EXTRACTION_TEXT_LIMIT: usize = 4000;

/// Characters of chatbot context sent per query.
pub const CHAT_CONTEXT_LIMIT: usize = 3000;

/// How many interest tags are mentioned in a touchpoint prompt.
const PROMPT_INTEREST_TAGS: usize = 5;

/// Truncate to at most `limit` characters, on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn touchpoint_instructions(touchpoint: Touchpoint, event: &Event) -> String {
    match touchpoint {
        Touchpoint::Welcome => "Be warm, confirm their registration, and mention how the event \
             relates to their interests or job title."
            .to_string(),
        Touchpoint::Reminder24h => "The event is about a day away. Build excitement, recap what \
             they will learn, and include the placeholder [EVENT_LINK] for the join link."
            .to_string(),
        Touchpoint::Reminder1h => "The event starts within the hour. Be energetic and concise \
             and include the placeholder [EVENT_LINK] for the join link."
            .to_string(),
        Touchpoint::FollowUp => match &event.recording_url {
            Some(url) => format!(
                "Thank them for attending and share the recording link: {url}"
            ),
            None => "Thank them for attending and let them know the recording will be \
                 shared soon."
                .to_string(),
        },
    }
}

/// System prompt for a touchpoint message.
pub fn touchpoint_system_prompt(touchpoint: Touchpoint, event: &Event) -> String {
    format!(
        "You are a friendly and professional event assistant. Write the content for a \
         '{kind}' message about an event.\n\n\
         Output format (follow it exactly, starting with 'Subject:'):\n\
         Subject: <subject line>\n\n\
         Hi <user name>,\n\n\
         <body>\n\n\
         Best,\n\
         The Event Team\n\n\
         Instructions: {instructions}\n\
         Keep it under 150 words. Output only the message.",
        kind = touchpoint.as_str(),
        instructions = touchpoint_instructions(touchpoint, event),
    )
}

/// User prompt carrying the recipient and event details.
pub fn touchpoint_user_prompt(user: &User, event: &Event) -> String {
    let interests = user.interests.top(PROMPT_INTEREST_TAGS);
    let interests = if interests.is_empty() {
        "none recorded yet".to_string()
    } else {
        interests.join(", ")
    };

    format!(
        "### User Details\n\
         - Name: {name}\n\
         - Job Title: {job}\n\
         - Interests: {interests}\n\n\
         ### Event Details\n\
         - Name: {event_name}\n\
         - Description: {description}\n\
         - Starts: {starts}\n\
         - Ends: {ends}",
        name = user.name,
        job = user.job_title.as_deref().unwrap_or("not provided"),
        event_name = event.name,
        description = event.description,
        starts = event.starts_at.format("%Y-%m-%d %H:%M UTC"),
        ends = event.ends_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert data extraction assistant. \
Analyze the provided text from a webpage and extract the event details. Return a single, \
valid JSON object with the keys \"name\", \"description\", \"event_time\", and \"end_time\". \
Times must use the 'YYYY-MM-DD HH:MM:SS' format in UTC. If you cannot find a piece of \
information, use null for that key. Output only the JSON object.";

/// User prompt for extraction, with a one-shot example.
pub fn extraction_user_prompt(page_text: &str) -> String {
    format!(
        "### Example Input Text\n\
         Join us for our annual developer conference, \"CodeFusion 2024\"! This year we're \
         exploring the future of AI in software development. The event kicks off on \
         October 26th, 2024 at 9:00 AM UTC and runs until noon.\n\n\
         ### Example JSON Output\n\
         {{\"name\": \"CodeFusion 2024\", \"description\": \"An annual developer conference \
         exploring the future of AI in software development.\", \"event_time\": \
         \"2024-10-26 09:00:00\", \"end_time\": \"2024-10-26 12:00:00\"}}\n\n\
         ### Webpage Text to Analyze\n\
         {text}\n\n\
         ### Your JSON Output",
        text = truncate_chars(page_text, EXTRACTION_TEXT_LIMIT),
    )
}

pub const CHAT_SYSTEM_PROMPT: &str = "You are the assistant for an event platform. Help the \
user by either answering their question or performing an action for them. Choose one path:\n\n\
1. Action: if the user wants to register for an event or list their registrations, return a \
JSON object with the key \"action\".\n\
   - {\"action\": \"register\", \"event_name\": \"<exact event name>\"}\n\
   - {\"action\": \"list_registrations\"}\n\
2. Conversation: for anything else, return {\"response\": \"<your friendly answer>\"}. Base \
your answer only on the provided context. If the answer isn't in the context, say you don't \
have that information.\n\n\
Return a single valid JSON object and nothing else.";

/// User prompt for a chatbot query.
pub fn chat_user_prompt(query: &str, context: &str) -> String {
    let context = if context.chars().count() > CHAT_CONTEXT_LIMIT {
        format!(
            "{}\n... (context truncated)",
            truncate_chars(context, CHAT_CONTEXT_LIMIT)
        )
    } else {
        context.to_string()
    };
    format!("### Context\n{context}\n\n### User Question\n{query}")
}
