//! Chatbot endpoint: answers questions or performs an action for the caller.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::content::{ChatIntent, parse_intent};
use crate::error::RegistrationError;
use crate::events::model::Event;
use crate::users::model::User;

use super::AppState;
use super::auth::CurrentUser;
use super::error::ApiError;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

#[derive(Deserialize)]
pub struct ChatRequest {
    query: String,
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query must not be empty"));
    }

    let events = state.db.list_events().await?;
    let registered = registered_events(&state, &user, &events).await?;
    let context = build_context(&events, &registered);

    let raw = state.generator.chat(query, &context).await;
    let intent = parse_intent(&raw);
    info!(user_id = %user.id, intent = ?intent, "Chat query handled");

    let (action, response) = match intent {
        ChatIntent::Reply(text) => (None, text),
        ChatIntent::ListRegistrations => (Some("list_registrations"), describe_registrations(&registered)),
        ChatIntent::Register { event_name } => {
            (Some("register"), register_by_name(&state, &user, &event_name).await?)
        }
    };

    Ok(Json(serde_json::json!({
        "response": response,
        "action": action,
    })))
}

async fn registered_events(
    state: &AppState,
    user: &User,
    events: &[Event],
) -> Result<Vec<Event>, ApiError> {
    let registrations = state.db.list_registrations_for_user(user.id).await?;
    Ok(registrations
        .iter()
        .filter_map(|r| events.iter().find(|e| e.id == r.event_id).cloned())
        .collect())
}

fn build_context(events: &[Event], registered: &[Event]) -> String {
    let now = Utc::now();
    let mut context = String::from("Upcoming events:\n");
    let upcoming: Vec<&Event> = events.iter().filter(|e| e.ends_at >= now).collect();
    if upcoming.is_empty() {
        context.push_str("- none scheduled\n");
    }
    for event in upcoming {
        context.push_str(&format!(
            "- {} ({}): {}\n",
            event.name,
            event.starts_at.format(TIME_FORMAT),
            event.description
        ));
    }

    context.push_str("\nThe user is registered for:\n");
    if registered.is_empty() {
        context.push_str("- nothing yet\n");
    }
    for event in registered {
        context.push_str(&format!("- {}\n", event.name));
    }
    context
}

fn describe_registrations(registered: &[Event]) -> String {
    if registered.is_empty() {
        return "You aren't registered for any events yet.".to_string();
    }
    let items: Vec<String> = registered
        .iter()
        .map(|e| format!("{} ({})", e.name, e.starts_at.format(TIME_FORMAT)))
        .collect();
    format!("You're registered for: {}.", items.join(", "))
}

async fn register_by_name(
    state: &AppState,
    user: &User,
    event_name: &str,
) -> Result<String, ApiError> {
    let Some(event) = state.db.find_event_by_name(event_name).await? else {
        return Ok(format!("I couldn't find an event named '{event_name}'."));
    };

    match state.registrations.register(user.id, event.id).await {
        Ok(outcome) => Ok(format!(
            "Done! You're registered for {} on {}. Watch your {} for a confirmation.",
            outcome.event.name,
            outcome.event.starts_at.format(TIME_FORMAT),
            user.preferred_channel,
        )),
        Err(RegistrationError::AlreadyRegistered { .. }) => {
            Ok(format!("You're already registered for {}.", event.name))
        }
        Err(e) => Err(e.into()),
    }
}
