//! Event importer: fetch a page, strip it to text, let the model pull out the event.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::content::{ContentGenerator, extract_json_object};
use crate::error::ImportError;
use crate::events::model::{Event, EventSource, NewEvent};
use crate::store::Database;

/// Fetch timeout for import pages.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Naive (UTC) date formats accepted from the model, tried in order after RFC 3339.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Elements whose content never describes the event.
const NOISE_TAGS: &[&str] = &["script", "style", "nav", "header", "footer"];

static NOISE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    NOISE_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("static regex")
        })
        .collect()
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

// ── Fetching ────────────────────────────────────────────────────────

/// Retrieves the raw body of an import page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ImportError>;
}

/// `PageFetcher` over reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("engage-booster/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ImportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImportError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ImportError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        resp.text().await.map_err(|e| ImportError::Fetch {
            url: url.to_string(),
            reason: format!("Failed to read body: {e}"),
        })
    }
}

// ── Importer ────────────────────────────────────────────────────────

/// Turns a URL into a stored event.
pub struct EventImporter {
    db: Arc<dyn Database>,
    generator: Arc<ContentGenerator>,
    fetcher: Arc<dyn PageFetcher>,
}

impl EventImporter {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<ContentGenerator>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            db,
            generator,
            fetcher,
        }
    }

    /// Fetch, extract, and persist. Nothing is written unless every step succeeds.
    pub async fn import_from_url(&self, url: &str, owner_id: Uuid) -> Result<Event, ImportError> {
        let url = validate_url(url)?;
        info!(url = %url, "Importing event");

        let html = self.fetcher.fetch(&url).await?;
        let text = strip_page_text(&html);
        if text.is_empty() {
            return Err(ImportError::Extraction("page has no readable text".into()));
        }

        let raw = self
            .generator
            .extract_event_fields(&text)
            .await
            .map_err(|e| ImportError::Extraction(format!("model extraction failed: {e}")))?;

        let extracted = parse_extracted_event(&raw).inspect_err(|e| {
            warn!(url = %url, error = %e, response = %raw, "Unusable extraction");
        })?;

        let new_event = NewEvent {
            name: extracted.name,
            description: extracted.description,
            starts_at: extracted.starts_at,
            ends_at: extracted.ends_at,
            source: EventSource::Imported { url: url.clone() },
            owner_id,
            recording_url: None,
        };
        new_event.validate().map_err(ImportError::Extraction)?;

        let event = new_event.into_event();
        self.db.insert_event(&event).await?;
        info!(event_id = %event.id, name = %event.name, "Event imported");
        Ok(event)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> Result<String, ImportError> {
    let trimmed = url.trim();
    let invalid = |reason: &str| ImportError::InvalidUrl {
        url: trimmed.to_string(),
        reason: reason.to_string(),
    };

    let parsed = reqwest::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs can be imported"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(parsed.to_string())
}

/// Reduce a page to readable text, dropping scripts, styles, and site chrome.
pub fn strip_page_text(html: &str) -> String {
    let mut cleaned = COMMENT_RE.replace_all(html, " ").into_owned();
    for re in NOISE_RES.iter() {
        cleaned = re.replace_all(&cleaned, " ").into_owned();
    }
    decode_entities(&strip_html(&cleaned))
}

/// Drop tags, leaving a space where each one stood, and collapse whitespace.
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Fields pulled out of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEvent {
    pub name: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    name: Option<String>,
    description: Option<String>,
    #[serde(alias = "start_time")]
    event_time: Option<String>,
    end_time: Option<String>,
}

/// Parse the model's JSON into event fields.
///
/// `name` and a parseable start time are required. A missing or inverted end
/// time becomes start + 1h.
pub fn parse_extracted_event(raw: &str) -> Result<ExtractedEvent, ImportError> {
    let json = extract_json_object(raw);
    let fields: RawExtraction = serde_json::from_str(&json)
        .map_err(|e| ImportError::Extraction(format!("model did not return valid JSON: {e}")))?;

    let name = fields
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ImportError::Extraction("missing event name".into()))?;

    let start_raw = fields
        .event_time
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ImportError::Extraction("missing event time".into()))?;
    let starts_at = parse_event_time(&start_raw)
        .ok_or_else(|| ImportError::Extraction(format!("unparseable event time: {start_raw}")))?;

    let ends_at = fields
        .end_time
        .as_deref()
        .and_then(parse_event_time)
        .filter(|end| *end >= starts_at)
        .unwrap_or(starts_at + chrono::Duration::hours(1));

    Ok(ExtractedEvent {
        name,
        description: fields.description.unwrap_or_default().trim().to_string(),
        starts_at,
        ends_at,
    })
}

/// Parse RFC 3339 or one of the naive UTC formats.
pub fn parse_event_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ndt| ndt.and_utc())
}
