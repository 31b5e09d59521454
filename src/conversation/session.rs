use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Which reply the conversation expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    AwaitingCaseNumber,
    AwaitingPartySelection,
    AwaitingEventSelection,
    /// Transient: the report is being emitted.
    Reporting,
    /// Terminal.
    Idle,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationState::AwaitingCaseNumber => "awaiting-case-number",
            ConversationState::AwaitingPartySelection => "awaiting-party-selection",
            ConversationState::AwaitingEventSelection => "awaiting-event-selection",
            ConversationState::Reporting => "reporting",
            ConversationState::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Everything one in-progress dialogue knows.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub(crate) id: String,
    pub(crate) communication_type: String,
    pub(crate) channel_tag: Option<String>,
    pub(crate) case_id: Option<String>,
    pub(crate) parties: Vec<Value>,
    pub(crate) party: Option<Value>,
    pub(crate) events: Vec<Value>,
    pub(crate) state: ConversationState,
    pub(crate) started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(communication_type: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            communication_type: communication_type.to_string(),
            channel_tag: None,
            case_id: None,
            parties: Vec::new(),
            party: None,
            events: Vec::new(),
            state: ConversationState::AwaitingCaseNumber,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn communication_type(&self) -> &str {
        &self.communication_type
    }

    /// Opaque routing metadata of the last reply.
    pub fn channel_tag(&self) -> Option<&str> {
        self.channel_tag.as_deref()
    }

    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    pub fn parties(&self) -> &[Value] {
        &self.parties
    }

    pub fn party(&self) -> Option<&Value> {
        self.party.as_ref()
    }

    pub fn events(&self) -> &[Value] {
        &self.events
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// What a party is called in prompts.
pub fn party_label(party: &Value) -> String {
    match party {
        Value::Object(map) => match map.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => party.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The identifier sent to providers for a party: `id` when present,
/// otherwise the label.
pub fn party_key(party: &Value) -> String {
    match party.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => party_label(party),
    }
}

/// One-line description of an event record.
pub fn event_summary(event: &Value) -> String {
    let Value::Object(map) = event else {
        return match event {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };

    let field = |key: &str| map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    let mut summary: Vec<String> = ["date", "time", "description"]
        .iter()
        .filter_map(|key| field(*key))
        .map(str::to_string)
        .collect();
    if summary.is_empty() {
        return event.to_string();
    }

    if let Some(location) = field("location") {
        summary.push(format!("at {}", location));
    }
    summary.join(" ")
}
