//! Channel-agnostic conversation state machine.
//!
//! ```text
//!  case number        party choice          event choice
//! ┌───────────────┐  ┌──────────────────┐  ┌──────────────────┐  ┌───────────┐
//! │AwaitingCase   │─▶│AwaitingParty     │─▶│AwaitingEvent     │─▶│Reporting  │─▶ Idle
//! │Number         │  │Selection         │  │Selection         │  └───────────┘
//! └──────┬────────┘  └────────┬─────────┘  └──────────────────┘
//!        │ zero parties        │ zero events
//!        └────────────────────┴──────────────────────────────────────────────▶ Idle
//! ```
//!
//! Every turn that needs user input produces a prompt and suspends. The owning
//! channel adapter resumes the dialogue by calling [`Conversation::parse`]
//! with the next reply. The end token abandons the dialogue from any state.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::{
    aggregate::{ErrorMode, get_case_parties, get_case_party_events},
    bus::ProviderBus,
};

pub mod messages;
pub mod session;

pub use messages::{MessageTemplates, Messages, MessagesError};
pub use session::{ConversationState, Session, event_summary, party_key, party_label};

pub const DEFAULT_END_TOKEN: &str = "END";

/// A prompt together with the session that produced it; the "reply" event
/// of the adapter contract.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyEvent {
    pub prompt: String,
    pub session: Session,
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("the conversation has already finished")]
    Finished,

    #[error(transparent)]
    Messages(#[from] MessagesError),
}

pub struct Conversation {
    bus: ProviderBus,
    messages: Arc<Messages>,
    session: Session,
    prompt: Option<String>,
    end_token: String,
    reply_listener: Option<UnboundedSender<ReplyEvent>>,
}

impl Conversation {
    pub fn new(communication_type: &str, bus: ProviderBus, messages: Arc<Messages>) -> Self {
        let session = Session::new(communication_type);
        debug!(session = %session.id(), communication_type, "conversation started");
        Self {
            bus,
            messages,
            session,
            prompt: None,
            end_token: DEFAULT_END_TOKEN.to_string(),
            reply_listener: None,
        }
    }

    /// Receive every emitted prompt as a [`ReplyEvent`].
    pub fn with_reply_listener(mut self, listener: UnboundedSender<ReplyEvent>) -> Self {
        self.reply_listener = Some(listener);
        self
    }

    pub fn with_end_token(mut self, end_token: impl Into<String>) -> Self {
        self.end_token = end_token.into();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConversationState {
        self.session.state
    }

    pub fn is_finished(&self) -> bool {
        self.session.state == ConversationState::Idle
    }

    /// The last prompt emitted, if any.
    pub fn current_prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn end_token(&self) -> &str {
        &self.end_token
    }

    /// Resume with the reply of the channel identified by `channel_tag`.
    ///
    /// Returns the next prompt, or `None` when the reply abandoned the
    /// dialogue.
    pub async fn parse(&mut self, reply: &str, channel_tag: &str) -> Result<Option<String>, ConversationError> {
        if self.is_finished() {
            return Err(ConversationError::Finished);
        }
        self.session.channel_tag = Some(channel_tag.to_string());

        let reply = reply.trim();
        if reply.eq_ignore_ascii_case(&self.end_token) {
            info!(session = %self.session.id, state = %self.session.state, "conversation abandoned");
            self.session.state = ConversationState::Idle;
            self.prompt = None;
            return Ok(None);
        }

        let prompt = match self.session.state {
            ConversationState::AwaitingCaseNumber => self.on_case_number(reply).await?,
            ConversationState::AwaitingPartySelection => self.on_party_selection(reply).await?,
            ConversationState::AwaitingEventSelection => self.on_event_selection(reply)?,
            ConversationState::Reporting | ConversationState::Idle => {
                return Err(ConversationError::Finished);
            }
        };

        self.emit(&prompt);
        if self.session.state == ConversationState::Reporting {
            self.session.state = ConversationState::Idle;
        }
        Ok(Some(prompt))
    }

    /// [`Conversation::parse`] with the channel tag of the previous reply.
    pub async fn submit_reply(&mut self, reply: &str) -> Result<Option<String>, ConversationError> {
        let channel_tag = self.session.channel_tag.clone().unwrap_or_default();
        self.parse(reply, &channel_tag).await
    }

    // Each handler renders its prompt before touching the session, so a
    // render failure leaves the session as it was.

    async fn on_case_number(&mut self, reply: &str) -> Result<String, ConversationError> {
        if reply.is_empty() {
            return Ok(self.messages.ask_case_number(&self.end_token)?);
        }

        let case_id = reply.to_string();
        let record = get_case_parties(&self.bus, &case_id, ErrorMode::RECORD)
            .await
            .into_record();

        if record.values.is_empty() {
            if !record.errors.is_empty() {
                warn!(case = %case_id, errors = record.errors.len(), "party lookup failed");
            }
            let prompt = self.messages.no_parties(&case_id)?;
            self.session.case_id = Some(case_id);
            self.session.state = ConversationState::Idle;
            return Ok(prompt);
        }

        let labels: Vec<String> = record.values.iter().map(party_label).collect();
        let prompt = self.messages.select_party(&case_id, &labels)?;
        self.session.case_id = Some(case_id);
        self.session.parties = record.values;
        self.session.state = ConversationState::AwaitingPartySelection;
        Ok(prompt)
    }

    async fn on_party_selection(&mut self, reply: &str) -> Result<String, ConversationError> {
        let case_id = self.session.case_id.clone().unwrap_or_default();
        let labels: Vec<String> = self.session.parties.iter().map(party_label).collect();
        let Some(index) = select(reply, &labels) else {
            let prompt = self.messages.select_party(&case_id, &labels)?;
            return Ok(self.messages.invalid_selection(reply, &prompt)?);
        };

        let party = self.session.parties[index].clone();
        let party_name = &labels[index];
        let record = get_case_party_events(&self.bus, &case_id, &party_key(&party), ErrorMode::RECORD)
            .await
            .into_record();

        if record.values.is_empty() {
            if !record.errors.is_empty() {
                warn!(case = %case_id, errors = record.errors.len(), "event lookup failed");
            }
            let prompt = self.messages.no_events(&case_id, party_name)?;
            self.session.party = Some(party);
            self.session.state = ConversationState::Idle;
            return Ok(prompt);
        }

        let summaries: Vec<String> = record.values.iter().map(event_summary).collect();
        let prompt = self.messages.select_event(&case_id, party_name, &summaries)?;
        self.session.party = Some(party);
        self.session.events = record.values;
        self.session.state = ConversationState::AwaitingEventSelection;
        Ok(prompt)
    }

    fn on_event_selection(&mut self, reply: &str) -> Result<String, ConversationError> {
        let case_id = self.session.case_id.as_deref().unwrap_or_default();
        let party_name = self.session.party.as_ref().map(party_label).unwrap_or_default();
        let summaries: Vec<String> = self.session.events.iter().map(event_summary).collect();

        let selected: Vec<String> = if reply.eq_ignore_ascii_case("all") {
            summaries
        } else {
            match select(reply, &summaries) {
                Some(index) => vec![summaries[index].clone()],
                None => {
                    let prompt = self.messages.select_event(case_id, &party_name, &summaries)?;
                    return Ok(self.messages.invalid_selection(reply, &prompt)?);
                }
            }
        };

        let report = self.messages.report(case_id, &party_name, &selected)?;
        self.session.state = ConversationState::Reporting;
        info!(session = %self.session.id, events = selected.len(), "conversation reported");
        Ok(report)
    }

    fn emit(&mut self, prompt: &str) {
        self.prompt = Some(prompt.to_string());
        if let Some(listener) = &self.reply_listener {
            let event = ReplyEvent { prompt: prompt.to_string(), session: self.session.clone() };
            if listener.send(event).is_err() {
                debug!(session = %self.session.id, "reply listener dropped");
            }
        }
    }
}

/// A 1-based index into `labels`, or a label matched case-insensitively.
fn select(reply: &str, labels: &[String]) -> Option<usize> {
    if let Ok(number) = reply.parse::<usize>() {
        return (1..=labels.len()).contains(&number).then(|| number - 1);
    }
    labels.iter().position(|label| label.eq_ignore_ascii_case(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn bus_with_case() -> ProviderBus {
        let bus = ProviderBus::new();
        bus.subscribe(RETRIEVE_PARTIES, |query, c| {
            if query.case_id == "CF-2016-644" {
                c.resolve(json!([{"id": "1", "name": "Jane Doe"}, {"id": "2", "name": "John Roe"}]));
            }
        });
        bus.subscribe(RETRIEVE_PARTY_EVENTS, |query, c| {
            if query.party_id.as_deref() == Some("1") {
                c.resolve(json!({"date": "2026-11-02", "description": "Arraignment"}));
                c.resolve(json!({"date": "2026-12-01", "description": "Trial"}));
            }
        });
        bus
    }

    fn conversation(bus: ProviderBus) -> Conversation {
        Conversation::new("console", bus, Arc::new(Messages::default()))
    }

    #[test]
    fn test_select() {
        let labels = vec!["Jane Doe".to_string(), "John Roe".to_string()];
        assert_eq!(select("1", &labels), Some(0));
        assert_eq!(select("2", &labels), Some(1));
        assert_eq!(select("0", &labels), None);
        assert_eq!(select("3", &labels), None);
        assert_eq!(select("john roe", &labels), Some(1));
        assert_eq!(select("nobody", &labels), None);
    }

    #[tokio::test]
    async fn test_full_dialogue() {
        let mut conv = conversation(bus_with_case());
        assert!(conv.current_prompt().is_none());

        let prompt = conv.parse("CF-2016-644", "tty").await.unwrap().unwrap();
        assert_eq!(conv.state(), ConversationState::AwaitingPartySelection);
        assert!(prompt.contains("1. Jane Doe"));
        assert_eq!(conv.session().channel_tag(), Some("tty"));

        let prompt = conv.submit_reply("1").await.unwrap().unwrap();
        assert_eq!(conv.state(), ConversationState::AwaitingEventSelection);
        assert!(prompt.contains("Jane Doe has 2 upcoming event(s)"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        conv.reply_listener = Some(tx);
        let report = conv.submit_reply("all").await.unwrap().unwrap();
        assert_eq!(rx.try_recv().unwrap().session.state(), ConversationState::Reporting);
        assert!(conv.is_finished());
        assert!(report.contains("- 2026-11-02 Arraignment"));
        assert!(report.contains("- 2026-12-01 Trial"));
        assert_eq!(conv.current_prompt(), Some(report.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_party_selection_reprompts() {
        let mut conv = conversation(bus_with_case());
        conv.parse("CF-2016-644", "tty").await.unwrap();

        let prompt = conv.parse("9", "tty").await.unwrap().unwrap();
        assert!(prompt.starts_with("Sorry, \"9\" is not one of the options."));
        assert_eq!(conv.state(), ConversationState::AwaitingPartySelection);

        conv.parse("jane doe", "tty").await.unwrap();
        assert_eq!(conv.state(), ConversationState::AwaitingEventSelection);
    }

    #[tokio::test]
    async fn test_single_event_report() {
        let mut conv = conversation(bus_with_case());
        conv.parse("CF-2016-644", "tty").await.unwrap();
        conv.parse("1", "tty").await.unwrap();

        let report = conv.parse("2", "tty").await.unwrap().unwrap();
        assert!(report.contains("Trial"));
        assert!(!report.contains("Arraignment"));
        assert!(conv.is_finished());
    }

    #[tokio::test]
    async fn test_zero_parties_with_error_ends_after_one_prompt() {
        let bus = ProviderBus::new();
        bus.subscribe(RETRIEVE_PARTIES, |_, c| c.reject("backend down"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conv = conversation(bus).with_reply_listener(tx);

        let prompt = conv.parse("CF-2016-644", "tty").await.unwrap().unwrap();
        assert!(prompt.starts_with("Sorry, we could not find any information for case CF-2016-644"));
        assert!(conv.is_finished());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.prompt, prompt);
        assert_eq!(event.session.state(), ConversationState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_party_without_events_ends() {
        let mut conv = conversation(bus_with_case());
        conv.parse("CF-2016-644", "tty").await.unwrap();
        let prompt = conv.parse("2", "tty").await.unwrap().unwrap();
        assert_eq!(
            prompt,
            "Sorry, we could not find any upcoming events for John Roe on case CF-2016-644."
        );
        assert!(conv.is_finished());
    }

    #[tokio::test]
    async fn test_end_token_abandons_from_any_state() {
        let mut conv = conversation(bus_with_case());
        conv.parse("CF-2016-644", "tty").await.unwrap();
        assert_eq!(conv.parse(" end ", "tty").await.unwrap(), None);
        assert!(conv.is_finished());
        assert!(conv.current_prompt().is_none());
    }

    #[tokio::test]
    async fn test_input_after_idle_is_rejected() {
        let mut conv = conversation(ProviderBus::new());
        conv.parse("CF-2016-644", "tty").await.unwrap();
        assert!(conv.is_finished());
        assert!(matches!(conv.parse("1", "tty").await, Err(ConversationError::Finished)));
    }

    #[tokio::test]
    async fn test_panicking_provider_still_gets_the_apology() {
        let bus = ProviderBus::new();
        bus.subscribe(RETRIEVE_PARTIES, |_, c| c.push(async { panic!("provider blew up") }));
        let mut conv = conversation(bus);

        let prompt = conv.parse("CF-2016-644", "tty").await.unwrap().unwrap();
        assert!(prompt.starts_with("Sorry, we could not find any information for case CF-2016-644"));
        assert!(conv.is_finished());
    }

    #[tokio::test]
    async fn test_render_failure_leaves_session_untouched() {
        let messages = Messages::from_yaml("select_party: \"{{no_such_helper case}}\"\n").unwrap();
        let mut conv = Conversation::new("console", bus_with_case(), Arc::new(messages));

        let result = conv.parse("CF-2016-644", "tty").await;
        assert!(matches!(result, Err(ConversationError::Messages(MessagesError::Render(_)))));
        assert_eq!(conv.state(), ConversationState::AwaitingCaseNumber);
        assert!(conv.session().case_id().is_none());
        assert!(conv.session().parties().is_empty());
        assert!(conv.current_prompt().is_none());
    }

    #[tokio::test]
    async fn test_blank_case_number_reprompts() {
        let mut conv = conversation(bus_with_case()).with_end_token("STOP");
        let prompt = conv.parse("   ", "tty").await.unwrap().unwrap();
        assert_eq!(prompt, "Please reply with your case number, or STOP to stop.");
        assert_eq!(conv.state(), ConversationState::AwaitingCaseNumber);
    }
}
