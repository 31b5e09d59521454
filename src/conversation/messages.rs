use std::{fs, path::Path};

use handlebars::{Handlebars, Template};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Handlebars templates for every prompt the conversation can emit.
///
/// Templates are rendered without HTML escaping; the outputs are plain text
/// for terminals and SMS.
///
/// | template            | data                                              |
/// |---------------------|---------------------------------------------------|
/// | `ask_case_number`   | `end_token`                                       |
/// | `select_party`      | `case`, `count`, `options[] { number, label }`    |
/// | `select_event`      | `case`, `party`, `count`, `options[]`             |
/// | `invalid_selection` | `reply`, `prompt`                                 |
/// | `report`            | `case`, `party`, `events[]`                       |
/// | `no_parties`        | `case`                                            |
/// | `no_events`         | `case`, `party`                                   |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageTemplates {
    pub ask_case_number: String,
    pub select_party: String,
    pub select_event: String,
    pub invalid_selection: String,
    pub report: String,
    pub no_parties: String,
    pub no_events: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            ask_case_number: "Please reply with your case number, or {{end_token}} to stop.".into(),
            select_party: "We found {{count}} parties on case {{case}}. \
                Reply with the number of the party you want to follow:\n\
                {{#each options}}{{number}}. {{label}}\n{{/each}}"
                .into(),
            select_event: "{{party}} has {{count}} upcoming event(s) on case {{case}}. \
                Reply with a number for details, or ALL:\n\
                {{#each options}}{{number}}. {{label}}\n{{/each}}"
                .into(),
            invalid_selection: "Sorry, \"{{reply}}\" is not one of the options.\n{{prompt}}".into(),
            report: "Case {{case}}, {{party}}:\n{{#each events}}- {{this}}\n{{/each}}\
                Thank you for using courtbot."
                .into(),
            no_parties: "Sorry, we could not find any information for case {{case}}. \
                Please check the case number and try again later."
                .into(),
            no_events: "Sorry, we could not find any upcoming events for {{party}} on case {{case}}."
                .into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessagesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("template `{name}` does not compile: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("template rendering failed: {0}")]
    Render(String),
}

/// The rendering side of [`MessageTemplates`].
pub struct Messages {
    templates: MessageTemplates,
    registry: Handlebars<'static>,
}

impl Messages {
    pub fn new(templates: MessageTemplates) -> Result<Self, MessagesError> {
        for (name, template) in templates.named() {
            Template::compile(template).map_err(|e| MessagesError::InvalidTemplate {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Ok(Self { templates, registry })
    }

    /// Overrides from YAML; missing keys keep their English defaults.
    pub fn from_yaml(contents: &str) -> Result<Self, MessagesError> {
        let templates: MessageTemplates = serde_yaml_bw::from_str(contents)?;
        Self::new(templates)
    }

    pub fn load(path: &Path) -> Result<Self, MessagesError> {
        let contents = fs::read_to_string(path)?;
        let messages = Self::from_yaml(&contents)?;
        info!("Loaded message templates from {}", path.display());
        Ok(messages)
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    pub fn ask_case_number(&self, end_token: &str) -> Result<String, MessagesError> {
        self.render(&self.templates.ask_case_number, &serde_json::json!({ "end_token": end_token }))
    }

    pub fn select_party(&self, case: &str, labels: &[String]) -> Result<String, MessagesError> {
        self.render(
            &self.templates.select_party,
            &serde_json::json!({ "case": case, "count": labels.len(), "options": numbered(labels) }),
        )
    }

    pub fn select_event(&self, case: &str, party: &str, labels: &[String]) -> Result<String, MessagesError> {
        self.render(
            &self.templates.select_event,
            &serde_json::json!({
                "case": case,
                "party": party,
                "count": labels.len(),
                "options": numbered(labels),
            }),
        )
    }

    pub fn invalid_selection(&self, reply: &str, prompt: &str) -> Result<String, MessagesError> {
        self.render(
            &self.templates.invalid_selection,
            &serde_json::json!({ "reply": reply, "prompt": prompt }),
        )
    }

    pub fn report(&self, case: &str, party: &str, events: &[String]) -> Result<String, MessagesError> {
        self.render(
            &self.templates.report,
            &serde_json::json!({ "case": case, "party": party, "events": events }),
        )
    }

    pub fn no_parties(&self, case: &str) -> Result<String, MessagesError> {
        self.render(&self.templates.no_parties, &serde_json::json!({ "case": case }))
    }

    pub fn no_events(&self, case: &str, party: &str) -> Result<String, MessagesError> {
        self.render(&self.templates.no_events, &serde_json::json!({ "case": case, "party": party }))
    }

    fn render(&self, template: &str, data: &Value) -> Result<String, MessagesError> {
        let rendered = self
            .registry
            .render_template(template, data)
            .map_err(|e| MessagesError::Render(e.to_string()))?;
        Ok(rendered.trim_end().to_string())
    }
}

impl std::fmt::Debug for Messages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messages").field("templates", &self.templates).finish()
    }
}

impl Default for Messages {
    fn default() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { templates: MessageTemplates::default(), registry }
    }
}

impl MessageTemplates {
    fn named(&self) -> [(&'static str, &str); 7] {
        [
            ("ask_case_number", self.ask_case_number.as_str()),
            ("select_party", self.select_party.as_str()),
            ("select_event", self.select_event.as_str()),
            ("invalid_selection", self.invalid_selection.as_str()),
            ("report", self.report.as_str()),
            ("no_parties", self.no_parties.as_str()),
            ("no_events", self.no_events.as_str()),
        ]
    }
}

fn numbered(labels: &[String]) -> Vec<Value> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| serde_json::json!({ "number": i + 1, "label": label }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_templates_compile() {
        let messages = Messages::new(MessageTemplates::default()).unwrap();
        assert_eq!(messages.templates(), &MessageTemplates::default());
    }

    #[test]
    fn test_select_party_lists_numbered_options() {
        let messages = Messages::default();
        let text = messages
            .select_party("CF-2016-644", &["Jane Doe".to_string(), "John Roe".to_string()])
            .unwrap();
        assert!(text.starts_with("We found 2 parties on case CF-2016-644."));
        assert!(text.contains("\n1. Jane Doe\n2. John Roe"));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn test_no_html_escaping() {
        let messages = Messages::default();
        let text = messages.invalid_selection("<7>", "Pick one").unwrap();
        assert_eq!(text, "Sorry, \"<7>\" is not one of the options.\nPick one");
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let messages = Messages::from_yaml("no_parties: \"Nothing for {{case}}.\"\n").unwrap();
        assert_eq!(messages.no_parties("A-1").unwrap(), "Nothing for A-1.");
        assert_eq!(messages.templates().report, MessageTemplates::default().report);
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let err = Messages::from_yaml("report: \"{{#each events}}unclosed\"\n").unwrap_err();
        assert!(matches!(err, MessagesError::InvalidTemplate { ref name, .. } if name == "report"));
    }

    #[test]
    fn test_report_lists_events() {
        let messages = Messages::default();
        let text = messages
            .report("CF-2016-644", "Jane Doe", &["2026-11-02 Arraignment".to_string()])
            .unwrap();
        assert_eq!(
            text,
            "Case CF-2016-644, Jane Doe:\n- 2026-11-02 Arraignment\nThank you for using courtbot."
        );
    }
}
