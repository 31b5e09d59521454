use std::sync::Arc;

use courtbot::{
    ProviderBus,
    bus::{RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS},
    channel::{ChannelRegistry, ConsoleChannel},
    conversation::{Conversation, ConversationState, Messages},
    provider::{FixtureProvider, register_provider},
};
use serde_json::json;
use tokio::sync::mpsc;

const FIXTURE: &str = r#"
cases:
  CF-2016-644:
    parties:
      - id: "1"
        name: "Jane Doe"
        events:
          - date: "2026-11-02"
            time: "09:00"
            description: "Arraignment"
            location: "Courtroom 4"
          - date: "2026-12-14"
            description: "Sentencing"
      - id: "2"
        name: "John Roe"
"#;

fn fixture_bus() -> ProviderBus {
    let bus = ProviderBus::new();
    register_provider(&bus, Arc::new(FixtureProvider::from_yaml(FIXTURE).unwrap()));
    bus
}

#[tokio::test]
async fn zero_parties_and_one_error_ends_with_a_single_apology() {
    let bus = ProviderBus::new();
    bus.subscribe(RETRIEVE_PARTIES, |_, c| c.reject("timeout"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut conversation =
        Conversation::new("console", bus, Arc::new(Messages::default())).with_reply_listener(tx);

    conversation.parse("CF-2016-644", "tty").await.unwrap();
    drop(conversation);

    let mut prompts = Vec::new();
    while let Some(event) = rx.recv().await {
        prompts.push(event);
    }
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].prompt.contains("could not find any information for case CF-2016-644"));
    assert_eq!(prompts[0].session.state(), ConversationState::Idle);
    assert!(prompts[0].session.parties().is_empty());
}

#[tokio::test]
async fn fixture_walkthrough_reports_one_event() {
    let mut conversation = Conversation::new("console", fixture_bus(), Arc::new(Messages::default()));

    let prompt = conversation.parse("cf-2016-644", "tty").await.unwrap().unwrap();
    assert!(prompt.contains("1. Jane Doe\n2. John Roe"));

    let prompt = conversation.submit_reply("Jane Doe").await.unwrap().unwrap();
    assert!(prompt.contains("1. 2026-11-02 09:00 Arraignment at Courtroom 4"));
    assert!(prompt.contains("2. 2026-12-14 Sentencing"));

    let report = conversation.submit_reply("1").await.unwrap().unwrap();
    assert_eq!(
        report,
        "Case cf-2016-644, Jane Doe:\n- 2026-11-02 09:00 Arraignment at Courtroom 4\nThank you for using courtbot."
    );
    assert_eq!(conversation.state(), ConversationState::Idle);
    assert_eq!(conversation.session().party(), Some(&json!({"id": "1", "name": "Jane Doe"})));
}

#[tokio::test]
async fn providers_from_several_sources_are_merged() {
    let bus = fixture_bus();
    bus.subscribe(RETRIEVE_PARTY_EVENTS, |query, c| {
        if query.party_id.as_deref() == Some("1") {
            c.resolve(json!({"date": "2027-01-10", "description": "Status hearing"}));
        }
    });
    bus.subscribe(RETRIEVE_PARTY_EVENTS, |_, c| c.reject("county system offline"));

    let mut conversation = Conversation::new("console", bus, Arc::new(Messages::default()));
    conversation.parse("CF-2016-644", "tty").await.unwrap();
    let prompt = conversation.submit_reply("1").await.unwrap().unwrap();

    assert!(prompt.contains("Jane Doe has 3 upcoming event(s)"));
    assert_eq!(conversation.session().events().len(), 3);
}

#[tokio::test]
async fn console_channel_over_fixtures() {
    let registry = ChannelRegistry::new();
    let console = Arc::new(ConsoleChannel::new(None, Vec::new()));
    console.register(&registry);

    let input: &[u8] = b"\nCF-2016-644\n7\n2\n";
    let session = console
        .run(input, fixture_bus(), Arc::new(Messages::default()))
        .await
        .unwrap();

    assert_eq!(session.state(), ConversationState::Idle);
    let printed = console
        .with_output(|out| String::from_utf8_lossy(out).into_owned())
        .await;
    assert!(printed.contains("Sorry, \"7\" is not one of the options."));
    assert!(printed.ends_with("could not find any upcoming events for John Roe on case CF-2016-644.\n"));
}
