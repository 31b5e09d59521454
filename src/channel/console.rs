use std::sync::Arc;

use async_trait::async_trait;
use courtbot_channel::{ChannelAdapter, ChannelError, NonReplyMessage};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::{debug, info};

use crate::{
    bus::ProviderBus,
    channel::ChannelRegistry,
    conversation::{Conversation, ConversationError, Messages, Session},
};

pub const CONSOLE: &str = "console";

/// Channel tag attached to every console reply.
pub const TTY: &str = "tty";

const IDLE_MENU: &str = "What would you like to do?\n1. Start a new registration\n2. Exit";

/// A terminal channel: one conversation at a time over a line-based reader
/// and a writer.
pub struct ConsoleChannel<W> {
    communication_type: String,
    output: Mutex<W>,
}

impl<W> ConsoleChannel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// `name` distinguishes several consoles, e.g. `2` gives `console2`.
    pub fn new(name: Option<&str>, output: W) -> Self {
        let communication_type = format!("{}{}", CONSOLE, name.unwrap_or_default());
        Self { communication_type, output: Mutex::new(output) }
    }

    /// Announce the channel and start listening for non-reply messages.
    pub fn register(self: &Arc<Self>, registry: &ChannelRegistry) {
        registry.register_channel(self.communication_type.clone());
        registry.subscribe_non_reply(self.clone());
    }

    /// Show the idle menu, run a conversation each time one is asked for,
    /// and return to the menu until the user exits or input runs out.
    /// Returns the sessions in the order they ended.
    pub async fn serve<R>(
        &self,
        mut input: R,
        bus: ProviderBus,
        messages: Arc<Messages>,
    ) -> Result<Vec<Session>, ChannelError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut sessions = Vec::new();
        let mut line = String::new();
        loop {
            self.write_line(IDLE_MENU).await?;
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                break;
            }
            match line.trim().to_lowercase().as_str() {
                "1" | "new" | "start" => {
                    let session = self.run(&mut input, bus.clone(), messages.clone()).await?;
                    sessions.push(session);
                }
                "2" | "exit" | "quit" => break,
                other => debug!(channel = %self.communication_type, choice = other, "unknown menu choice"),
            }
        }
        info!(channel = %self.communication_type, sessions = sessions.len(), "console closed");
        Ok(sessions)
    }

    /// Drive one conversation until it is idle, the user ends it, or input
    /// runs out. Returns the final session.
    pub async fn run<R>(
        &self,
        mut input: R,
        bus: ProviderBus,
        messages: Arc<Messages>,
    ) -> Result<Session, ChannelError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut conversation = Conversation::new(&self.communication_type, bus, messages.clone());
        let opening = messages
            .ask_case_number(conversation.end_token())
            .map_err(|e| ChannelError::Other(e.to_string()))?;
        self.write_line(&opening).await?;

        let mut line = String::new();
        while !conversation.is_finished() {
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                debug!(channel = %self.communication_type, "input closed");
                break;
            }

            match conversation.parse(&line, TTY).await {
                Ok(Some(prompt)) => self.write_line(&prompt).await?,
                Ok(None) | Err(ConversationError::Finished) => break,
                Err(e) => return Err(ChannelError::Other(e.to_string())),
            }
        }

        info!(
            channel = %self.communication_type,
            session = %conversation.session().id(),
            state = %conversation.state(),
            "console conversation closed"
        );
        Ok(conversation.session().clone())
    }

    /// Inspect the writer, e.g. to read back what was printed.
    pub async fn with_output<T>(&self, f: impl FnOnce(&W) -> T) -> T {
        f(&*self.output.lock().await)
    }

    async fn write_line(&self, text: &str) -> Result<(), ChannelError> {
        let mut output = self.output.lock().await;
        output.write_all(text.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W> ChannelAdapter for ConsoleChannel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn communication_type(&self) -> String {
        self.communication_type.clone()
    }

    async fn send_non_reply(&self, msg: &NonReplyMessage) -> Result<bool, ChannelError> {
        if !msg.is_for(&self.communication_type) {
            return Ok(false);
        }
        info!(channel = %self.communication_type, "non-reply message: {}", msg.msg);
        self.write_line(&msg.msg).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS},
        conversation::ConversationState,
    };
    use serde_json::json;

    fn bus() -> ProviderBus {
        let bus = ProviderBus::new();
        bus.subscribe(RETRIEVE_PARTIES, |_, c| c.resolve(json!([{"id": "1", "name": "Jane Doe"}])));
        bus.subscribe(RETRIEVE_PARTY_EVENTS, |_, c| {
            c.resolve(json!([{"date": "2026-11-02", "description": "Arraignment"}]))
        });
        bus
    }

    async fn printed(console: &ConsoleChannel<Vec<u8>>) -> String {
        console.with_output(|out| String::from_utf8_lossy(out).into_owned()).await
    }

    #[tokio::test]
    async fn test_console_walkthrough() {
        let console = ConsoleChannel::new(None, Vec::new());
        let input: &[u8] = b"CF-2016-644\n1\nall\n";

        let session = console.run(input, bus(), Arc::new(Messages::default())).await.unwrap();
        assert_eq!(session.state(), ConversationState::Idle);
        assert_eq!(session.channel_tag(), Some(TTY));

        let out = printed(&console).await;
        assert!(out.starts_with("Please reply with your case number, or END to stop.\n"));
        assert!(out.ends_with("- 2026-11-02 Arraignment\nThank you for using courtbot.\n"));
    }

    #[tokio::test]
    async fn test_console_end_and_eof() {
        let console = ConsoleChannel::new(Some("2"), Vec::new());
        let input: &[u8] = b"CF-2016-644\nEND\n1\n";
        let session = console.run(input, bus(), Arc::new(Messages::default())).await.unwrap();
        assert_eq!(session.state(), ConversationState::Idle);
        assert_eq!(session.communication_type(), "console2");

        let console = ConsoleChannel::new(None, Vec::new());
        let input: &[u8] = b"CF-2016-644\n";
        let session = console.run(input, bus(), Arc::new(Messages::default())).await.unwrap();
        assert_eq!(session.state(), ConversationState::AwaitingPartySelection);
    }

    #[tokio::test]
    async fn test_serve_returns_to_menu_until_exit() {
        let console = ConsoleChannel::new(None, Vec::new());
        let input: &[u8] = b"1\nCF-2016-644\nEND\nhelp\nnew\nCF-2016-644\n1\nall\nexit\n1\n";

        let sessions = console.serve(input, bus(), Arc::new(Messages::default())).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.state() == ConversationState::Idle));
        assert!(sessions[1].party().is_some());

        let out = printed(&console).await;
        assert_eq!(out.matches("What would you like to do?").count(), 4);
        assert!(out.ends_with("2. Exit\n"));
    }

    #[tokio::test]
    async fn test_serve_stops_at_end_of_input() {
        let console = ConsoleChannel::new(None, Vec::new());
        let input: &[u8] = b"1\nCF-2016-644\n";
        let sessions = console.serve(input, bus(), Arc::new(Messages::default())).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state(), ConversationState::AwaitingPartySelection);
    }

    #[tokio::test]
    async fn test_registered_console_prints_own_notifications() {
        let registry = ChannelRegistry::new();
        let console = Arc::new(ConsoleChannel::new(None, Vec::new()));
        console.register(&registry);
        assert_eq!(registry.channels(), vec!["console"]);

        assert_eq!(registry.send_non_reply(NonReplyMessage::new("sms", "not me")).await, 0);
        assert_eq!(registry.send_non_reply(NonReplyMessage::new("console", "Court is closed")).await, 1);
        assert_eq!(printed(&console).await, "Court is closed\n");
    }
}
