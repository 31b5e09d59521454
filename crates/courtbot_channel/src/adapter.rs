use async_trait::async_trait;
use thiserror::Error;

use crate::message::NonReplyMessage;

/// The one trait channel adapters implement.
///
/// Conversation turns flow through the conversation engine directly; this
/// trait only covers what the host needs to address an adapter from outside
/// a conversation.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The communication type this adapter registers under,
    /// e.g. `console` or `sms`.
    fn communication_type(&self) -> String;

    /// Deliver an out-of-band notification.
    /// Adapters must ignore messages addressed to another communication type
    /// and return `Ok(false)` for them.
    async fn send_non_reply(&self, msg: &NonReplyMessage) -> Result<bool, ChannelError>;
}

/// Errors that a ChannelAdapter implementation can return.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Reading from or writing to the underlying transport failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport rejected the message.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The adapter returned an unspecified failure.
    #[error("channel error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for ChannelError {
    fn from(err: anyhow::Error) -> ChannelError {
        ChannelError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAdapter {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn communication_type(&self) -> String {
            "recording".to_string()
        }

        async fn send_non_reply(&self, msg: &NonReplyMessage) -> Result<bool, ChannelError> {
            if !msg.is_for(&self.communication_type()) {
                return Ok(false);
            }
            self.sent.lock().unwrap().push(msg.msg.clone());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_adapter_filters_on_communication_type() {
        let adapter = RecordingAdapter::default();
        assert!(adapter.send_non_reply(&NonReplyMessage::new("recording", "hi")).await.unwrap());
        assert!(!adapter.send_non_reply(&NonReplyMessage::new("sms", "nope")).await.unwrap());
        assert_eq!(*adapter.sent.lock().unwrap(), vec!["hi".to_string()]);
    }

    #[test]
    fn test_error_display() {
        let err = ChannelError::Delivery("carrier rejected".into());
        assert_eq!(err.to_string(), "delivery failed: carrier rejected");
        let err: ChannelError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, ChannelError::Other(ref m) if m == "boom"));
    }
}
