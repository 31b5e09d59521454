use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courtbot_channel::{ChannelAdapter, NonReplyMessage};
use tracing::{debug, warn};

/// Known channel identifiers plus the out-of-band notification broadcast.
///
/// Cloning is cheap; all clones share the same lists.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<Vec<String>>>,
    non_reply_subscribers: Arc<Mutex<Vec<Arc<dyn ChannelAdapter>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicates are kept.
    pub fn register_channel(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(channel = %name, "channel registered");
        lock(&self.channels).push(name);
    }

    pub fn channels(&self) -> Vec<String> {
        lock(&self.channels).clone()
    }

    /// Receive every notification passed to [`ChannelRegistry::send_non_reply`].
    pub fn subscribe_non_reply(&self, adapter: Arc<dyn ChannelAdapter>) {
        lock(&self.non_reply_subscribers).push(adapter);
    }

    /// Broadcast `msg` to every subscriber and return how many delivered it.
    ///
    /// Failing adapters are logged and skipped.
    pub async fn send_non_reply(&self, msg: NonReplyMessage) -> usize {
        let subscribers = lock(&self.non_reply_subscribers).clone();
        let mut delivered = 0;
        for adapter in subscribers {
            match adapter.send_non_reply(&msg).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    channel = %adapter.communication_type(),
                    "non-reply delivery failed: {}", e
                ),
            }
        }
        debug!(communication_type = %msg.communication_type, delivered, "non-reply message sent");
        delivered
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .field("non_reply_subscribers", &lock(&self.non_reply_subscribers).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
