pub mod adapter;
pub mod message;

pub use adapter::{ChannelAdapter, ChannelError};
pub use message::{LogLevel, NonReplyMessage};
