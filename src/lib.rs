pub mod aggregate;
pub mod bus;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logger;
pub mod provider;

pub use aggregate::{AggregateRecord, Aggregated, ErrorMode, aggregate, get_case_parties, get_case_party_events};
pub use bus::{ProviderBus, Query, ResultCollector};
pub use courtbot_channel::{ChannelAdapter, ChannelError, LogLevel, NonReplyMessage};
pub use error::{CourtbotError, ErrorSettings, ErrorType, Rejection};
