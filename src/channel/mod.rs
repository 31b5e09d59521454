/*
┌──────────────────────────────┐   register_channel / subscribe_non_reply
│       ChannelRegistry        │◀───────────────────────────────┐
│  channels: [console, sms..]  │                                │
│  send_non_reply ──▶ adapters │        ┌───────────────────────┴──┐
└──────────────────────────────┘        │  ConsoleChannel (adapter)│
                                        │  reply ──▶ Conversation  │
                                        │  prompt ◀── Conversation │
                                        └──────────────────────────┘
*/
pub mod console;
pub mod registry;

pub use console::ConsoleChannel;
pub use registry::ChannelRegistry;
