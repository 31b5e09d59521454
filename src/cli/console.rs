use std::sync::Arc;

use clap::Args;
use courtbot::{
    LogLevel,
    channel::{ChannelRegistry, ConsoleChannel},
    logger::init_tracing,
};
use tokio::io::{self, BufReader};
use tracing::info;

use super::CliContext;

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// YAML case fixtures (defaults to COURTBOT_FIXTURES)
    #[arg(long)]
    pub fixtures: Option<std::path::PathBuf>,

    /// YAML message template overrides (defaults to COURTBOT_MESSAGES)
    #[arg(long)]
    pub messages: Option<std::path::PathBuf>,

    /// Suffix for the communication type, e.g. `2` gives `console2`
    #[arg(long)]
    pub name: Option<String>,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub async fn execute(args: ConsoleArgs, context: &CliContext) -> anyhow::Result<()> {
    let log_level = args
        .log_level
        .as_deref()
        .map(LogLevel::from)
        .unwrap_or(context.settings.log_level);
    let _telemetry = init_tracing(&context.root, log_level)?;

    let bus = context.provider_bus(args.fixtures)?;
    let messages = Arc::new(context.messages(args.messages)?);

    let registry = ChannelRegistry::new();
    let console = Arc::new(ConsoleChannel::new(args.name.as_deref(), io::stdout()));
    console.register(&registry);
    info!(channels = ?registry.channels(), "console channel ready");

    let sessions = console.serve(BufReader::new(io::stdin()), bus, messages).await?;
    info!(sessions = sessions.len(), "console closed");
    Ok(())
}
