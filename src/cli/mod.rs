use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

pub mod config;
pub mod console;
pub mod lookup;

use config::ConfigArgs;
use console::ConsoleArgs;
use lookup::LookupArgs;

use courtbot::{
    bus::{ProviderBus, RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS, error_topic},
    config::{ConfigManager, Settings},
    conversation::Messages,
    provider::{FixtureProvider, register_provider},
};

#[derive(Parser, Debug)]
#[command(name = "courtbot", about = "Court date lookups over any channel", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Talk to courtbot in this terminal
    Console(ConsoleArgs),

    /// Run one aggregation and print the result as JSON
    Lookup(LookupArgs),

    /// Read and write the `.env` configuration
    Config(ConfigArgs),
}

#[derive(Clone, Debug)]
pub struct CliContext {
    pub root: PathBuf,
    pub config_manager: ConfigManager,
    pub settings: Settings,
}

impl CliContext {
    pub async fn new(root: PathBuf, config_manager: ConfigManager) -> Self {
        let settings = Settings::load(&config_manager, &root).await;
        Self { root, config_manager, settings }
    }

    /// A bus with the fixture provider registered, when there is one.
    /// Provider failures are logged from the `<topic>-error` broadcast.
    pub fn provider_bus(&self, fixtures: Option<PathBuf>) -> anyhow::Result<ProviderBus> {
        let bus = ProviderBus::new();
        match fixtures.or_else(|| self.settings.fixtures.clone()) {
            Some(path) => {
                let provider = FixtureProvider::load(&path)
                    .with_context(|| format!("loading fixtures from {}", path.display()))?;
                register_provider(&bus, Arc::new(provider));
            }
            None => warn!("no fixtures configured; every lookup will come back empty"),
        }

        for topic in [RETRIEVE_PARTIES, RETRIEVE_PARTY_EVENTS] {
            bus.subscribe_errors(topic, move |errors| {
                for err in errors {
                    error!(topic = %error_topic(topic), case = %err.case(), "{}", err);
                }
            });
        }
        Ok(bus)
    }

    pub fn messages(&self, path: Option<PathBuf>) -> anyhow::Result<Messages> {
        match path.or_else(|| self.settings.messages.clone()) {
            Some(path) => Messages::load(&path)
                .with_context(|| format!("loading message templates from {}", path.display())),
            None => {
                info!("using built-in message templates");
                Ok(Messages::default())
            }
        }
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Console(args) => console::execute(args, context).await,
        Commands::Lookup(args) => lookup::execute(args, context).await,
        Commands::Config(args) => config::execute(args, context).await,
    }
}
