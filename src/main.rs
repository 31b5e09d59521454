use clap::Parser;
use courtbot::config::{ConfigManager, EnvConfigManager, resolve_root_dir};

mod cli;

use cli::{Cli, CliContext};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = resolve_root_dir();
    let config_manager = ConfigManager(EnvConfigManager::new(root.join(".env")));
    let context = CliContext::new(root, config_manager).await;

    cli::execute(&context, cli.command).await
}
