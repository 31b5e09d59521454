use anyhow::bail;
use clap::{Args, Subcommand};
use courtbot::config::{ConfigManager, ConfigManagerType};

use super::CliContext;

const PREFIX: &str = "COURTBOT_";

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print one value
    Get { key: String },
    /// Add or update a value in `<root>/.env`
    Set { key: String, value: String },
    /// Remove a value from `<root>/.env`
    Delete { key: String },
    /// Print every COURTBOT_* value
    List,
}

pub async fn execute(args: ConfigArgs, context: &CliContext) -> anyhow::Result<()> {
    let config = &context.config_manager;
    match args.command {
        ConfigCommands::Get { key } => match config.get(&key).await {
            Some(value) => println!("{value}"),
            None => bail!("`{key}` is not set"),
        },
        ConfigCommands::Set { key, value } => match config.0.set(&key, &value).await {
            Ok(()) => println!("✅ Config `{key}` saved."),
            Err(e) => bail!("❌ Config `{key}` could not be saved: {e}"),
        },
        ConfigCommands::Delete { key } => {
            config.0.del(&key).await;
            println!("✅ Config `{key}` deleted.");
        }
        ConfigCommands::List => {
            for (key, value) in courtbot_entries(config).await {
                println!("{key}={value}");
            }
        }
    }
    Ok(())
}

/// The COURTBOT_* entries, sorted by key.
async fn courtbot_entries(config: &ConfigManager) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = config
        .0
        .as_vec()
        .await
        .into_iter()
        .filter(|(key, _)| key.starts_with(PREFIX))
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtbot::config::EnvConfigManager;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_set_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        let context = CliContext::new(
            PathBuf::from(dir.path()),
            ConfigManager(EnvConfigManager::new(env_file.clone())),
        )
        .await;

        let set = |key: &str, value: &str| ConfigArgs {
            command: ConfigCommands::Set { key: key.to_string(), value: value.to_string() },
        };
        execute(set("COURTBOT_CLI_TEST_B", "2"), &context).await.unwrap();
        execute(set("COURTBOT_CLI_TEST_A", "1"), &context).await.unwrap();

        let entries = courtbot_entries(&context.config_manager).await;
        let ours: Vec<_> = entries
            .iter()
            .filter(|(k, _)| k.starts_with("COURTBOT_CLI_TEST_"))
            .cloned()
            .collect();
        assert_eq!(
            ours,
            vec![
                ("COURTBOT_CLI_TEST_A".to_string(), "1".to_string()),
                ("COURTBOT_CLI_TEST_B".to_string(), "2".to_string()),
            ]
        );
        assert!(std::fs::read_to_string(&env_file).unwrap().contains("COURTBOT_CLI_TEST_A=1"));

        for key in ["COURTBOT_CLI_TEST_A", "COURTBOT_CLI_TEST_B"] {
            let args = ConfigArgs { command: ConfigCommands::Delete { key: key.to_string() } };
            execute(args, &context).await.unwrap();
        }
        let get = ConfigArgs { command: ConfigCommands::Get { key: "COURTBOT_CLI_TEST_A".into() } };
        assert!(execute(get, &context).await.is_err());
    }
}
