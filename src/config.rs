use std::{
    env, fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use courtbot_channel::LogLevel;
use tracing::{info, warn};

pub const ROOT_ENV: &str = "COURTBOT_ROOT";
pub const FIXTURES_KEY: &str = "COURTBOT_FIXTURES";
pub const MESSAGES_KEY: &str = "COURTBOT_MESSAGES";
pub const LOG_LEVEL_KEY: &str = "COURTBOT_LOG_LEVEL";

/// A key/value configuration source.
#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn as_vec(&self) -> Vec<(String, String)> {
        let mut config = vec![];
        for key in self.keys().await {
            if let Some(value) = self.get(&key).await {
                config.push((key, value));
            }
        }
        config
    }
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn del(&self, key: &str);
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    /// Blank values count as unset.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await.filter(|v| !v.trim().is_empty())
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Process environment, seeded from a `.env` file when one exists.
/// Writes go to both the environment and the file.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => info!("Loaded .env from {}", env_file.display()),
                Err(e) => warn!("could not parse {}: {}", env_file.display(), e),
            }
        }
        Box::new(Self { env_file })
    }

    fn rewrite_env_file(&self, key: &str, value: Option<&str>) -> std::io::Result<()> {
        let content = fs::read_to_string(&self.env_file).unwrap_or_default();
        let mut found = false;
        let mut lines: Vec<String> = content
            .lines()
            .filter_map(|line| match line.split_once('=') {
                Some((k, _)) if k.trim() == key => {
                    found = true;
                    value.map(|v| format!("{key}={v}"))
                }
                _ => Some(line.to_string()),
            })
            .collect();
        if let (false, Some(v)) = (found, value) {
            lines.push(format!("{key}={v}"));
        }
        fs::write(&self.env_file, lines.join("\n"))
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        unsafe {
            env::set_var(key, value);
        };
        self.rewrite_env_file(key, Some(value)).map_err(|e| e.to_string())
    }

    async fn del(&self, key: &str) {
        unsafe {
            env::remove_var(key);
        };
        if self.env_file.exists() {
            if let Err(e) = self.rewrite_env_file(key, None) {
                warn!("could not update {}: {}", self.env_file.display(), e);
            }
        }
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("EnvConfigManager({})", self.env_file.display())
    }
}

/// Runtime settings after configuration has been read.
/// Relative paths are resolved against the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub fixtures: Option<PathBuf>,
    pub messages: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl Settings {
    pub async fn load(config: &ConfigManager, root: &Path) -> Self {
        let path = |value: String| {
            let path = PathBuf::from(value);
            if path.is_absolute() { path } else { root.join(path) }
        };
        Self {
            root: root.to_path_buf(),
            fixtures: config.get(FIXTURES_KEY).await.map(path),
            messages: config.get(MESSAGES_KEY).await.map(path),
            log_level: config
                .get(LOG_LEVEL_KEY)
                .await
                .map(|level| LogLevel::from(level.as_str()))
                .unwrap_or_default(),
        }
    }
}

/// `COURTBOT_ROOT`, or the current directory.
pub fn resolve_root_dir() -> PathBuf {
    env::var(ROOT_ENV)
        .map(PathBuf::from)
        .or_else(|_| env::current_dir())
        .unwrap_or_else(|_| PathBuf::from("."))
}
