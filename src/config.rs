use anyhow::{Result, bail};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::classify::DEFAULT_KEYWORDS;
use crate::youtube::{DEFAULT_API_BASE, LIKED_PLAYLIST_ID, MAX_PAGE_SIZE};

#[derive(Parser, Debug)]
#[command(name = "likesync")]
#[command(about = "Syncs liked YouTube videos into a history table", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Run one sync and exit instead of serving HTTP.
    #[arg(long)]
    pub once: bool,

    /// `github` behaves like `--once`.
    #[arg(long, env = "RUN_MODE")]
    pub run_mode: Option<String>,
}

impl Cli {
    pub fn run_once(&self) -> bool {
        self.once
            || self
                .run_mode
                .as_deref()
                .is_some_and(|mode| mode.eq_ignore_ascii_case("github"))
    }
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".likesync")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_database")]
    database: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

impl Default for App {
    fn default() -> Self {
        App {
            database: default_database(),
            port: default_port(),
            turso_url: None,
            turso_auth_token: None,
            sync_interval_seconds: default_sync_interval(),
        }
    }
}

fn default_database() -> String {
    "likesync.db".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_sync_interval() -> u64 {
    60
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct YouTube {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    pub refresh_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_playlist_id")]
    pub liked_playlist_id: String,
    #[serde(default = "default_batch_size")]
    pub page_size: u32,
    #[serde(default = "default_batch_size")]
    pub details_batch_size: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_playlist_id() -> String {
    LIKED_PLAYLIST_ID.to_string()
}

fn default_batch_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct History {
    #[serde(default)]
    pub dedupe: bool,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub youtube: YouTube,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub history: History,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let mut config: Config = serde_yaml::from_str(&yaml_with_env)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    fn normalize(&mut self) {
        self.youtube.page_size = self.youtube.page_size.clamp(1, MAX_PAGE_SIZE);
        self.youtube.details_batch_size = self.youtube.details_batch_size.clamp(1, MAX_PAGE_SIZE);
        self.classifier.keywords = self
            .classifier
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        // `${VAR}` with an unset VAR leaves an empty string behind
        if self.app.turso_url.as_deref() == Some("") {
            self.app.turso_url = None;
        }
        if self.app.turso_auth_token.as_deref() == Some("") {
            self.app.turso_auth_token = None;
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("youtube.client_id", &self.youtube.client_id),
            ("youtube.client_secret", &self.youtube.client_secret),
            ("youtube.refresh_token", &self.youtube.refresh_token),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                bail!("missing required config value: {}", name);
            }
        }
        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
youtube:
  client_id: id
  client_secret: secret
  refresh_token: refresh
"#;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.app.get_port(), 3000);
        assert_eq!(cfg.app.get_db(), "likesync.db");
        assert_eq!(cfg.youtube.liked_playlist_id, "LL");
        assert_eq!(cfg.youtube.page_size, 50);
        assert_eq!(cfg.youtube.details_batch_size, 50);
        assert_eq!(cfg.classifier.keywords.len(), DEFAULT_KEYWORDS.len());
        assert!(!cfg.history.dedupe);
    }

    #[test]
    fn test_batch_sizes_are_clamped() {
        let yaml = format!("{}  page_size: 500\n  details_batch_size: 0\n", MINIMAL);
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.youtube.page_size, 50);
        assert_eq!(cfg.youtube.details_batch_size, 1);
    }

    #[test]
    fn test_missing_secret_fails() {
        let yaml = r#"
youtube:
  client_id: id
  client_secret: ""
  refresh_token: refresh
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("youtube.client_secret"));
    }

    #[test]
    fn test_env_substitution_with_default() {
        let out = Config::substitute_env_vars("port: ${LIKESYNC_TEST_SURELY_UNSET_PORT:-8080}").unwrap();
        assert_eq!(out, "port: 8080");
    }

    #[test]
    fn test_unset_turso_values_become_none() {
        let yaml = format!(
            "app:\n  turso_url: \"${{LIKESYNC_TEST_UNSET_URL}}\"\n  turso_auth_token: \"\"\n{}",
            MINIMAL
        );
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert!(cfg.app.turso_url.is_none());
        assert!(cfg.app.turso_auth_token.is_none());
    }

    #[test]
    fn test_keywords_are_normalized() {
        let yaml = format!("{}classifier:\n  keywords: [\"Chess\", \"\", \"GO\"]\n", MINIMAL);
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.classifier.keywords, vec!["chess".to_string(), "go".to_string()]);
    }

    #[test]
    fn test_run_once_modes() {
        let cli = Cli::parse_from(["likesync", "--once"]);
        assert!(cli.run_once());
        let cli = Cli::parse_from(["likesync", "--run-mode", "GitHub"]);
        assert!(cli.run_once());
        let cli = Cli::parse_from(["likesync", "--run-mode", "local"]);
        assert!(!cli.run_once());
    }
}
