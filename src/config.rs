use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

pub const USERNAME_VAR: &str = "WEBIN_USERNAME";
pub const PASSWORD_VAR: &str = "WEBIN_PASSWORD";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default = "default_auth_realms")]
    pub auth_realms: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            auth_realms: default_auth_realms(),
            timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Endpoints {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_samples_url")]
    pub samples_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            samples_url: default_samples_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<Config, ArchiveError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("bioarc.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ArchiveError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| ArchiveError::ConfigParse(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn resolve(
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ArchiveError> {
        let username = match username {
            Some(value) => value,
            None => env_credential(USERNAME_VAR)?,
        };
        let password = match password {
            Some(value) => value,
            None => env_credential(PASSWORD_VAR)?,
        };
        Ok(Self { username, password })
    }
}

fn env_credential(var: &str) -> Result<String, ArchiveError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ArchiveError::MissingCredentials(format!(
            "pass --username/--password or set {var}"
        ))),
    }
}

fn default_auth_url() -> String {
    "https://www.ebi.ac.uk/ena/submit/webin/auth/token".to_string()
}

fn default_samples_url() -> String {
    "https://www.ebi.ac.uk/biosamples/samples".to_string()
}

fn default_auth_realms() -> Vec<String> {
    vec!["ENA".to_string()]
}

fn default_base_delay_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_production_endpoints() {
        let config = Config::default();
        assert_eq!(
            config.endpoints.auth_url,
            "https://www.ebi.ac.uk/ena/submit/webin/auth/token"
        );
        assert_eq!(
            config.endpoints.samples_url,
            "https://www.ebi.ac.uk/biosamples/samples"
        );
        assert_eq!(config.auth_realms, vec!["ENA".to_string()]);
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"timeout_secs": 30, "retry": {"max_retries": 2}}"#).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(
            config.endpoints.samples_url,
            "https://www.ebi.ac.uk/biosamples/samples"
        );
    }
}
