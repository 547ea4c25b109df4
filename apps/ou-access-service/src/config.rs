use std::env;
use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_STATE_OBJECT: &str = "client_requests.json";
const DEFAULT_SWITCH_LIMIT: u32 = 3;
const DEFAULT_DURATION_MINUTES: u32 = 30;
const DEFAULT_GOOGLE_DIRECTORY_API_BASE_URL: &str = "https://admin.googleapis.com";
const DEFAULT_GOOGLE_SCHEDULER_API_BASE_URL: &str = "https://cloudscheduler.googleapis.com";
const DEFAULT_GOOGLE_STORAGE_API_BASE_URL: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub api_key: String,
    pub admin_email: String,
    pub user_email: String,
    pub unrestricted_ou: String,
    pub restricted_ou: String,
    pub project_id: String,
    pub location: String,
    pub bucket_name: String,
    pub state_object: String,
    pub switch_limit: u32,
    pub duration_minutes: u32,
    pub public_base_url: String,
    pub google_access_token: String,
    pub directory_api_base_url: String,
    pub scheduler_api_base_url: String,
    pub storage_api_base_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {name}")]
    MissingVar { name: &'static str },
    #[error("invalid OU_ACCESS_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid {name} value '{value}': {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("{name} must be at least 1")]
    OutOfRange { name: &'static str },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("OU_ACCESS_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter = env::var("OU_ACCESS_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let api_key = required_var("OU_ACCESS_API_KEY")?;
        let admin_email = required_var("OU_ACCESS_ADMIN_EMAIL")?;
        let user_email = required_var("OU_ACCESS_USER_EMAIL")?;
        let unrestricted_ou = required_var("OU_ACCESS_UNRESTRICTED_OU")?;
        let restricted_ou = required_var("OU_ACCESS_RESTRICTED_OU")?;
        let project_id = required_var("OU_ACCESS_PROJECT_ID")?;
        let location = required_var("OU_ACCESS_LOCATION")?;
        let bucket_name = required_var("OU_ACCESS_BUCKET_NAME")?;

        let state_object = env::var("OU_ACCESS_STATE_OBJECT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_STATE_OBJECT.to_string());

        let switch_limit = positive_var("OU_ACCESS_SWITCH_LIMIT", DEFAULT_SWITCH_LIMIT)?;
        let duration_minutes =
            positive_var("OU_ACCESS_DURATION_MINUTES", DEFAULT_DURATION_MINUTES)?;

        let public_base_url = required_var("OU_ACCESS_PUBLIC_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        let google_access_token = required_var("GOOGLE_ACCESS_TOKEN")?;

        let directory_api_base_url = base_url_var(
            "GOOGLE_DIRECTORY_API_BASE_URL",
            DEFAULT_GOOGLE_DIRECTORY_API_BASE_URL,
        );
        let scheduler_api_base_url = base_url_var(
            "GOOGLE_SCHEDULER_API_BASE_URL",
            DEFAULT_GOOGLE_SCHEDULER_API_BASE_URL,
        );
        let storage_api_base_url = base_url_var(
            "GOOGLE_STORAGE_API_BASE_URL",
            DEFAULT_GOOGLE_STORAGE_API_BASE_URL,
        );

        Ok(Self {
            bind_addr,
            log_filter,
            api_key,
            admin_email,
            user_email,
            unrestricted_ou,
            restricted_ou,
            project_id,
            location,
            bucket_name,
            state_object,
            switch_limit,
            duration_minutes,
            public_base_url,
            google_access_token,
            directory_api_base_url,
            scheduler_api_base_url,
            storage_api_base_url,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar { name })
}

fn positive_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let Some(raw) = env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(default);
    };

    let value = raw
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            name,
            value: raw,
            source,
        })?;
    if value == 0 {
        return Err(ConfigError::OutOfRange { name });
    }
    Ok(value)
}

fn base_url_var(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
impl Config {
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            api_key: "test-api-key".to_string(),
            admin_email: "admin@example.com".to_string(),
            user_email: "subject@example.com".to_string(),
            unrestricted_ou: "/Unrestricted".to_string(),
            restricted_ou: "/Restricted".to_string(),
            project_id: "test-project".to_string(),
            location: "us-central1".to_string(),
            bucket_name: "test-bucket".to_string(),
            state_object: DEFAULT_STATE_OBJECT.to_string(),
            switch_limit: DEFAULT_SWITCH_LIMIT,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            public_base_url: "https://ou-access.example.com".to_string(),
            google_access_token: "test-token".to_string(),
            directory_api_base_url: DEFAULT_GOOGLE_DIRECTORY_API_BASE_URL.to_string(),
            scheduler_api_base_url: DEFAULT_GOOGLE_SCHEDULER_API_BASE_URL.to_string(),
            storage_api_base_url: DEFAULT_GOOGLE_STORAGE_API_BASE_URL.to_string(),
        }
    }
}
