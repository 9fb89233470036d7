use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub api_bind_address: String,
    pub fcm_send_url: String,
    pub fcm_server_key: String,
    pub identity_api_url: String,
    pub identity_api_key: String,
    pub webhook_secret: String,
    pub retention_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            fcm_send_url: env::var("FCM_SEND_URL")
                .context("FCM_SEND_URL must be set (v1 messages:send endpoint)")?,
            fcm_server_key: env::var("FCM_SERVER_KEY").context("FCM_SERVER_KEY must be set")?,
            identity_api_url: env::var("IDENTITY_API_URL")
                .context("IDENTITY_API_URL must be set")?,
            identity_api_key: env::var("IDENTITY_API_KEY")
                .context("IDENTITY_API_KEY must be set")?,
            webhook_secret: env::var("WEBHOOK_SECRET").context("WEBHOOK_SECRET must be set")?,
            retention_days: env::var("NOTIFICATION_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }
}
