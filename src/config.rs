use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Remote spreadsheet script endpoint
    pub script_url: String,
    pub script_user_id: String,
    pub script_password: String,
    pub remote_timeout_secs: Option<u64>,

    // Bootstrap administrator, always allowed to sign in as a social worker
    pub admin_email: String,
    pub admin_password_hash: Option<String>,
    pub authorized_worker_emails: Vec<String>,

    /// Offset of the local time zone courses are scheduled in.
    pub session_utc_offset_minutes: i32,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
}

fn var_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{key} is not a valid value"))
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let remote_timeout_secs = match env::var("REMOTE_TIMEOUT_SECS") {
            Ok(v) => Some(v.parse().context("REMOTE_TIMEOUT_SECS is not a number")?),
            Err(_) => None,
        };

        let admin_email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "lemon70431@gfm.org.tw".to_string());

        let authorized_worker_emails = env::var("AUTHORIZED_WORKER_EMAILS")
            .map(|list| split_emails(&list))
            .unwrap_or_else(|_| vec![admin_email.to_lowercase()]);

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: var_or("ACCESS_TOKEN_TTL", "900")?, // default 15 min
            refresh_token_ttl: var_or("REFRESH_TOKEN_TTL", "604800")?, // default 7 days

            script_url: required("SCRIPT_URL")?,
            script_user_id: required("SCRIPT_USER_ID")?,
            script_password: required("SCRIPT_PASSWORD")?,
            remote_timeout_secs,

            admin_email,
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH").ok(),
            authorized_worker_emails,

            session_utc_offset_minutes: var_or("SESSION_UTC_OFFSET_MINUTES", "480")?, // Asia/Taipei

            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", "60")?,
            rate_register_per_min: var_or("RATE_REGISTER_PER_MIN", "30")?,
            rate_refresh_per_min: var_or("RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
        })
    }

    /// Fixed offset used to turn the wall clock into course-local time.
    pub fn session_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.session_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn split_emails(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config(script_url: &str) -> Config {
    Config {
        server_addr: "127.0.0.1:0".into(),
        jwt_secret: "test-secret".into(),
        access_token_ttl: 900,
        refresh_token_ttl: 3600,
        script_url: script_url.into(),
        script_user_id: "service@careerpassport.org".into(),
        script_password: "service-pass".into(),
        remote_timeout_secs: None,
        admin_email: "lemon70431@gfm.org.tw".into(),
        admin_password_hash: None,
        authorized_worker_emails: vec!["chang@socialwork.org".into()],
        session_utc_offset_minutes: 480,
        rate_login_per_min: 60,
        rate_register_per_min: 30,
        rate_refresh_per_min: 30,
        rate_protected_per_min: 1000,
        api_prefix: "/api".into(),
    }
}
