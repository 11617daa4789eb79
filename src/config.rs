use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::clock::LocalZone;
use crate::reminder::parse_clock;

pub const DEFAULT_API_URL: &str = "https://calendarapi-yk7l.onrender.com/api/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // API
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,

    // Alerts
    pub alert_webhook_url: Option<String>,

    // Calendar
    /// `local`, an IANA name, or a fixed offset.
    pub tz: String,
    pub reminder_offset_minutes: u32,
    pub reminder_clock: String,

    // Persistence
    pub state_path: String,

    // Logging
    pub log_json: bool,
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|x| x.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            health_timeout_secs: 4,
            alert_webhook_url: None,
            tz: "local".to_string(),
            reminder_offset_minutes: 60,
            reminder_clock: "09:00".to_string(),
            state_path: "./calnotes-session.json".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        // API
        let api_base_url = env_string("CALNOTES_API_URL").unwrap_or(defaults.api_base_url);
        let request_timeout_secs =
            env_parse::<u64>("CALNOTES_TIMEOUT_SECS").unwrap_or(defaults.request_timeout_secs);
        let health_timeout_secs = env_parse::<u64>("CALNOTES_HEALTH_TIMEOUT_SECS")
            .unwrap_or(defaults.health_timeout_secs);

        // Alerts
        let alert_webhook_url = env_string("CALNOTES_ALERT_WEBHOOK_URL");

        // Calendar
        let tz = env_string("CALNOTES_TZ").unwrap_or(defaults.tz);
        let reminder_offset_minutes = env_parse::<u32>("CALNOTES_REMINDER_OFFSET_MINUTES")
            .unwrap_or(defaults.reminder_offset_minutes);
        let reminder_clock =
            env_string("CALNOTES_REMINDER_CLOCK").unwrap_or(defaults.reminder_clock);

        let state_path = env_string("CALNOTES_STATE_PATH").unwrap_or(defaults.state_path);
        let log_json = env_bool("CALNOTES_LOG_JSON", defaults.log_json);

        let cfg = Self {
            api_base_url,
            request_timeout_secs,
            health_timeout_secs,
            alert_webhook_url,
            tz,
            reminder_offset_minutes,
            reminder_clock,
            state_path,
            log_json,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://")
            || self.api_base_url.starts_with("https://"))
        {
            return Err(anyhow!("CALNOTES_API_URL must be http(s): {}", self.api_base_url));
        }
        if self.request_timeout_secs == 0 || self.health_timeout_secs == 0 {
            return Err(anyhow!("timeouts must be greater than zero"));
        }
        self.zone()?;
        parse_clock(&self.reminder_clock)?;
        Ok(())
    }

    pub fn zone(&self) -> Result<LocalZone> {
        LocalZone::parse(&self.tz)
    }
}
