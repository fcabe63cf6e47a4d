use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Runtime configuration for the meter poller.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub paid_mode: bool,
    /// Upgrade target as configured, possibly relative.
    pub upgrade_target: String,
    /// `upgrade_target` resolved against `base_url`.
    pub upgrade_url: String,
    pub poll_interval: Duration,
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
    pub show_usage: bool,
    pub show_timer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            paid_mode: false,
            upgrade_target: "/upgrade".to_string(),
            upgrade_url: format!("{}/upgrade", DEFAULT_BASE_URL),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout_secs: None,
            user_agent: default_user_agent(),
            show_usage: true,
            show_timer: true,
        }
    }
}

fn default_user_agent() -> String {
    format!("meter-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|s| parse_flag(&s))
        .unwrap_or(default)
}

/// Resolve `target` against `base`; absolute targets pass through.
pub fn resolve_upgrade_url(base: &str, target: &str) -> Result<String, String> {
    let base = Url::parse(base).map_err(|e| format!("Invalid base URL {}: {}", base, e))?;
    base.join(target)
        .map(|u| u.to_string())
        .map_err(|e| format!("Invalid upgrade URL {}: {}", target, e))
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - METER_BASE_URL (default: http://127.0.0.1:8000)
    /// - METER_PAID_MODE (default: 0)
    /// - METER_UPGRADE_URL (default: /upgrade, resolved against the base URL)
    /// - METER_POLL_INTERVAL_SECS (default: 60)
    /// - METER_HTTP_TIMEOUT_SECS (default: none)
    /// - METER_USER_AGENT (default: meter-sync/<version>)
    /// - METER_SHOW_USAGE / METER_SHOW_TIMER (default: 1)
    pub fn from_env() -> Result<Self, String> {
        let base_url = env::var("METER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let mut cfg = Self {
            paid_mode: env_flag("METER_PAID_MODE", false),
            poll_interval: Duration::from_secs(
                env::var("METER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            timeout_secs: env::var("METER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|n| *n > 0),
            user_agent: env::var("METER_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
            show_usage: env_flag("METER_SHOW_USAGE", true),
            show_timer: env_flag("METER_SHOW_TIMER", true),
            upgrade_target: env::var("METER_UPGRADE_URL").unwrap_or_else(|_| "/upgrade".to_string()),
            ..Self::default()
        };
        cfg.set_base_url(&base_url)?;
        Ok(cfg)
    }

    /// Replace the backend origin, re-resolving the upgrade target against it.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), String> {
        self.upgrade_url = resolve_upgrade_url(base_url, &self.upgrade_target)?;
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(())
    }
}
