use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of `GET /usage_today`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UsageStatus {
    pub count: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
}

/// Payload of `GET /credits_status`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CreditsStatus {
    pub balance: u64,
    pub max_balance: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_per_day: Option<u64>,
}

/// Payload of `GET /health`; only the mode string matters here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct HealthProbe {
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MeterKind {
    Usage,
    Credits,
}

impl MeterKind {
    pub const ALL: [MeterKind; 2] = [MeterKind::Usage, MeterKind::Credits];

    pub fn as_str(self) -> &'static str {
        match self {
            MeterKind::Usage => "usage",
            MeterKind::Credits => "credits",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Free,
    Paid,
}

impl Mode {
    /// Interpret the `/health` mode string. Anything but a paid marker is free.
    pub fn from_probe(mode: Option<&str>) -> Self {
        match mode {
            Some("paid_credits") | Some("paid") => Mode::Paid,
            _ => Mode::Free,
        }
    }

    /// The meter whose panel is shown in this mode.
    pub fn active_meter(self) -> MeterKind {
        match self {
            Mode::Free => MeterKind::Usage,
            Mode::Paid => MeterKind::Credits,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeSource {
    Health,
    CreditsFallback,
    Default,
}

/// Outcome of one mode probe. `credits` holds the status fetched by the
/// fallback probe, if that is what decided the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: Mode,
    pub source: ModeSource,
    pub credits: Option<CreditsStatus>,
}
