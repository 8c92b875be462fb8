// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Severity;

const ENV_PATH: &str = "CROWD_PULSE_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub scheduler: SchedulerSection,
    pub pipeline: PipelineSection,
    pub alerts: AlertsSection,
    pub classifier: ClassifierSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub fast_interval_secs: u64,
    pub slow_interval_secs: u64,
    pub jitter_frac: f64,
    pub backoff_cap_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            fast_interval_secs: 30,
            slow_interval_secs: 300,
            jitter_frac: 0.10,
            backoff_cap_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub fetch_timeout_secs: u64,
    pub classify_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            classify_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsSection {
    pub severity_floor: Severity,
    /// Optional alert webhook. Absent means broadcast-only.
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    pub webhook_retries: u8,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            severity_floor: Severity::High,
            webhook_url: None,
            webhook_timeout_secs: 5,
            webhook_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSection {
    pub urgent_keywords: Vec<String>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            urgent_keywords: ["crowd", "emergency", "accident", "stampede", "fire", "medical"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. Format is decided by extension, with a
    /// content fallback so a mislabeled file still parses.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
    }

    /// Load using env var + fallbacks:
    /// 1) $CROWD_PULSE_CONFIG
    /// 2) config/crowdpulse.toml
    /// 3) config/crowdpulse.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/crowdpulse.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/crowdpulse.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
        }
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
        serde_json::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.fetch_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.classify_timeout_secs)
    }
}
