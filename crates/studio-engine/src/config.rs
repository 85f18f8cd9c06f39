use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use studio_contracts::events::EVENTS_FILE_NAME;

use crate::genai::DEFAULT_API_BASE;
use crate::poller::PollSettings;

pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
pub const DEFAULT_STORAGE_DIR: &str = "./storage";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub video_model: String,
    pub storage_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub events_path: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            poll_interval: PollSettings::default().interval,
            poll_timeout: PollSettings::default().max_wait,
            events_path: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        let config = Self {
            api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            api_base: get("GENAI_API_BASE").unwrap_or(defaults.api_base),
            image_model: get("GOOGLE_IMAGEN_MODEL").unwrap_or(defaults.image_model),
            video_model: get("GOOGLE_VEO_MODEL").unwrap_or(defaults.video_model),
            storage_dir: get("STORAGE_DIR").map(PathBuf::from).unwrap_or(defaults.storage_dir),
            poll_interval: seconds(get("VIDEO_POLL_INTERVAL_SECS"), "VIDEO_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval),
            poll_timeout: seconds(get("VIDEO_POLL_TIMEOUT_SECS"), "VIDEO_POLL_TIMEOUT_SECS")?
                .unwrap_or(defaults.poll_timeout),
            events_path: get("STUDIO_EVENTS_PATH").map(PathBuf::from),
            http_timeout: defaults.http_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("VIDEO_POLL_INTERVAL_SECS must be greater than zero");
        }
        if self.poll_timeout < self.poll_interval {
            bail!(
                "VIDEO_POLL_TIMEOUT_SECS ({}s) must be at least the poll interval ({}s)",
                self.poll_timeout.as_secs(),
                self.poll_interval.as_secs()
            );
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("GOOGLE_API_KEY not set (GEMINI_API_KEY is also accepted)")
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            max_wait: self.poll_timeout,
        }
    }

    pub fn events_path(&self) -> PathBuf {
        self.events_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join(EVENTS_FILE_NAME))
    }
}

fn seconds(raw: Option<String>, key: &str) -> Result<Option<Duration>> {
    raw.map(|value| {
        value
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| format!("{key} must be a whole number of seconds (got {value:?})"))
    })
    .transpose()
}
