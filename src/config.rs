//! Command line and environment configuration.
//!
//! Every option has a default so the crawler runs without flags. `Config::validate`
//! turns the raw options into the [`Settings`] the rest of the crate works with.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{Error, Result, CHECKPOINT_EVERY, NUMBER_URL, SATURATION_THRESHOLD, STREET_URL};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "strassen-scrap",
    about = "Collects every street name and house number from two autocomplete endpoints"
)]
pub struct Config {
    /// Street-name autocomplete endpoint
    #[arg(long, env = "STRASSEN_STREET_URL", default_value = STREET_URL)]
    pub street_url: String,

    /// House-number autocomplete endpoint
    #[arg(long, env = "STRASSEN_NUMBER_URL", default_value = NUMBER_URL)]
    pub number_url: String,

    /// Directory holding the JSON result and checkpoint files
    #[arg(long, env = "STRASSEN_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Maximum number of suggestions the endpoints return per query
    #[arg(long, env = "STRASSEN_THRESHOLD", default_value_t = SATURATION_THRESHOLD)]
    pub threshold: usize,

    /// Save progress after this many streets got their house numbers
    #[arg(long, env = "STRASSEN_CHECKPOINT_EVERY", default_value_t = CHECKPOINT_EVERY)]
    pub checkpoint_every: usize,

    /// Queries allowed in flight at once
    #[arg(long, env = "STRASSEN_MAX_IN_FLIGHT", default_value_t = 4)]
    pub max_in_flight: usize,

    /// Attempts per query before its subtree counts as failed
    #[arg(long, env = "STRASSEN_RETRIES", default_value_t = 4)]
    pub retries: u32,

    /// First retry delay (ms)
    #[arg(long, default_value_t = 500)]
    pub backoff_initial_ms: u64,

    /// Upper bound for the retry delay (ms)
    #[arg(long, default_value_t = 8000)]
    pub backoff_max_ms: u64,

    /// Per-request timeout (s)
    #[arg(long, env = "STRASSEN_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Query every letter combination, ignoring the German spelling heuristic
    #[arg(long, default_value = "false")]
    pub exhaustive: bool,
}

/// How a failing query is repeated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial: Duration::from_millis(500),
            max: Duration::from_millis(8000),
            multiplier: 2.0,
        }
    }
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub street_url: String,
    pub number_url: String,
    pub data_dir: PathBuf,
    pub threshold: usize,
    pub checkpoint_every: usize,
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub prune: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            street_url: STREET_URL.into(),
            number_url: NUMBER_URL.into(),
            data_dir: PathBuf::from("."),
            threshold: SATURATION_THRESHOLD,
            checkpoint_every: CHECKPOINT_EVERY,
            max_in_flight: 4,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            prune: true,
        }
    }
}

impl Config {
    pub fn validate(self) -> Result<Settings> {
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(Error::InvalidConfig(
                "--backoff-max-ms must not be below --backoff-initial-ms".into(),
            ));
        }

        let settings = Settings {
            street_url: self.street_url,
            number_url: self.number_url,
            data_dir: self.data_dir,
            threshold: self.threshold,
            checkpoint_every: self.checkpoint_every,
            max_in_flight: self.max_in_flight,
            retry: RetryPolicy {
                attempts: self.retries,
                initial: Duration::from_millis(self.backoff_initial_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                multiplier: 2.0,
            },
            timeout: Duration::from_secs(self.timeout_secs),
            prune: !self.exhaustive,
        };
        settings.check()?;
        Ok(settings)
    }
}

impl Settings {
    /// Rejects values that would stall or crash a crawl.
    pub fn check(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Error::InvalidConfig("--threshold must be at least 1".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(Error::InvalidConfig(
                "--checkpoint-every must be at least 1".into(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidConfig("--max-in-flight must be at least 1".into()));
        }
        if self.retry.attempts == 0 {
            return Err(Error::InvalidConfig("--retries must be at least 1".into()));
        }
        Ok(())
    }
}
