//! Configuration knobs (spec.md §6, §5).
//!
//! Loaded the way the teacher loads its server config: a TOML file merged
//! with environment variables and `-O key=value` style overrides via
//! `figment`. Global mutable state (a process-wide flag, a static config
//! property) is deliberately not used anywhere in this workspace — every
//! constructor that needs configuration takes a [`TransportConfig`] or
//! [`ClusterConfig`] value explicitly (spec.md §9 Design Notes).

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Knobs governing the FDSU transport (spec.md §5, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// `TIMEOUT_PER_RECEIVE`
    pub timeout_per_receive_ms: u64,
    /// `TIMEOUT_RETRY_LIMIT`
    pub timeout_retry_limit: u32,
    /// `DELAY_PER_SEND`
    pub delay_per_send_ms: u64,
    /// `INTER_SEND_INTERVAL_NS`
    pub inter_send_interval_ns: u64,
    /// Whether the downloader should verify retrieved bytes against a
    /// second, independent read (used only by callers that wire in a
    /// comparison path; the core downloader does not do this itself).
    pub compare_download: bool,
    /// Whether callers should render a progress bar while downloading.
    pub progress_bar: bool,
    /// Number of boards to service in parallel for a single job's
    /// download/upload session.
    pub parallel_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_per_receive_ms: 2000,
            timeout_retry_limit: 15,
            delay_per_send_ms: 10,
            inter_send_interval_ns: 60_000,
            compare_download: false,
            progress_bar: false,
            parallel_size: 1,
        }
    }
}

impl TransportConfig {
    pub fn timeout_per_receive(&self) -> Duration {
        Duration::from_millis(self.timeout_per_receive_ms)
    }

    pub fn delay_per_send(&self) -> Duration {
        Duration::from_millis(self.delay_per_send_ms)
    }

    pub fn inter_send_interval(&self) -> Duration {
        Duration::from_nanos(self.inter_send_interval_ns)
    }
}

/// Knobs governing board power changes and quota (spec.md §5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// BMP settle delay after powering a board on.
    pub on_delay_secs: u64,
    /// BMP settle delay after powering a board off.
    pub off_delay_secs: u64,
    /// Default quota (seconds * boards) applied to a machine when a group
    /// has none configured. `None` means unlimited.
    pub default_quota: Option<u64>,
    /// Bounded retry count for a transient `BmpDriver` failure before the
    /// owning job is destroyed.
    pub bmp_retry_limit: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            on_delay_secs: 20,
            off_delay_secs: 30,
            default_quota: None,
            bmp_retry_limit: 3,
        }
    }
}

impl ClusterConfig {
    pub fn on_delay(&self) -> Duration {
        Duration::from_secs(self.on_delay_secs)
    }

    pub fn off_delay(&self) -> Duration {
        Duration::from_secs(self.off_delay_secs)
    }
}

/// Top-level configuration: the union of everything a running process
/// needs, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Config {
    /// Load from an optional TOML file, then layer environment variables
    /// prefixed `SPALLOC_`, matching the teacher's figment layering in
    /// `main::args::update`.
    pub fn load(path: Option<&std::path::Path>) -> figment::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("SPALLOC_").split("_"));
        figment.extract()
    }
}
