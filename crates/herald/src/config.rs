//! Runtime settings, read from flags or `HERALD_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use herald_platforms::AdapterMode;
use herald_scheduler::{
    DEFAULT_EXHAUSTION_POLICY, DEFAULT_MISSING_ID_POLICY, DEFAULT_WORKERS, ExhaustionPolicy,
    MissingIdPolicy, RetryPolicy, RunnerConfig, SchedulerConfig,
};

use crate::content::{DEFAULT_GENERATOR_MODEL, DEFAULT_GENERATOR_URL};

/// Longest accepted reconciliation lookahead (one year).
const MAX_LOOKAHEAD_SECS: u64 = 366 * 24 * 60 * 60;

/// Where documents are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// JSON documents under the data directory.
    File,
    /// In-process only; lost on exit.
    Memory,
}

/// What happens to a post whose publish retries run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExhaustionArg {
    LeavePending,
    MarkFailed,
}

impl From<ExhaustionArg> for ExhaustionPolicy {
    fn from(arg: ExhaustionArg) -> Self {
        match arg {
            ExhaustionArg::LeavePending => ExhaustionPolicy::LeavePending,
            ExhaustionArg::MarkFailed => ExhaustionPolicy::MarkFailed,
        }
    }
}

impl From<ExhaustionPolicy> for ExhaustionArg {
    fn from(policy: ExhaustionPolicy) -> Self {
        match policy {
            ExhaustionPolicy::LeavePending => ExhaustionArg::LeavePending,
            ExhaustionPolicy::MarkFailed => ExhaustionArg::MarkFailed,
        }
    }
}

/// How a publish without a platform post id counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MissingIdArg {
    Soft,
    Fatal,
}

impl From<MissingIdArg> for MissingIdPolicy {
    fn from(arg: MissingIdArg) -> Self {
        match arg {
            MissingIdArg::Soft => MissingIdPolicy::Soft,
            MissingIdArg::Fatal => MissingIdPolicy::Fatal,
        }
    }
}

impl From<MissingIdPolicy> for MissingIdArg {
    fn from(policy: MissingIdPolicy) -> Self {
        match policy {
            MissingIdPolicy::Soft => MissingIdArg::Soft,
            MissingIdPolicy::Fatal => MissingIdArg::Fatal,
        }
    }
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Data directory for the file store (default: platform data dir + /herald)
    #[arg(long, env = "HERALD_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Document store backend
    #[arg(long, env = "HERALD_STORE", value_enum, default_value_t = StoreBackend::File, global = true)]
    pub store: StoreBackend,

    /// Maximum tasks running at once
    #[arg(long, env = "HERALD_WORKERS", default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Seconds between reconciliation passes
    #[arg(long, env = "HERALD_RECONCILE_INTERVAL", default_value = "60", global = true)]
    pub reconcile_interval: u64,

    /// Reconcile posts due within this many seconds
    #[arg(long, env = "HERALD_RECONCILE_LOOKAHEAD", default_value = "300", global = true)]
    pub reconcile_lookahead: u64,

    /// Timeout in seconds for each token lookup and platform call
    #[arg(long, env = "HERALD_CALL_TIMEOUT", default_value = "30", global = true)]
    pub call_timeout: u64,

    /// Timeout in seconds for each store read or write during a run
    #[arg(long, env = "HERALD_STORE_TIMEOUT", default_value = "10", global = true)]
    pub store_timeout: u64,

    /// Platform adapter mode (stub or live)
    #[arg(long, env = "HERALD_ADAPTER_MODE", default_value = "stub", global = true)]
    pub adapter_mode: AdapterMode,

    /// Facebook Graph API base URL
    #[arg(long, env = "HERALD_FACEBOOK_GRAPH_URL", global = true)]
    pub facebook_graph_url: Option<String>,

    /// Instagram Graph API base URL
    #[arg(long, env = "HERALD_INSTAGRAM_GRAPH_URL", global = true)]
    pub instagram_graph_url: Option<String>,

    /// OpenAI-compatible API base URL for text generation
    #[arg(long, env = "HERALD_GENERATOR_URL", default_value = DEFAULT_GENERATOR_URL, global = true)]
    pub generator_url: String,

    /// Chat model for text generation
    #[arg(long, env = "HERALD_GENERATOR_MODEL", default_value = DEFAULT_GENERATOR_MODEL, global = true)]
    pub generator_model: String,

    /// API key for text generation; generation is disabled without one
    #[arg(long, env = "HERALD_GENERATOR_API_KEY", hide_env_values = true, global = true)]
    pub generator_api_key: Option<String>,

    /// Timeout in seconds for text generation requests
    #[arg(long, env = "HERALD_GENERATOR_TIMEOUT", default_value = "60", global = true)]
    pub generator_timeout: u64,

    /// Refresh stored analytics older than this many seconds
    #[arg(long, env = "HERALD_ANALYTICS_MAX_AGE", global = true)]
    pub analytics_max_age: Option<u64>,

    /// Outcome for posts whose publish retries are exhausted
    #[arg(long, env = "HERALD_EXHAUSTION_POLICY", value_enum, default_value_t = ExhaustionArg::from(DEFAULT_EXHAUSTION_POLICY), global = true)]
    pub exhaustion_policy: ExhaustionArg,

    /// Whether a publish without a platform id fails the post
    #[arg(long, env = "HERALD_MISSING_ID_POLICY", value_enum, default_value_t = MissingIdArg::from(DEFAULT_MISSING_ID_POLICY), global = true)]
    pub missing_id_policy: MissingIdArg,
}

impl Settings {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("herald")
        })
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            call_timeout: Duration::from_secs(self.call_timeout),
            store_timeout: Duration::from_secs(self.store_timeout),
            missing_id: self.missing_id_policy.into(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            publish_retry: RetryPolicy::PUBLISH,
            analytics_retry: RetryPolicy::ANALYTICS,
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval.max(1))
    }

    pub fn reconcile_lookahead(&self) -> chrono::Duration {
        let secs = self.reconcile_lookahead.min(MAX_LOOKAHEAD_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or_default())
    }

    pub fn analytics_max_age(&self) -> Option<chrono::Duration> {
        self.analytics_max_age
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout)
    }
}
