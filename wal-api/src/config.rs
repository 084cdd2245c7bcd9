//! Process configuration (SPEC_FULL.md §10.3). `envconfig`-derived,
//! following `capture::config::Config`/`hook_worker::config::Config`'s
//! shape: flat fields with `#[envconfig(nested = true)]` for grouped
//! settings, durations read as milliseconds through a newtype.

use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3400")]
    pub port: u16,

    /// Namespace policy store. Absent means "run against the bundled
    /// in-memory store" (no Postgres available), mirroring `capture`'s
    /// `print_sink` escape hatch for running without a real backend.
    pub database_url: Option<String>,

    #[envconfig(default = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    pub kafka_hosts: Option<String>,

    /// `AWS_REGION` itself is read directly by `aws-config`'s
    /// `load_from_env` inside `SqsProducer::new`; only the queue-url
    /// prefix is this process's own concern.
    pub sqs_queue_url_prefix: Option<String>,

    /// Comma-separated static API-key allowlist, the out-of-scope
    /// admin/ACL collaborator's stand-in for local runs and tests.
    #[envconfig(default = "")]
    pub valid_api_keys: CommaSeparated,

    #[envconfig(default = "1048576")]
    pub wal_max_message_size: usize,

    #[envconfig(default = "86400")]
    pub wal_max_delay_seconds: u64,

    #[envconfig(default = "30000")]
    pub wal_transaction_timeout_ms: EnvMsDuration,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

/// `VALID_API_KEYS=key1,key2,key3` parsed once at startup.
#[derive(Debug, Clone, Default)]
pub struct CommaSeparated(pub Vec<String>);

impl FromStr for CommaSeparated {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }
}
