//! Controller configuration from the command line and environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::retry::RetryConfig;
use crate::telemetry::LogFormat;

/// Errors raised while validating controller arguments
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A numeric setting is out of range
    #[error("invalid value for {flag}: {reason}")]
    InvalidValue {
        /// The offending flag
        flag: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Only one of the webhook certificate and key was given
    #[error("--webhook-cert and --webhook-key must be set together")]
    IncompleteTls,
}

/// Controller mode arguments
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Maximum number of reconciliations running at once per controller
    #[arg(long, env = "ORG_OPERATOR_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Time budget of one reconciliation attempt, in seconds
    #[arg(long, env = "ORG_OPERATOR_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Requeue delay after the first failure, in milliseconds
    #[arg(long, env = "ORG_OPERATOR_BACKOFF_INITIAL_MS", default_value_t = 500)]
    pub backoff_initial_ms: u64,

    /// Upper bound of the requeue delay, in seconds
    #[arg(long, env = "ORG_OPERATOR_BACKOFF_MAX_SECS", default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Install or update the CRDs before starting the controllers
    #[arg(long, env = "ORG_OPERATOR_INSTALL_CRDS")]
    pub install_crds: bool,

    /// Listen address of the admission webhook
    #[arg(long, env = "ORG_OPERATOR_WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    pub webhook_addr: SocketAddr,

    /// PEM certificate of the admission webhook
    #[arg(long, env = "ORG_OPERATOR_WEBHOOK_CERT")]
    pub webhook_cert: Option<PathBuf>,

    /// PEM private key of the admission webhook
    #[arg(long, env = "ORG_OPERATOR_WEBHOOK_KEY")]
    pub webhook_key: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "ORG_OPERATOR_LOG_JSON")]
    pub log_json: bool,
}

/// TLS material of the admission webhook
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookTls {
    /// PEM certificate path
    pub cert: PathBuf,
    /// PEM private key path
    pub key: PathBuf,
}

/// Validated controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Worker pool size per controller
    pub concurrency: u16,
    /// Time budget of one reconciliation attempt
    pub reconcile_timeout: Duration,
    /// Requeue policy for failed reconciliations
    pub backoff: RetryConfig,
    /// Whether to install CRDs at startup
    pub install_crds: bool,
    /// Webhook listen address
    pub webhook_addr: SocketAddr,
    /// Webhook TLS material; the webhook only runs when set
    pub webhook_tls: Option<WebhookTls>,
    /// Log output format
    pub log_format: LogFormat,
}

impl TryFrom<ControllerArgs> for ControllerConfig {
    type Error = ConfigError;

    fn try_from(args: ControllerArgs) -> Result<Self, Self::Error> {
        if args.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                flag: "--concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if args.reconcile_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                flag: "--reconcile-timeout-secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let initial_delay = Duration::from_millis(args.backoff_initial_ms);
        let max_delay = Duration::from_secs(args.backoff_max_secs);
        if initial_delay.is_zero() || initial_delay > max_delay {
            return Err(ConfigError::InvalidValue {
                flag: "--backoff-initial-ms",
                reason: format!(
                    "must be positive and at most --backoff-max-secs ({}s)",
                    args.backoff_max_secs
                ),
            });
        }

        let webhook_tls = match (args.webhook_cert, args.webhook_key) {
            (Some(cert), Some(key)) => Some(WebhookTls { cert, key }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            concurrency: args.concurrency,
            reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs),
            backoff: RetryConfig {
                max_attempts: 0,
                initial_delay,
                max_delay,
                backoff_multiplier: 2.0,
            },
            install_crds: args.install_crds,
            webhook_addr: args.webhook_addr,
            webhook_tls,
            log_format: LogFormat::from_json_flag(args.log_json),
        })
    }
}
