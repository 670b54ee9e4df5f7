//! kmsd: reference KMS daemon
//!
//! Usage:
//!   kmsd [--config /etc/kms/config.toml] [--listen :4050] [--key-path /etc/kms/key]
//!
//! Serves the kms.KMSService gRPC API (Seal/Unseal) over TCP.

mod daemon;
mod grpc;
mod key_store;
mod metrics;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kmsd", version, about = "KMS passphrase seal/unseal daemon")]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "KMS_CONFIG",
        default_value = "/etc/kms/config.toml"
    )]
    config: PathBuf,

    /// gRPC API endpoint (overrides server.listen)
    #[arg(long, alias = "kms-api-endpoint", env = "KMS_LISTEN")]
    listen: Option<String>,

    /// Encryption key path (overrides keys.key_path)
    #[arg(long, env = "KMS_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KMS_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "KMS_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "kmsd starting"
    );

    let mut config = kms_core::config::KmsConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = normalize_listen(&listen);
    }
    if let Some(key_path) = cli.key_path {
        config.keys.key_path = Some(key_path);
    }

    daemon::run(config).await
}

/// Accept Go-style ":4050" as shorthand for all interfaces.
fn normalize_listen(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
