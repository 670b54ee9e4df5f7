//! kms: KMS command-line client
//!
//! Commands:
//!   seal --node <uuid>      - seal a passphrase via kmsd
//!   unseal --node <uuid>    - unseal an envelope via kmsd
//!   gen-key --output <path> - write a fresh random key file for kmsd
//!   config show             - display the effective kmsd configuration

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tonic::transport::Channel;

use kms_core::config::KmsConfig;
use kms_core::proto::{kms_service_client::KmsServiceClient, Request};
use kms_crypto::{ENVELOPE_SIZE, PASSPHRASE_SIZE};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "kms", version, about = "KMS passphrase seal/unseal client")]
struct Cli {
    /// Path to kmsd config.toml (used by `config show`)
    #[arg(
        long,
        short = 'c',
        env = "KMS_CONFIG",
        default_value = "/etc/kms/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a passphrase; writes the envelope
    Seal(RpcArgs),

    /// Unseal an envelope; writes the passphrase
    ///
    /// A wrong node or damaged envelope yields random bytes, not an error.
    Unseal(RpcArgs),

    /// Write a new random 256-bit key file
    #[command(name = "gen-key")]
    GenKey {
        /// Destination key file
        #[arg(long, short = 'o')]
        output: PathBuf,
        /// Key file encoding
        #[arg(long, default_value = "raw")]
        format: KeyFileFormat,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct RpcArgs {
    /// kmsd gRPC endpoint
    #[arg(long, short = 'e', env = "KMS_ENDPOINT", default_value = "http://127.0.0.1:4050")]
    endpoint: String,
    /// Node UUID the key is resolved for
    #[arg(long, short = 'n')]
    node: String,
    /// Input file ("-" for stdin)
    #[arg(long, short = 'i', default_value = "-")]
    input: PathBuf,
    /// Output file ("-" for stdout)
    #[arg(long, short = 'o', default_value = "-")]
    output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyFileFormat {
    Raw,
    Base64,
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    Seal,
    Unseal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Seal(args) => cmd_rpc(Operation::Seal, &args).await,
        Commands::Unseal(args) => cmd_rpc(Operation::Unseal, &args).await,
        Commands::GenKey {
            output,
            format,
            force,
        } => cmd_gen_key(&output, format, force),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&cli.config),
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── `kms seal` / `kms unseal` ─────────────────────────────────────────────────

async fn cmd_rpc(op: Operation, args: &RpcArgs) -> Result<()> {
    let data = read_input(&args.input)?;
    check_input_len(op, &data)?;

    let mut client = connect(&args.endpoint).await?;
    let request = Request {
        node_uuid: args.node.clone(),
        data,
    };

    let response = match op {
        Operation::Seal => client.seal(request).await.context("Seal RPC failed")?,
        Operation::Unseal => client.unseal(request).await.context("Unseal RPC failed")?,
    }
    .into_inner();

    tracing::debug!(node_uuid = %args.node, bytes = response.data.len(), ?op, "rpc complete");
    write_output(&args.output, &response.data)
}

fn check_input_len(op: Operation, data: &[u8]) -> Result<()> {
    let expected = match op {
        Operation::Seal => PASSPHRASE_SIZE,
        Operation::Unseal => ENVELOPE_SIZE,
    };
    if data.len() != expected {
        bail!(
            "incorrect data length: got {} bytes, expected {expected}",
            data.len()
        );
    }
    Ok(())
}

async fn connect(endpoint: &str) -> Result<KmsServiceClient<Channel>> {
    KmsServiceClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("connecting to kmsd at {endpoint}"))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(data).context("writing stdout")?;
        stdout.flush().context("flushing stdout")
    } else {
        write_private(path, data, true)
    }
}

/// Write `data` to `path`, readable by the owner only on unix.
///
/// Without `overwrite` an existing file is left alone and an error returned.
fn write_private(path: &Path, data: &[u8], overwrite: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            bail!("{} already exists (use --force to overwrite)", path.display())
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("opening {}", path.display())))
        }
    };
    // `mode` only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions on {}", path.display()))?;
    }
    file.write_all(data)
        .with_context(|| format!("writing {}", path.display()))
}

// ── `kms gen-key` ─────────────────────────────────────────────────────────────

fn cmd_gen_key(output: &Path, format: KeyFileFormat, force: bool) -> Result<()> {
    let key = kms_crypto::generate_key().context("generating key")?;
    let contents = match format {
        KeyFileFormat::Raw => key.as_bytes().to_vec(),
        KeyFileFormat::Base64 => {
            let mut text = base64::engine::general_purpose::STANDARD.encode(key.as_bytes());
            text.push('\n');
            text.into_bytes()
        }
    };
    write_private(output, &contents, force)?;

    println!("wrote {:?} key to {}", format, output.display());
    Ok(())
}

// ── `kms config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = KmsConfig::load(config_path)?;
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(&config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kms_core::config::KeyFormat;
    use tempfile::TempDir;

    #[test]
    fn test_check_input_len() {
        assert!(check_input_len(Operation::Seal, &[0u8; PASSPHRASE_SIZE]).is_ok());
        assert!(check_input_len(Operation::Seal, &[0u8; 64]).is_err());
        assert!(check_input_len(Operation::Unseal, &[0u8; ENVELOPE_SIZE]).is_ok());
        assert!(check_input_len(Operation::Unseal, &[]).is_err());
    }

    #[test]
    fn test_gen_key_raw() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key");

        cmd_gen_key(&path, KeyFileFormat::Raw, false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
    }

    #[test]
    fn test_gen_key_base64_is_loadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.b64");

        cmd_gen_key(&path, KeyFileFormat::Base64, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .unwrap();
        assert_eq!(decoded.len(), 32);

        // the daemon-side format enum spells it the same way
        let parsed: KmsConfig = toml::from_str("[keys]\nkey_format = \"base64\"\n").unwrap();
        assert_eq!(parsed.keys.key_format, KeyFormat::Base64);
    }

    #[test]
    fn test_gen_key_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key");
        std::fs::write(&path, b"existing").unwrap();

        assert!(cmd_gen_key(&path, KeyFileFormat::Raw, false).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");

        cmd_gen_key(&path, KeyFileFormat::Raw, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);
    }

    #[test]
    fn test_gen_key_refusal_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key");
        cmd_gen_key(&path, KeyFileFormat::Raw, false).unwrap();
        let first = std::fs::read(&path).unwrap();

        let err = cmd_gen_key(&path, KeyFileFormat::Base64, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[cfg(unix)]
    #[test]
    fn test_gen_key_force_tightens_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key");
        std::fs::write(&path, b"old key material").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        cmd_gen_key(&path, KeyFileFormat::Raw, true).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "mode {mode:o} is readable by others");
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("passphrase");
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_output(&path, &[9u8; PASSPHRASE_SIZE]).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
        assert_eq!(std::fs::read(&path).unwrap(), vec![9u8; PASSPHRASE_SIZE]);
    }

    #[test]
    fn test_cli_parses_seal() {
        let cli = Cli::try_parse_from(["kms", "seal", "--node", "abcd", "-i", "pass.bin"]).unwrap();
        match cli.command {
            Commands::Seal(args) => {
                assert_eq!(args.node, "abcd");
                assert_eq!(args.input, PathBuf::from("pass.bin"));
                assert_eq!(args.output, PathBuf::from("-"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
