//! SecDrive CLI - client-side encrypted file storage

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "secdrive")]
#[command(about = "Client-side encrypted file storage for SecDrive")]
#[command(version)]
struct Args {
    /// API endpoint (KMS and upload routes)
    #[arg(long, default_value = "http://localhost:3000", env = "SECDRIVE_ENDPOINT")]
    endpoint: String,

    /// Identity token sent as a bearer token
    #[arg(long, env = "SECDRIVE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User the keys belong to
    #[arg(short, long, env = "SECDRIVE_USER")]
    user: String,

    /// Session file holding cached keys (defaults to a per-user directory)
    #[arg(long, env = "SECDRIVE_SESSION")]
    session: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", env = "SECDRIVE_TIMEOUT")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long, env = "SECDRIVE_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt a local file; prints the wrapped key
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Where to write the encrypted blob
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decrypt a local blob
    Decrypt {
        /// Encrypted blob
        input: PathBuf,
        /// Where to write the plaintext
        #[arg(short, long)]
        output: PathBuf,
        /// Wrapped key the blob was encrypted under
        #[arg(short = 'k', long)]
        encrypted_key: String,
    },

    /// Encrypt and upload a file
    Upload {
        /// File to upload
        input: PathBuf,
        /// Content type recorded with the upload
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download and decrypt a file
    Download {
        /// URL of the encrypted blob
        url: String,
        /// Wrapped key stored with the file
        #[arg(short = 'k', long)]
        encrypted_key: String,
        /// Name to save the file under
        #[arg(short = 'n', long)]
        file_name: String,
        /// Directory to save into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Delete an uploaded file
    Delete {
        /// Id returned when the file was uploaded
        file_id: String,
    },

    /// Remove every cached key from the session
    ClearCache,

    /// End the session and delete the session file
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("secdrive_cli={0},secdrive_client={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = commands::Settings {
        endpoint: args.endpoint,
        token: args.token,
        user_id: args.user,
        session: match args.session {
            Some(path) => path,
            None => commands::default_session_path()?,
        },
        timeout: std::time::Duration::from_secs(args.timeout),
    };

    tracing::debug!("Using session file {}", settings.session.display());
    commands::run(settings, args.command).await
}
