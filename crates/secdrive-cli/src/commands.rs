//! Subcommand handlers

use crate::Command;
use anyhow::Context;
use bytes::Bytes;
use secdrive_client::{Config, DirectorySink, EncryptedClient, SessionFileStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Resolved global options
#[derive(Debug)]
pub struct Settings {
    pub endpoint: String,
    pub token: Option<String>,
    pub user_id: String,
    pub session: PathBuf,
    pub timeout: Duration,
}

impl Settings {
    fn config(&self) -> Config {
        let config = Config::new(&self.endpoint).with_timeout(self.timeout);
        match &self.token {
            Some(token) => config.with_token(token),
            None => config,
        }
    }
}

/// Session file location when none is given: the per-user runtime
/// directory, or the local data directory where there is none
pub fn default_session_path() -> anyhow::Result<PathBuf> {
    let base = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .context("no per-user directory for the session file; pass --session")?;
    Ok(base.join("secdrive").join("session.json"))
}

pub async fn run(settings: Settings, command: Command) -> anyhow::Result<()> {
    let storage = Arc::new(
        SessionFileStorage::open(&settings.session)
            .await
            .with_context(|| format!("opening session {}", settings.session.display()))?,
    );

    let client = EncryptedClient::new(settings.config(), storage.clone())?;
    let user = settings.user_id.as_str();

    match command {
        Command::Encrypt { input, output } => {
            let plaintext = read(&input).await?;
            let file = client.encrypt_file(user, &plaintext).await?;
            write(&output, &file.blob).await?;
            println!("{}", file.encrypted_key);
        }
        Command::Decrypt {
            input,
            output,
            encrypted_key,
        } => {
            let blob = read(&input).await?;
            let plaintext = client.decrypt_file(user, &encrypted_key, &blob).await?;
            write(&output, &plaintext).await?;
        }
        Command::Upload {
            input,
            content_type,
        } => {
            let file_name = file_name_of(&input)?;
            let plaintext = read(&input).await?;
            let receipt = client
                .upload_file(user, &file_name, &plaintext, content_type.as_deref())
                .await?;
            println!("file_id:       {}", receipt.file_id);
            println!("s3_key:        {}", receipt.s3_key);
            println!("encrypted_key: {}", receipt.encrypted_key);
            println!("size:          {}", receipt.blob_size);
        }
        Command::Download {
            url,
            encrypted_key,
            file_name,
            dir,
        } => {
            let sink = DirectorySink::new(&dir);
            client
                .download_file(user, &url, &file_name, &encrypted_key, &sink)
                .await?;
            println!("{}", dir.join(&file_name).display());
        }
        Command::Delete { file_id } => {
            let deleted = client.delete_file(user, &file_id).await?;
            println!(
                "{}",
                deleted.message.unwrap_or_else(|| format!("Deleted {}", deleted.file_id))
            );
        }
        Command::ClearCache => {
            client.clear_cache().await?;
            println!("Key cache cleared");
        }
        Command::Logout => {
            storage.destroy().await?;
            println!("Session ended");
        }
    }

    Ok(())
}

async fn read(path: &Path) -> anyhow::Result<Bytes> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Bytes::from(bytes))
}

async fn write(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

fn file_name_of(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}
