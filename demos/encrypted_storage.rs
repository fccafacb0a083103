//! Client-side envelope encryption example
//!
//! This example demonstrates:
//! - Getting a per-user data key from the KMS
//! - Encrypting, uploading and confirming a file
//! - Downloading and decrypting it with the wrapped key
//! - Clearing the session key cache
//!
//! Run with: cargo run --example encrypted_storage

use secdrive_client::{Config, DirectorySink, EncryptedClient, SessionFileStorage};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("🔐 SecDrive - Client-Side Encryption Example\n");

    let endpoint =
        std::env::var("SECDRIVE_ENDPOINT").unwrap_or_else(|_| "http://localhost:3000".into());
    let config = Config::new(endpoint).with_token("your-id-token-here"); // Replace with actual token

    // Keys live in a session file until the session is destroyed
    let session = std::env::temp_dir().join("secdrive-example-session.json");
    let storage = Arc::new(SessionFileStorage::open(&session).await?);
    let client = EncryptedClient::new(config, storage.clone())?;

    // ==================== Encrypt Locally ====================

    println!("🔑 Encrypting with the active data key...");
    let file = client.encrypt_file("user-1", b"Hello, encrypted world!").await?;
    println!("   Blob size: {} bytes", file.blob.len());
    println!("   Wrapped key: {}", file.encrypted_key);

    let plaintext = client
        .decrypt_file("user-1", &file.encrypted_key, &file.blob)
        .await?;
    println!("   ✅ Round trip: {}", String::from_utf8_lossy(&plaintext));

    // ==================== Upload ====================

    println!("\n📤 Uploading encrypted file...");
    let report = serde_json::to_vec_pretty(&serde_json::json!({
        "quarter": "Q3",
        "revenue": 1_250_000,
    }))?;
    let receipt = client
        .upload_file("user-1", "report.json", &report, Some("application/json"))
        .await?;
    println!("   ✅ file_id={} s3_key={}", receipt.file_id, receipt.s3_key);
    println!("   📝 Only the wrapped key was sent to the server");

    // ==================== Download ====================

    if let Ok(url) = std::env::var("SECDRIVE_DOWNLOAD_URL") {
        println!("\n📥 Downloading and decrypting...");
        let sink = DirectorySink::new(std::env::temp_dir());
        client
            .download_file("user-1", &url, "report.json", &receipt.encrypted_key, &sink)
            .await?;
        println!("   ✅ Saved to {}", sink.root().join("report.json").display());
    }

    // ==================== Cleanup ====================

    client.clear_cache().await?;
    storage.destroy().await?;
    println!("\n🧹 Session keys cleared");

    Ok(())
}
