//! End-to-end tests for SecDrive envelope encryption
//!
//! A single mock server plays every remote party: the KMS, the upload API
//! and the object store behind the presigned URLs. Files go through the
//! full upload and download paths and come back byte-identical.

use base64::Engine;
use rand::RngCore;
use secdrive_client::{
    ApiClient, Config, DirectorySink, EncryptedClient, HttpKmsClient, KeyCache, KeyStorage,
    MemoryKeyStorage, SessionFileStorage,
};
use secdrive_crypto::{FileCryptoEngine, SequentialIvProvider, IV_SIZE, TAG_SIZE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

/// KMS that issues a random key per call and remembers what it wrapped
#[derive(Clone, Default)]
struct FakeKms {
    wrapped: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    generated: Arc<AtomicUsize>,
    decrypted: Arc<AtomicUsize>,
}

struct Generate(FakeKms);
struct Decrypt(FakeKms);

impl Respond for Generate {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let user_id = body["user_id"].as_str().unwrap().to_string();

        let n = self.0.generated.fetch_add(1, Ordering::SeqCst);
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let encrypted_key = b64(format!("wrapped:{}:{}", user_id, n).as_bytes());

        self.0
            .wrapped
            .lock()
            .unwrap()
            .insert(encrypted_key.clone(), (user_id, key.clone()));

        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "plaintext_key": b64(&key),
            "encrypted_key": encrypted_key,
            "key_id": "arn:aws:kms:us-east-1:000000000000:key/test",
        }))
    }
}

impl Respond for Decrypt {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0.decrypted.fetch_add(1, Ordering::SeqCst);
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let user_id = body["user_id"].as_str().unwrap_or_default();
        let encrypted_key = body["encrypted_key"].as_str().unwrap_or_default();

        match self.0.wrapped.lock().unwrap().get(encrypted_key) {
            Some((owner, key)) if owner == user_id => {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "plaintext_key": b64(key),
                    "key_id": "arn:aws:kms:us-east-1:000000000000:key/test",
                }))
            }
            _ => ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "KMS Error"})),
        }
    }
}

/// Object store keyed by request path
#[derive(Clone, Default)]
struct ObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ObjectStore {
    fn tamper(&self, object_path: &str) {
        let mut objects = self.objects.lock().unwrap();
        let blob = objects.get_mut(object_path).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x80;
    }
}

struct Put(ObjectStore);
struct Get(ObjectStore);

impl Respond for Put {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0
            .objects
            .lock()
            .unwrap()
            .insert(request.url.path().to_string(), request.body.clone());
        ResponseTemplate::new(200)
    }
}

impl Respond for Get {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match self.0.objects.lock().unwrap().get(request.url.path()) {
            Some(blob) => ResponseTemplate::new(200).set_body_bytes(blob.clone()),
            None => ResponseTemplate::new(404),
        }
    }
}

/// Presigned URLs point back at the mock server's object store
struct Presign {
    base: String,
    counter: AtomicUsize,
}

impl Respond for Presign {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let s3_key = format!(
            "{}/{}-{}",
            body["user_id"].as_str().unwrap(),
            n,
            body["file_name"].as_str().unwrap()
        );
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "presigned_url": format!("{}/objects/{}", self.base, s3_key),
            "file_id": format!("file-{}", n),
            "s3_key": s3_key,
            "bucket_name": "secdrive-test",
        }))
    }
}

struct Backend {
    server: MockServer,
    kms: FakeKms,
    objects: ObjectStore,
}

impl Backend {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let kms = FakeKms::default();
        let objects = ObjectStore::default();

        Mock::given(method("POST"))
            .and(path("/generateDataKey"))
            .respond_with(Generate(kms.clone()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/decryptDataKey"))
            .respond_with(Decrypt(kms.clone()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/generatePresignedUrl"))
            .respond_with(Presign {
                base: server.uri(),
                counter: AtomicUsize::new(0),
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/confirmUpload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Upload confirmed",
                "file_id": "confirmed",
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex("^/objects/"))
            .respond_with(Put(objects.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/objects/"))
            .respond_with(Get(objects.clone()))
            .mount(&server)
            .await;

        Self {
            server,
            kms,
            objects,
        }
    }

    fn client(&self, storage: Arc<dyn KeyStorage>) -> EncryptedClient {
        EncryptedClient::new(Config::new(self.server.uri()), storage).unwrap()
    }

    fn object_url(&self, s3_key: &str) -> String {
        format!("{}/objects/{}", self.server.uri(), s3_key)
    }

    fn generated(&self) -> usize {
        self.kms.generated.load(Ordering::SeqCst)
    }

    fn decrypted(&self) -> usize {
        self.kms.decrypted.load(Ordering::SeqCst)
    }
}

fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upload_then_download_on_another_device() {
    let backend = Backend::start().await;
    let original = random_payload(1000);

    let uploader = backend.client(Arc::new(MemoryKeyStorage::new()));
    let receipt = uploader
        .upload_file("u1", "payload.bin", &original, None)
        .await
        .unwrap();
    assert_eq!(receipt.blob_size, (IV_SIZE + 1000 + TAG_SIZE) as u64);
    assert_eq!(backend.generated(), 1);

    // Stored bytes are ciphertext, not the payload
    let stored = backend.objects.objects.lock().unwrap()
        [&format!("/objects/{}", receipt.s3_key)]
        .clone();
    assert_ne!(&stored[IV_SIZE..IV_SIZE + 1000], &original[..]);

    // A second device with an empty session must unwrap through the KMS
    let dir = tempfile::tempdir().unwrap();
    let downloader = backend.client(Arc::new(MemoryKeyStorage::new()));
    let sink = DirectorySink::new(dir.path());
    downloader
        .download_file(
            "u1",
            &backend.object_url(&receipt.s3_key),
            "payload.bin",
            &receipt.encrypted_key,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.path().join("payload.bin")).unwrap(), original);
    assert_eq!(backend.decrypted(), 1);
}

#[tokio::test]
async fn test_same_device_download_needs_no_kms() {
    let backend = Backend::start().await;
    let client = backend.client(Arc::new(MemoryKeyStorage::new()));

    let receipt = client
        .upload_file("u1", "notes.txt", b"meeting notes", Some("text/plain"))
        .await
        .unwrap();
    let plaintext = client
        .fetch_file("u1", &backend.object_url(&receipt.s3_key), &receipt.encrypted_key)
        .await
        .unwrap();

    assert_eq!(&plaintext[..], b"meeting notes");
    assert_eq!(backend.decrypted(), 0);
}

#[tokio::test]
async fn test_clear_cache_forces_kms_round_trips() {
    let backend = Backend::start().await;
    let storage = Arc::new(MemoryKeyStorage::new());
    let client = backend.client(storage.clone());

    let first = client.encrypt_file("u1", b"before clear").await.unwrap();
    client.clear_cache().await.unwrap();
    assert!(storage.is_empty());

    let plaintext = client
        .decrypt_file("u1", &first.encrypted_key, &first.blob)
        .await
        .unwrap();
    assert_eq!(&plaintext[..], b"before clear");
    assert_eq!(backend.decrypted(), 1);

    // Encrypting again issues a brand new data key
    let second = client.encrypt_file("u1", b"after clear").await.unwrap();
    assert_ne!(first.encrypted_key, second.encrypted_key);
    assert_eq!(backend.generated(), 2);
}

#[tokio::test]
async fn test_many_files_share_one_data_key() {
    let backend = Backend::start().await;
    let client = backend.client(Arc::new(MemoryKeyStorage::new()));

    let mut receipts = Vec::new();
    for i in 0..5 {
        let body = format!("file number {}", i);
        let receipt = client
            .upload_file("u1", &format!("f{}.txt", i), body.as_bytes(), None)
            .await
            .unwrap();
        receipts.push((receipt, body));
    }

    assert_eq!(backend.generated(), 1);
    assert!(receipts
        .iter()
        .all(|(r, _)| r.encrypted_key == receipts[0].0.encrypted_key));

    for (receipt, body) in &receipts {
        let plaintext = client
            .fetch_file("u1", &backend.object_url(&receipt.s3_key), &receipt.encrypted_key)
            .await
            .unwrap();
        assert_eq!(&plaintext[..], body.as_bytes());
    }
}

#[tokio::test]
async fn test_two_users_on_one_client() {
    let backend = Backend::start().await;
    let client = backend.client(Arc::new(MemoryKeyStorage::new()));

    let alice = client.encrypt_file("alice", b"alice's file").await.unwrap();
    let bob = client.encrypt_file("bob", b"bob's file").await.unwrap();
    assert_ne!(alice.encrypted_key, bob.encrypted_key);

    // Switching back restores alice's key from the session, not the KMS
    let again = client.encrypt_file("alice", b"more").await.unwrap();
    assert_eq!(again.encrypted_key, alice.encrypted_key);
    assert_eq!(backend.generated(), 2);

    let plaintext = client
        .decrypt_file("alice", &alice.encrypted_key, &alice.blob)
        .await
        .unwrap();
    assert_eq!(&plaintext[..], b"alice's file");

    // Bob's key under alice's name is refused by the KMS
    let fresh = backend.client(Arc::new(MemoryKeyStorage::new()));
    let err = fresh
        .decrypt_file("alice", &bob.encrypted_key, &bob.blob)
        .await
        .unwrap_err();
    assert!(err.is_kms_unavailable());
}

#[tokio::test]
async fn test_tampered_object_is_rejected() {
    let backend = Backend::start().await;
    let client = backend.client(Arc::new(MemoryKeyStorage::new()));

    let receipt = client
        .upload_file("u1", "ledger.csv", b"date,amount\n2024-01-01,100\n", None)
        .await
        .unwrap();
    backend
        .objects
        .tamper(&format!("/objects/{}", receipt.s3_key));

    let dir = tempfile::tempdir().unwrap();
    let err = client
        .download_file(
            "u1",
            &backend.object_url(&receipt.s3_key),
            "ledger.csv",
            &receipt.encrypted_key,
            &DirectorySink::new(dir.path()),
        )
        .await
        .unwrap_err();

    assert!(err.is_authentication_failure());
    assert!(!dir.path().join("ledger.csv").exists());
}

#[tokio::test]
async fn test_missing_object_is_download_failure() {
    let backend = Backend::start().await;
    let client = backend.client(Arc::new(MemoryKeyStorage::new()));
    let file = client.encrypt_file("u1", b"never uploaded").await.unwrap();

    let err = client
        .fetch_file("u1", &backend.object_url("u1/missing"), &file.encrypted_key)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Download failed: Not Found");
}

#[tokio::test]
async fn test_session_file_round_trip_with_deterministic_ivs() {
    let backend = Backend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session.json");

    let api = ApiClient::new(Config::new(backend.server.uri())).unwrap();
    let engine = FileCryptoEngine::new(Arc::new(SequentialIvProvider::new([1, 2, 3, 4])));
    let storage = Arc::new(SessionFileStorage::open(&session).await.unwrap());
    let cache = KeyCache::new(Arc::new(HttpKmsClient::new(api.clone())), storage)
        .with_engine(engine.clone());
    let client = EncryptedClient::with_cache(api, cache, engine);

    let file = client.encrypt_file("u1", b"deterministic").await.unwrap();
    assert_eq!(&file.blob[..IV_SIZE], &[1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0]);

    // Reopen the session: no new key, no unwrap
    let reopened = backend.client(Arc::new(SessionFileStorage::open(&session).await.unwrap()));
    let plaintext = reopened
        .decrypt_file("u1", &file.encrypted_key, &file.blob)
        .await
        .unwrap();
    assert_eq!(&plaintext[..], b"deterministic");
    assert_eq!(backend.generated(), 1);
    assert_eq!(backend.decrypted(), 0);
}
