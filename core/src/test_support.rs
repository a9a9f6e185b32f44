//! Mock implementations of platform traits and signing fixtures for testing

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::platform::{Clock, Environment, HttpClient, HttpResponse};

pub const TEST_NOW: u64 = 1_706_900_000;
pub const TEST_ISSUER: &str = "https://sts.example.com/tenant-1/";
pub const TEST_AUDIENCE: &str = "api://client-1";

/// Canned reply for a URL pattern
#[derive(Clone)]
pub enum MockReply {
    Respond { status: u16, body: Vec<u8> },
    Fail(ApiError),
}

impl MockReply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond {
            status,
            body: body.to_string().into_bytes(),
        }
    }
}

/// Mock HTTP client with pre-configured responses, matched by URL substring
///
/// Replies can be swapped at runtime and every call is counted and recorded.
pub struct MockHttp {
    replies: Mutex<Vec<(String, MockReply)>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockHttp {
    pub fn new(replies: Vec<(&str, MockReply)>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|(pattern, reply)| (pattern.to_string(), reply))
                    .collect(),
            ),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering (use with paused tokio time)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_reply(&self, pattern: &str, reply: MockReply) {
        let mut replies = self.replies.lock().unwrap();
        replies.retain(|(p, _)| p != pattern);
        replies.insert(0, (pattern.to_string(), reply));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(pattern))
            .count()
    }

    /// Body of the most recent request to a URL containing `pattern`
    pub fn last_body(&self, pattern: &str) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(url, _)| url.contains(pattern))
            .map(|(_, body)| String::from_utf8_lossy(body).to_string())
    }

    async fn reply(&self, method: &str, url: &str, body: &[u8]) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(MockReply::Respond { status, body }) => Ok(HttpResponse { status, body }),
            Some(MockReply::Fail(err)) => Err(err),
            None => Err(ApiError::transient(format!("no mock response for {} {}", method, url))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.reply("GET", url, &[]).await
    }

    async fn post(&self, url: &str, _headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse> {
        self.reply("POST", url, body).await
    }
}

/// Mock clock that can be moved forward
pub struct MockClock(AtomicU64);

impl MockClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mock environment backed by an in-memory HashMap
pub struct MockEnv {
    vars: HashMap<String, String>,
    secrets: HashMap<String, String>,
}

impl MockEnv {
    pub fn new(vars: HashMap<String, String>, secrets: HashMap<String, String>) -> Self {
        Self { vars, secrets }
    }

    pub fn from_pairs(vars: &[(&str, &str)], secrets: &[(&str, &str)]) -> Self {
        let owned = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self::new(owned(vars), owned(secrets))
    }

    /// Complete configuration pointing at [`TEST_ISSUER`] and [`TEST_AUDIENCE`]
    pub fn complete() -> Self {
        Self::from_pairs(
            &[
                ("TENANT_ID", "tenant-1"),
                ("CLIENT_ID", "client-1"),
                ("TOKEN_ISSUER", TEST_ISSUER),
                ("DOWNSTREAM_SCOPES", "https://graph.microsoft.com/.default"),
            ],
            &[("CLIENT_SECRET", "s3cret")],
        )
    }
}

impl Environment for MockEnv {
    fn get_var(&self, name: &str) -> Result<String> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::misconfigured(format!("variable '{}' not found", name)))
    }

    fn get_secret(&self, name: &str) -> Result<String> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::misconfigured(format!("secret '{}' not found", name)))
    }
}

/// RSA signing key generated at runtime (never touches disk)
pub struct TestKey {
    pub kid: String,
    private_pem: String,
    n: String,
    e: String,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        use rand::rngs::OsRng;
        use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation failed");
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private key PEM export failed")
            .to_string();

        Self {
            kid: kid.to_string(),
            private_pem,
            n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    }

    /// Public half as a JWK
    pub fn jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign `claims` as an RS256 JWT carrying this key's `kid`
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).expect("valid test key");
        encode(&header, claims, &key).expect("signing failed")
    }
}

/// Key published in the test discovery document
pub fn primary_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-1"))
}

/// Key the issuer rotates to
pub fn rotated_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-2"))
}

/// Claims accepted by a verifier expecting [`TEST_ISSUER`] / [`TEST_AUDIENCE`] at [`TEST_NOW`]
pub fn valid_claims() -> serde_json::Value {
    serde_json::json!({
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "sub": "user-42",
        "iat": TEST_NOW - 60,
        "nbf": TEST_NOW - 60,
        "exp": TEST_NOW + 3600,
        "scp": "access_as_user",
    })
}

/// Discovery document for [`TEST_ISSUER`] with inline signing keys
pub fn discovery_body(keys: &[&TestKey]) -> serde_json::Value {
    serde_json::json!({
        "issuer": TEST_ISSUER,
        "jwks_uri": "https://keys.example.com/discovery/keys",
        "token_endpoint": "https://login.example.com/tenant-1/oauth2/token",
        "signing_keys": {
            "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>(),
        },
    })
}
