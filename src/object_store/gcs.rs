use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{ObjectStore, ObjectStoreError};

const API_BASE: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Google Cloud Storage object store backend.
///
/// Uploads use `ifGenerationMatch=0`, so a content key is written at most once
/// and a second upload of the same content is answered with 412 by GCS.
pub struct GcsStore {
    bucket: String,
    client: Client,
    credentials: Credentials,
    access_token: RwLock<String>,
}

enum Credentials {
    ServiceAccount(String),
    MetadataServer,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let store = Self {
            bucket: bucket.to_string(),
            client: Client::builder().build()?,
            credentials: match credentials_file {
                Some(path) => Credentials::ServiceAccount(path.to_string()),
                None => Credentials::MetadataServer,
            },
            access_token: RwLock::new(String::new()),
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<(), anyhow::Error> {
        let token = match &self.credentials {
            Credentials::ServiceAccount(path) => self.token_from_service_account(path).await?,
            Credentials::MetadataServer => {
                let resp: TokenResponse = self
                    .client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                resp.access_token
            }
        };

        *self.access_token.write().await = token;
        Ok(())
    }

    async fn token_from_service_account(&self, path: &str) -> Result<String, anyhow::Error> {
        let key: ServiceAccountKey = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;

        let now = chrono::Utc::now().timestamp();
        let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": SCOPE,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let unsigned = format!(
            "{}.{}",
            URL_SAFE.encode(serde_json::to_vec(&header)?),
            URL_SAFE.encode(serde_json::to_vec(&claims)?)
        );
        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let assertion = format!("{unsigned}.{}", URL_SAFE.encode(signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    /// Send an authorized request, refreshing the token once on 401.
    async fn send<F>(&self, build: F) -> Result<Response, ObjectStoreError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.access_token.read().await.clone();
        let resp = build(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(backend)?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::debug!(bucket = %self.bucket, "GCS token rejected, refreshing");
        self.refresh_token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("token refresh failed: {e}")))?;
        let token = self.access_token.read().await.clone();
        build(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(backend)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{API_BASE}/storage/v1/b/{}/o/{}",
            self.bucket,
            encode_object_name(key)
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{API_BASE}/upload/storage/v1/b/{}/o?uploadType=media&ifGenerationMatch=0&name={}",
            self.bucket,
            encode_object_name(key)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let url = self.upload_url(key);
        let resp = self
            .send(|client| {
                client
                    .post(&url)
                    .header("Content-Type", "application/octet-stream")
                    .body(data.clone())
            })
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            // Object already exists; same key means same bytes
            StatusCode::PRECONDITION_FAILED => Ok(()),
            _ => Err(failure("upload", resp).await),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let url = format!("{}?alt=media", self.object_url(key));
        let resp = self.send(|client| client.get(&url)).await?;

        match resp.status() {
            s if s.is_success() => resp.bytes().await.map_err(backend),
            StatusCode::NOT_FOUND => Err(ObjectStoreError::NotFound(key.to_string())),
            _ => Err(failure("download", resp).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let url = self.object_url(key);
        let resp = self.send(|client| client.delete(&url)).await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ObjectStoreError::NotFound(key.to_string())),
            _ => Err(failure("delete", resp).await),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let url = self.object_url(key);
        let resp = self.send(|client| client.get(&url)).await?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(failure("metadata lookup", resp).await),
        }
    }
}

const URL_SAFE: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

fn backend(e: reqwest::Error) -> ObjectStoreError {
    ObjectStoreError::Backend(e.to_string())
}

async fn failure(operation: &str, resp: Response) -> ObjectStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ObjectStoreError::Backend(format!("GCS {operation} failed ({status}): {body}"))
}

/// Percent-encode an object name for use as a single URL path segment or query value.
fn encode_object_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::engine::general_purpose::STANDARD.decode(der_b64.trim())?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_object_name_escapes_separators() {
        assert_eq!(
            encode_object_name("sha256/ab/cd/abcd"),
            "sha256%2Fab%2Fcd%2Fabcd"
        );
    }

    #[test]
    fn test_encode_object_name_keeps_unreserved() {
        assert_eq!(encode_object_name("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_object_name("a b"), "a%20b");
    }
}
