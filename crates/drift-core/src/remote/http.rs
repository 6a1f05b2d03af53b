//! HTTP-backed remote store client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{
    CredentialProvider, PutOutcome, RemoteBlob, RemoteError, RemoteObject, RemoteResult,
    RemoteStore,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the hosted object-storage API.
///
/// Objects live under `{base}/v1/objects/{key}`; the service returns the
/// content digest (hex SHA-256) as the object's etag.
pub struct HttpRemoteStore {
    base_url: String,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> RemoteResult<Self> {
        Self::with_timeout(base_url, credentials, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/v1/objects/{key}", self.base_url)
    }

    async fn token(&self) -> RemoteResult<String> {
        self.credentials.current_token().await
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RemoteResult<PutOutcome> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(self.token().await?)
            .body(bytes)
            .send()
            .await
            .map_err(|e| classify_reqwest(key, &e))?;
        let response = check_status(key, response).await?;

        let payload: PutResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(PutOutcome {
            etag: payload.etag,
            size: payload.size,
        })
    }

    async fn get(&self, key: &str) -> RemoteResult<RemoteBlob> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(|e| classify_reqwest(key, &e))?;
        let response = check_status(key, response).await?;

        let etag = header_string(&response, "etag").unwrap_or_default();
        let mtime = header_string(&response, "x-drift-mtime").and_then(|v| v.parse().ok());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(RemoteBlob {
            bytes: bytes.to_vec(),
            etag,
            mtime,
        })
    }

    async fn delete(&self, key: &str) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(|e| classify_reqwest(key, &e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(key, response).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> RemoteResult<Vec<RemoteObject>> {
        let response = self
            .client
            .get(format!("{}/v1/objects", self.base_url))
            .query(&[("prefix", prefix)])
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(|e| classify_reqwest(prefix, &e))?;
        let response = check_status(prefix, response).await?;

        let payload: ListResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(payload.objects)
    }

    async fn stat(&self, key: &str) -> RemoteResult<Option<RemoteObject>> {
        let response = self
            .client
            .head(self.object_url(key))
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(|e| classify_reqwest(key, &e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(key, response).await?;

        let size = header_string(&response, "content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Some(RemoteObject {
            key: key.to_string(),
            size,
            etag: header_string(&response, "etag").unwrap_or_default(),
            mtime: header_string(&response, "x-drift-mtime").and_then(|v| v.parse().ok()),
        }))
    }

    async fn ping(&self) -> RemoteResult<()> {
        let response = self
            .client
            .get(format!("{}/v1/ping", self.base_url))
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(|e| classify_reqwest("ping", &e))?;
        check_status("ping", response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    etag: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    objects: Vec<RemoteObject>,
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
}

fn classify_reqwest(key: &str, error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout(format!("{key}: {error}"))
    } else if error.is_connect() {
        RemoteError::Unavailable(format!("{key}: {error}"))
    } else {
        RemoteError::Transport(format!("{key}: {error}"))
    }
}

/// Map non-success statuses onto the error classification.
async fn check_status(key: &str, response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{key}: HTTP {}: {}", status.as_u16(), compact(&body));
    Err(match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Denied(detail),
        StatusCode::REQUEST_TIMEOUT => RemoteError::Timeout(detail),
        s if s.is_server_error() => RemoteError::Unavailable(detail),
        _ => RemoteError::Rejected(detail),
    })
}

fn compact(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let creds = Arc::new(super::super::StaticCredentials::new("t"));
        let store = HttpRemoteStore::new("https://api.example.com/", creds).unwrap();
        assert_eq!(
            store.object_url("a/b.txt"),
            "https://api.example.com/v1/objects/a/b.txt"
        );
    }
}
