//! Remote scan backend: the store contract proxied to an HTTP endpoint.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT},
    Client, StatusCode, Url,
};
use scanlog_core::{
    scan::{sort_newest_first, NewScan, ScanRecord},
    store::{ScanStore, ScanStoreError},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

const BACKEND: &str = "remote";

/// Endpoint settings for a centralized scan server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// API root; scans live under `{base_url}/scans`.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout; no timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Only the id is needed from the server's echo of a created record.
#[derive(Debug, Deserialize)]
struct CreatedScan {
    id: i64,
}

/// Scan store that forwards every operation to a remote server. Nothing is retried.
pub struct RemoteScanStore {
    cfg: RemoteConfig,
    client: OnceLock<Client>,
}

impl RemoteScanStore {
    pub fn new(cfg: RemoteConfig) -> Self {
        Self {
            cfg,
            client: OnceLock::new(),
        }
    }

    fn build_client(&self) -> Result<Client, ScanStoreError> {
        let base = Url::parse(&self.cfg.base_url).map_err(|e| {
            ScanStoreError::unavailable(format!("invalid base_url {:?}: {e}", self.cfg.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ScanStoreError::unavailable(format!(
                "unsupported base_url scheme: {}",
                base.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("scanlog"));
        if let Some(token) = &self.cfg.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ScanStoreError::unavailable(format!("invalid token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(secs) = self.cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build().map_err(ScanStoreError::unavailable)
    }

    fn client(&self) -> Result<&Client, ScanStoreError> {
        self.client
            .get()
            .ok_or_else(|| ScanStoreError::not_initialized(BACKEND))
    }

    fn scans_url(&self) -> String {
        format!("{}/scans", self.cfg.base_url.trim_end_matches('/'))
    }

    fn scan_url(&self, id: i64) -> String {
        format!("{}/{id}", self.scans_url())
    }
}

fn transport_err(err: reqwest::Error) -> ScanStoreError {
    ScanStoreError::unavailable(format!("transport: {err}"))
}

/// Decode a response body; floats are parsed exactly (`float_roundtrip`).
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ScanStoreError> {
    let body = resp.bytes().await.map_err(transport_err)?;
    serde_json::from_slice(&body)
        .map_err(|e| ScanStoreError::unavailable(format!("malformed response body: {e}")))
}

fn status_err(method: &str, url: &str, status: StatusCode) -> ScanStoreError {
    ScanStoreError::unavailable(format!("{method} {url} returned {status}"))
}

#[async_trait]
impl ScanStore for RemoteScanStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(base_url = %self.cfg.base_url))]
    async fn initialize(&self) -> Result<(), ScanStoreError> {
        if self.client.get().is_none() {
            let client = self.build_client()?;
            // A lost race leaves an equivalent client in place.
            let _ = self.client.set(client);
            debug!("http client ready");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<ScanRecord>, ScanStoreError> {
        let url = self.scans_url();
        let resp = self
            .client()?
            .get(&url)
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err("GET", &url, resp.status()));
        }

        let mut scans: Vec<ScanRecord> = decode(resp).await?;
        sort_newest_first(&mut scans);
        Ok(scans)
    }

    #[instrument(skip_all, fields(timestamp = scan.timestamp))]
    async fn add(&self, scan: NewScan) -> Result<i64, ScanStoreError> {
        let client = self.client()?;
        scan.validate()?;

        let url = self.scans_url();
        let resp = client
            .post(&url)
            .json(&scan)
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            return Err(status_err("POST", &url, resp.status()));
        }

        let created: CreatedScan = decode(resp).await?;
        debug!(id = created.id, "scan stored remotely");
        Ok(created.id)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<ScanRecord>, ScanStoreError> {
        let url = self.scan_url(id);
        let resp = self
            .client()?
            .get(&url)
            .send()
            .await
            .map_err(transport_err)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(decode(resp).await?)),
            status => Err(status_err("GET", &url, status)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> Result<bool, ScanStoreError> {
        let url = self.scan_url(id);
        let resp = self
            .client()?
            .delete(&url)
            .send()
            .await
            .map_err(transport_err)?;

        match resp.status() {
            // Already gone: not a failure, just nothing removed.
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(status_err("DELETE", &url, status)),
        }
    }
}
