//! Coordination server HTTP client

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use super::types::{ConfirmRequest, RestartRequest};
use crate::config::SyncConfig;
use crate::device_id::DeviceId;
use crate::error::SyncError;
use crate::sync::SyncSnapshot;

/// The coordination server, as seen by one device
#[async_trait]
pub trait Authority: Send + Sync {
    /// Report our position and fetch the current session snapshot
    async fn poll(
        &self,
        device_id: &DeviceId,
        position_ms: u64,
        city: &str,
    ) -> Result<SyncSnapshot, SyncError>;

    /// Tell the server this device is paused at zero and ready to start
    async fn confirm_ready(&self, device_id: &DeviceId, city: &str) -> Result<(), SyncError>;

    /// Ask the server to schedule a fresh start for `city`
    async fn request_restart(&self, city: &str) -> Result<(), SyncError>;
}

/// [`Authority`] backed by the server's REST API
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    http: Client,
    sync_url: String,
    confirm_url: String,
    restart_url: String,
}

impl HttpAuthority {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            sync_url: config.sync_url.clone(),
            confirm_url: config.confirm_url.clone(),
            restart_url: config.restart_url.clone(),
        })
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), SyncError> {
        let resp = self.http.post(url).json(body).send().await.map_err(|e| {
            warn!("POST {} failed: {}", url, e);
            SyncError::from(e)
        })?;

        let status = resp.status();
        debug!("POST {} -> {}", url, status);
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    #[instrument(skip(self, device_id), fields(url = %self.sync_url))]
    async fn poll(
        &self,
        device_id: &DeviceId,
        position_ms: u64,
        city: &str,
    ) -> Result<SyncSnapshot, SyncError> {
        let position = position_ms.to_string();
        let resp = self
            .http
            .get(&self.sync_url)
            .query(&[
                ("deviceId", device_id.as_str()),
                ("position", position.as_str()),
                ("city", city),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        debug!("Sync response: {}", body);

        SyncSnapshot::parse(&body, position_ms)
    }

    #[instrument(skip(self, device_id), fields(device = %device_id))]
    async fn confirm_ready(&self, device_id: &DeviceId, city: &str) -> Result<(), SyncError> {
        let body = ConfirmRequest {
            device_id: device_id.to_string(),
            city: city.to_string(),
        };
        self.post(&self.confirm_url, &body).await
    }

    #[instrument(skip(self))]
    async fn request_restart(&self, city: &str) -> Result<(), SyncError> {
        let body = RestartRequest {
            city: city.to_string(),
        };
        self.post(&self.restart_url, &body).await
    }
}
