// Device proxy client.
//
// The device side exposes each bulb's reported state and accepts method
// invocations. `DeviceClient` is the seam the core depends on;
// `HttpDeviceClient` talks to a REST proxy in front of the bulbs.

use std::future::Future;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Access to the device side.
///
/// Both calls return `Ok(None)` when the device is unknown to the proxy or
/// did not answer; the caller decides how to surface that.
pub trait DeviceClient: Send + Sync + 'static {
    /// The device's latest reported state, as a raw JSON record.
    fn current_state(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<Value>, Error>> + Send;

    /// Invoke `method` on the device with `args`.
    fn invoke(
        &self,
        device_id: &str,
        method: &str,
        args: &Value,
    ) -> impl Future<Output = Result<Option<Value>, Error>> + Send;
}

/// REST implementation of [`DeviceClient`].
///
/// - `GET  {base}/devices/{id}` returns the device record
/// - `POST {base}/devices/{id}/{method}` with `args` as JSON body
pub struct HttpDeviceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpDeviceClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
        })
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn device_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("devices")
            .extend(segments);
        Ok(url)
    }

    async fn read_body(device_id: &str, response: reqwest::Response) -> Result<Option<Value>, Error> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Device {
                device_id: device_id.to_owned(),
                status: status.as_u16(),
                message: text.trim().to_owned(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Some(Value::Null));
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text,
            })
    }
}

impl DeviceClient for HttpDeviceClient {
    async fn current_state(&self, device_id: &str) -> Result<Option<Value>, Error> {
        let url = self.device_url(&[device_id])?;
        debug!(%device_id, "fetching device state");
        let response = self.http.get(url).send().await?;
        Self::read_body(device_id, response).await
    }

    async fn invoke(&self, device_id: &str, method: &str, args: &Value) -> Result<Option<Value>, Error> {
        let url = self.device_url(&[device_id, method])?;
        debug!(%device_id, %method, "invoking device method");
        let response = self.http.post(url).json(args).send().await?;
        Self::read_body(device_id, response).await
    }
}
