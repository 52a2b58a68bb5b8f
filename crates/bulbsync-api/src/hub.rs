// Hub channel: executes NVA batches against the hub.
//
// `HubChannel` is the seam the core depends on. `HttpHubChannel` is the
// production implementation; tests substitute in-memory fakes.

use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::nva::{Nva, NvaResponse};
use crate::transport::TransportConfig;

/// One `execute` call: a batch of commands plus the issuer identity.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub nva: Vec<Nva>,
    pub source_translator: String,
    pub manipulator_id: String,
    pub access_token: SecretString,
}

/// Request/response channel to the hub.
///
/// Failures are reported, never retried here -- retry policy belongs to
/// the caller.
pub trait HubChannel: Send + Sync + 'static {
    fn execute(
        &self,
        request: ExecuteRequest,
    ) -> impl Future<Output = Result<Vec<NvaResponse>, Error>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody<'a> {
    nva: &'a [Nva],
    source_translator: &'a str,
    manipulator_id: &'a str,
}

/// The hub wraps rejections as `{"status":0,"error":{"code":..,"reason":..}}`.
#[derive(Deserialize)]
struct HubErrorEnvelope {
    error: Option<HubErrorInner>,
}

#[derive(Deserialize)]
struct HubErrorInner {
    code: String,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP implementation of [`HubChannel`].
///
/// Posts batches to `{base_url}/nva` with bearer authentication.
pub struct HttpHubChannel {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpHubChannel {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
        })
    }

    /// Create a hub channel with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn nva_url(&self) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("nva");
        Ok(url)
    }
}

impl HubChannel for HttpHubChannel {
    async fn execute(&self, request: ExecuteRequest) -> Result<Vec<NvaResponse>, Error> {
        let url = self.nva_url()?;
        debug!(url = %url, commands = request.nva.len(), "executing NVA batch");

        let body = ExecuteBody {
            nva: &request.nva,
            source_translator: &request.source_translator,
            manipulator_id: &request.manipulator_id,
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(request.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        trace!(status = status.as_u16(), body = %text, "hub response");

        if !status.is_success() {
            return Err(Error::Hub {
                status: status.as_u16(),
                message: hub_error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text,
        })
    }
}

/// Pull a readable message out of a rejection body.
fn hub_error_message(body: &str) -> String {
    match serde_json::from_str::<HubErrorEnvelope>(body) {
        Ok(HubErrorEnvelope {
            error: Some(HubErrorInner { code, reason }),
        }) => match reason {
            Some(reason) => format!("{code}: {reason}"),
            None => code,
        },
        _ => body.trim().to_owned(),
    }
}
