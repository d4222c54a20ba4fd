//! HTTP gateway for the TensorFlow Serving REST API.
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tensorbench::core::PredictRequest;
use tensorbench::{CallError, ConnectionError, Gateway};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

const DEFAULT_SCHEME: &str = "http://";
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues predict calls as `POST {base}/v1/models/{model}:predict`.
///
/// Every dial builds a separate `reqwest::Client`, so clients of a run never share a connection
/// pool.
#[derive(Debug, Clone, Default)]
pub struct HttpGateway {
    dial_timeout: Option<Duration>,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on the reachability check made when dialing. Defaults to 10 seconds.
    pub fn dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = Some(dial_timeout);
        self
    }
}

#[derive(Debug)]
pub struct HttpConnection {
    client: Client,
    base: Url,
}

impl HttpConnection {
    pub fn base(&self) -> &Url {
        &self.base
    }
}

/// Parse a target into a base URL. Bare `host:port` targets get an `http://` scheme.
pub fn base_url(address: &str) -> Result<Url, ConnectionError> {
    let address = address.trim();
    let mut url = if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("{DEFAULT_SCHEME}{address}"))
    }
    .map_err(|err| ConnectionError::new(address, err))?;

    if url.cannot_be_a_base() || url.host().is_none() {
        return Err(ConnectionError::new(address, "not a valid base URL"));
    }

    // Relative joins replace the last segment unless the path ends in a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

impl Gateway for HttpGateway {
    type Connection = HttpConnection;

    async fn dial(&self, address: &str) -> Result<HttpConnection, ConnectionError> {
        let base = base_url(address)?;
        let client = Client::builder()
            .build()
            .map_err(|err| ConnectionError::new(address, err))?;

        // Any response at all means the service is reachable.
        let reply = client
            .get(base.clone())
            .timeout(self.dial_timeout.unwrap_or(DIAL_TIMEOUT))
            .send()
            .await
            .map_err(|err| ConnectionError::new(address, err))?;
        debug!("Reached {base}: {}", reply.status());

        Ok(HttpConnection { client, base })
    }

    async fn call(
        &self,
        connection: &HttpConnection,
        request: &PredictRequest,
        deadline: Option<Duration>,
    ) -> Result<(), CallError> {
        let url = connection
            .base
            .join(request.rest_path())
            .map_err(|err| CallError::Transport(err.to_string()))?;

        let mut builder = connection
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.rest_body());
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }

        let res = builder.send().await.map_err(|err| match deadline {
            Some(deadline) if err.is_timeout() => CallError::Timeout(deadline),
            _ => CallError::Transport(err.to_string()),
        })?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let body = res.text().await.unwrap_or_default();
        Err(CallError::Status {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => error,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string(),
    }
}
