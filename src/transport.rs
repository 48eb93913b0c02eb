use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::FleetError;

/// What happened to one server's request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The server answered. Any status, 2xx or not, lands here.
    Success { status: StatusCode, body: String },
    /// The request never got a response (connect, TLS, timeout).
    TransportError(String),
    /// The response started but its body could not be read.
    BodyReadError(String),
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }
}

/// Issues one GET and turns the result into an outcome.
/// Implementations never fail; errors are outcomes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> DispatchOutcome;
}

#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Accept self-signed and otherwise invalid certificates.
    pub skip_cert_verification: bool,
    pub request_timeout: Option<Duration>,
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, FleetError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(options.skip_cert_verification);
        if options.skip_cert_verification {
            tracing::warn!("TLS certificate verification is disabled");
        }
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> DispatchOutcome {
        tracing::debug!("GET {}", url);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return DispatchOutcome::TransportError(e.to_string()),
        };
        let status = response.status();
        match response.text().await {
            Ok(body) => DispatchOutcome::Success { status, body },
            Err(e) => DispatchOutcome::BodyReadError(e.to_string()),
        }
    }
}
