use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{CallbackMethod, CallbackPayload, CallbackRequest};

/// Best-effort forwarder of the current unique count to a caller endpoint
///
/// One outbound request per dispatch, never retried. POST carries
/// `{"count": <n>}`; GET carries no body.
#[derive(Clone)]
pub struct CallbackDispatcher {
    client: Client,
}

impl CallbackDispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Send the callback and return the endpoint's status.
    ///
    /// Non-2xx responses are returned as errors.
    pub async fn dispatch(&self, request: &CallbackRequest) -> Result<StatusCode> {
        let url = parse_endpoint(&request.endpoint)?;

        let builder = match request.method {
            CallbackMethod::Get => self.client.get(url),
            CallbackMethod::Post => self.client.post(url).json(&CallbackPayload {
                count: request.count,
            }),
        };

        let status = builder.send().await?.status();
        if !status.is_success() {
            return Err(AppError::Callback(format!(
                "endpoint responded with {}",
                status
            )));
        }

        Ok(status)
    }

    /// Dispatch and swallow the outcome; failures are logged only.
    pub async fn dispatch_logged(&self, request: CallbackRequest) {
        match self.dispatch(&request).await {
            Ok(status) => {
                metrics::CALLBACKS.with_label_values(&["success"]).inc();
                info!(
                    method = %request.method,
                    endpoint = %request.endpoint,
                    count = request.count,
                    status = status.as_u16(),
                    "Callback sent"
                );
            }
            Err(AppError::Callback(reason)) => {
                metrics::CALLBACKS.with_label_values(&["rejected"]).inc();
                warn!(
                    method = %request.method,
                    endpoint = %request.endpoint,
                    count = request.count,
                    reason = %reason,
                    "Callback rejected"
                );
            }
            Err(e) => {
                metrics::CALLBACKS
                    .with_label_values(&["transport_error"])
                    .inc();
                error!(
                    method = %request.method,
                    endpoint = %request.endpoint,
                    error = %e,
                    "Error sending callback"
                );
            }
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| AppError::Callback(format!("invalid endpoint '{}': {}", endpoint, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Callback(format!(
            "unsupported endpoint scheme '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("http://localhost:9000/cb").is_ok());
        assert!(parse_endpoint("https://example.com/cb?x=1").is_ok());
        assert!(parse_endpoint("not a url").is_err());
        assert!(parse_endpoint("ftp://example.com/cb").is_err());
    }

    #[tokio::test]
    async fn test_connection_refused_is_an_error() {
        let dispatcher = CallbackDispatcher::new(Duration::from_secs(2)).unwrap();
        let request = CallbackRequest {
            endpoint: "http://127.0.0.1:1/cb".to_string(),
            count: 1,
            method: CallbackMethod::Get,
        };

        assert!(matches!(
            dispatcher.dispatch(&request).await,
            Err(AppError::Http(_))
        ));

        // The logged variant never fails.
        dispatcher.dispatch_logged(request).await;
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_a_callback_error() {
        let dispatcher = CallbackDispatcher::new(Duration::from_secs(2)).unwrap();
        let request = CallbackRequest {
            endpoint: "::::".to_string(),
            count: 1,
            method: CallbackMethod::Post,
        };

        assert!(matches!(
            dispatcher.dispatch(&request).await,
            Err(AppError::Callback(_))
        ));
    }
}
