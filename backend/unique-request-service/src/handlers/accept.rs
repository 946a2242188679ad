use actix_web::http::Method;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

use crate::config::CallbackMode;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{CallbackMethod, CallbackRequest, RequestId};
use crate::AppState;

/// Body returned to ingress callers on success.
pub const OK_BODY: &str = "ok";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Parameters of the ingress endpoint
///
/// `id` is kept as text so a malformed value is reported as `failed`
/// rather than rejected by the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct AcceptParams {
    pub id: Option<String>,
    pub endpoint: Option<String>,
}

impl AcceptParams {
    /// Build from urlencoded pairs; the first value of a repeated key wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "id" if params.id.is_none() => params.id = Some(value),
                "endpoint" if params.endpoint.is_none() => params.endpoint = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Read parameters from the query string, followed by the body of a
    /// urlencoded form POST.
    pub fn from_request(req: &HttpRequest, body: &[u8]) -> Result<Self> {
        let mut pairs = parse_pairs(req.query_string())?;

        if *req.method() == Method::POST && req.content_type() == FORM_CONTENT_TYPE {
            let form = std::str::from_utf8(body)
                .map_err(|e| AppError::Validation(format!("form body is not UTF-8: {}", e)))?;
            pairs.extend(parse_pairs(form)?);
        }

        Ok(Self::from_pairs(pairs))
    }

    pub fn request_id(&self) -> Result<RequestId> {
        let raw = self
            .id
            .as_deref()
            .ok_or_else(|| AppError::Validation("missing id".to_string()))?;

        raw.parse::<RequestId>()
            .map_err(|e| AppError::Validation(format!("invalid id '{}': {}", raw, e)))
    }

    /// Callback endpoint, ignoring an empty value.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

fn parse_pairs(encoded: &str) -> Result<Vec<(String, String)>> {
    web::Query::<Vec<(String, String)>>::from_query(encoded)
        .map(web::Query::into_inner)
        .map_err(|e| AppError::Validation(format!("invalid parameters: {}", e)))
}

/// `GET|POST /api/verve/accept?id=<integer>&endpoint=<url>`
///
/// Parameters may also arrive as a urlencoded POST body. Records the
/// identifier, optionally forwards the current unique count to `endpoint`
/// using the same HTTP method, and answers `ok`. Callback failures never
/// change the response.
pub async fn accept(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let parsed = AcceptParams::from_request(&req, &body)
        .and_then(|p| p.request_id().map(|id| (p, id)));

    let (params, id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            metrics::ACCEPT_REQUESTS.with_label_values(&["rejected"]).inc();
            warn!(query = %req.query_string(), error = %e, "Rejected ingress request");
            return Err(e);
        }
    };

    let recorded = catch_unwind(AssertUnwindSafe(|| state.service.record(id))).map_err(|_| {
        metrics::ACCEPT_REQUESTS.with_label_values(&["error"]).inc();
        error!(request_id = %id, "Recording request panicked");
        AppError::Internal(format!("failed to record request {}", id))
    })?;

    let outcome = if recorded.was_new { "new" } else { "duplicate" };
    metrics::ACCEPT_REQUESTS.with_label_values(&[outcome]).inc();
    debug!(request_id = %id, outcome, "Accepted request");

    if let Some(endpoint) = params.endpoint() {
        let callback = CallbackRequest {
            endpoint: endpoint.to_string(),
            count: recorded.unique_count,
            method: callback_method(req.method()),
        };

        match state.callback_mode {
            CallbackMode::Inline => state.callbacks.dispatch_logged(callback).await,
            CallbackMode::Detached => {
                let callbacks = state.callbacks.clone();
                tokio::spawn(async move { callbacks.dispatch_logged(callback).await });
            }
        }
    }

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(OK_BODY))
}

fn callback_method(method: &Method) -> CallbackMethod {
    if *method == Method::POST {
        CallbackMethod::Post
    } else {
        CallbackMethod::Get
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: Option<&str>, endpoint: Option<&str>) -> AcceptParams {
        AcceptParams {
            id: id.map(str::to_string),
            endpoint: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn test_request_id_validation() {
        assert_eq!(params(Some("42"), None).request_id().unwrap(), RequestId(42));
        assert!(matches!(
            params(None, None).request_id(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            params(Some("forty-two"), None).request_id(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_first_value_of_repeated_key_wins() {
        let params = AcceptParams::from_pairs(vec![
            ("id".to_string(), "1".to_string()),
            ("endpoint".to_string(), "http://a/cb".to_string()),
            ("id".to_string(), "2".to_string()),
            ("other".to_string(), "x".to_string()),
        ]);

        assert_eq!(params.request_id().unwrap(), RequestId(1));
        assert_eq!(params.endpoint(), Some("http://a/cb"));
    }

    #[test]
    fn test_query_takes_precedence_over_form_body() {
        let req = actix_web::test::TestRequest::post()
            .uri("/api/verve/accept?id=5")
            .insert_header(("content-type", FORM_CONTENT_TYPE))
            .to_http_request();

        let params = AcceptParams::from_request(&req, b"id=6&endpoint=http://a/cb").unwrap();
        assert_eq!(params.request_id().unwrap(), RequestId(5));
        assert_eq!(params.endpoint(), Some("http://a/cb"));
    }

    #[test]
    fn test_form_body_ignored_for_get() {
        let req = actix_web::test::TestRequest::get()
            .uri("/api/verve/accept")
            .insert_header(("content-type", FORM_CONTENT_TYPE))
            .to_http_request();

        let params = AcceptParams::from_request(&req, b"id=6").unwrap();
        assert!(params.id.is_none());
    }

    #[test]
    fn test_empty_endpoint_is_ignored() {
        assert_eq!(params(Some("1"), Some("  ")).endpoint(), None);
        assert_eq!(
            params(Some("1"), Some("http://x/cb")).endpoint(),
            Some("http://x/cb")
        );
    }

    #[test]
    fn test_callback_method_follows_ingress_method() {
        assert_eq!(callback_method(&Method::POST), CallbackMethod::Post);
        assert_eq!(callback_method(&Method::GET), CallbackMethod::Get);
    }
}
