//! HTTP transport for the ticketing service.
//!
//! `ApiClient` attaches the current bearer credential, parses every response
//! body as the service envelope, and classifies failures into `ApiError`.
//! A 401 from any endpoint clears the persisted session and raises the
//! process-wide expiry signal before the error is returned to the caller.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionManager;

use super::error::UNPARSEABLE_BODY_MESSAGE;
use super::{ApiError, ApiResponse};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Body of an outbound request.
#[derive(Debug)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart bodies declare their own content type and boundary
    Multipart(Form),
}

/// API client for the ticketing service.
/// Clone is cheap - reqwest::Client and SessionManager are both Arc-backed.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8080/api/v1`).
    /// Credentials are borrowed from `session` on every request.
    pub fn new(base_url: impl Into<String>, session: SessionManager) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Issue a request and return the parsed response body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Value, ApiError> {
        let (_, value) = self.send(method, path, &[], body).await?;
        Ok(value)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: RequestBody,
    ) -> Result<(StatusCode, Value), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending request");

        let mut builder = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = self.session.credential() {
            builder = builder.bearer_auth(token);
        }
        builder = match body {
            RequestBody::Empty => builder.header(header::CONTENT_TYPE, "application/json"),
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(form),
        };

        let response = builder.send().await.map_err(|e| {
            warn!(method = %method, url = %url, error = %e, "Request failed without a response");
            ApiError::Network(e)
        })?;

        self.handle_response(response).await
    }

    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(StatusCode, Value), ApiError> {
        let status = response.status();
        debug!(status = status.as_u16(), "Response received");

        // Once a status line has arrived, a failed status is classified by it
        // even when the body cannot be read
        let body = match response.text().await {
            Ok(text) => Self::parse_body(&text),
            Err(e) if status.is_success() => {
                warn!(status = status.as_u16(), error = %e, "Response body could not be read");
                return Err(ApiError::Network(e));
            }
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Error response body could not be read");
                serde_json::json!({ "error": UNPARSEABLE_BODY_MESSAGE })
            }
        };

        if status.is_success() {
            return Ok((status, body));
        }

        if status == StatusCode::UNAUTHORIZED {
            // Store is emptied before anyone hears the signal
            self.session.clear_rejected_store();
            self.session.expiry_signal().raise();
        }

        let error = ApiError::from_status(status, &body);
        debug!(status = status.as_u16(), error = %error, "Request rejected");
        Err(error)
    }

    /// Parse a response body, substituting a synthetic error payload when the
    /// body is not JSON. An empty body is an empty object.
    fn parse_body(text: &str) -> Value {
        if text.trim().is_empty() {
            return Value::Object(Default::default());
        }
        serde_json::from_str(text).unwrap_or_else(|e| {
            debug!(error = %e, "Response body is not JSON");
            serde_json::json!({ "error": UNPARSEABLE_BODY_MESSAGE })
        })
    }

    fn decode<T: DeserializeOwned>(
        status: StatusCode,
        body: Value,
    ) -> Result<ApiResponse<T>, ApiError> {
        serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse {
            status: status.as_u16(),
            message: e.to_string(),
        })
    }

    fn encode<B: Serialize>(body: &B) -> Result<RequestBody, ApiError> {
        serde_json::to_value(body)
            .map(RequestBody::Json)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    // ===== Verbs =====

    /// GET with optional query parameters; `None` and empty values are omitted.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<ApiResponse<T>, ApiError> {
        let query: Vec<(&str, String)> = params
            .iter()
            .filter_map(|(k, v)| match v {
                Some(v) if !v.is_empty() => Some((*k, v.clone())),
                _ => None,
            })
            .collect();
        let (status, body) = self.send(Method::GET, path, &query, RequestBody::Empty).await?;
        Self::decode(status, body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let (status, body) = self.send(Method::POST, path, &[], Self::encode(body)?).await?;
        Self::decode(status, body)
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let (status, body) = self.send(Method::PUT, path, &[], Self::encode(body)?).await?;
        Self::decode(status, body)
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let (status, body) = self.send(Method::PATCH, path, &[], Self::encode(body)?).await?;
        Self::decode(status, body)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        let (status, body) = self.send(Method::DELETE, path, &[], RequestBody::Empty).await?;
        Self::decode(status, body)
    }

    /// POST a multipart form. No JSON content type is set.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<ApiResponse<T>, ApiError> {
        let (status, body) = self
            .send(Method::POST, path, &[], RequestBody::Multipart(form))
            .await?;
        Self::decode(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_json() {
        assert_eq!(ApiClient::parse_body(r#"{"success":true}"#), json!({"success": true}));
    }

    #[test]
    fn test_parse_body_empty_is_object() {
        assert_eq!(ApiClient::parse_body(""), json!({}));
        assert_eq!(ApiClient::parse_body("  \n"), json!({}));
    }

    #[test]
    fn test_parse_body_garbage_is_synthetic_error() {
        let body = ApiClient::parse_body("<html>Bad Gateway</html>");
        assert_eq!(body, json!({"error": "Failed to parse server response"}));
    }

    #[test]
    fn test_decode_shape_mismatch_is_invalid_response() {
        let result = ApiClient::decode::<Vec<String>>(StatusCode::OK, json!({"data": 5}));
        match result {
            Err(ApiError::InvalidResponse { status, .. }) => assert_eq!(status, 200),
            other => panic!("unexpected result: {:?}", other.map(|r| r.success)),
        }
    }
}
