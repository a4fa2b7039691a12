use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::auth::session::SessionHandle;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// Success payloads arrive wrapped as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Error payloads arrive as `{ "message": "..." }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the PlantMate REST API.
///
/// Wraps a single `reqwest::Client`, attaches the bearer token from the
/// shared session handle (read once per dispatch), and classifies every
/// failure into the `ApiError` taxonomy before it reaches a caller.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self, ApiError> {
        // Validate the base URL up front; a typo in config should fail loudly
        // at construction, not on the first request.
        Url::parse(&config.base_url)
            .map_err(|e| ApiError::Validation(format!("Invalid base URL '{}': {}", config.base_url, e)))?;

        let http = reqwest::Client::builder()
            .user_agent("PlantMate/1.0")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.dispatch(Method::GET, path, None).await?;
        decode_data(&body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = to_payload(body)?;
        let text = self.dispatch(Method::POST, path, Some(payload)).await?;
        decode_data(&text)
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = to_payload(body)?;
        let text = self.dispatch(Method::PATCH, path, Some(payload)).await?;
        decode_data(&text)
    }

    /// POST where the response body carries no payload worth decoding
    /// (`{"data": null}`, or nothing at all).
    pub async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let payload = to_payload(body)?;
        self.dispatch(Method::POST, path, Some(payload)).await?;
        Ok(())
    }

    pub async fn delete_unit(&self, path: &str) -> Result<(), ApiError> {
        self.dispatch(Method::DELETE, path, None).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send one request and return the raw success body.
    ///
    /// The token is read from the session handle exactly once, so a login or
    /// logout racing this call can never produce a half-updated header.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(path);
        let token = self.session.token();
        let authed = token.is_some();

        info!("{} {}", method, url);
        let mut request = self.http.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let err = classify_transport(&e, &url);
            warn!("Request to {} failed: {}", url, e);
            err
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response from {}: {}", url, e)))?;

        if status.is_success() {
            return Ok(text);
        }

        let err = classify_status(status, &text, authed);
        warn!("{} returned {}: {}", url, status, err);
        Err(err)
    }
}

/// Classify a non-2xx response.
///
/// A 401 on a request that carried a bearer token means the stored session is
/// no longer valid (`AuthExpired`); a 401 without one is a credential
/// rejection (`Auth`). Everything else surfaces the server-provided message
/// verbatim when present, else the canonical status reason.
fn classify_status(status: StatusCode, body: &str, authed: bool) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.trim().is_empty());

    if status == StatusCode::UNAUTHORIZED {
        if authed {
            return ApiError::AuthExpired;
        }
        return ApiError::Auth(
            message.unwrap_or_else(|| "Incorrect email or password.".to_string()),
        );
    }

    ApiError::Server {
        status: status.as_u16(),
        message: message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        }),
    }
}

/// Classify a transport-level failure (nothing came back from the server).
fn classify_transport(err: &reqwest::Error, url: &str) -> ApiError {
    if err.is_timeout() {
        ApiError::Network(format!("Request to {} timed out", url))
    } else if err.is_connect() {
        ApiError::Network(format!("Could not connect to {}", url))
    } else {
        ApiError::Network(format!("Request to {} failed: {}", url, err))
    }
}

/// Unwrap a `{ "data": ... }` envelope into the target type.
fn decode_data<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| {
            warn!("Response did not match expected shape: {}", e);
            ApiError::Server {
                status: 200,
                message: "The server returned an unexpected response.".to_string(),
            }
        })
}

fn to_payload<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::Validation(format!("Failed to encode request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Plant;

    #[test]
    fn test_classify_401_with_token_is_auth_expired() {
        let err = classify_status(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "jwt expired"}"#,
            true,
        );
        assert_eq!(err, ApiError::AuthExpired);
    }

    #[test]
    fn test_classify_401_without_token_is_credential_rejection() {
        let err = classify_status(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "Incorrect email or password"}"#,
            false,
        );
        assert_eq!(err, ApiError::Auth("Incorrect email or password".to_string()));
    }

    #[test]
    fn test_classify_server_error_uses_payload_message() {
        let err = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message": "Plant is already in your collection"}"#,
            true,
        );
        assert_eq!(
            err,
            ApiError::Server {
                status: 422,
                message: "Plant is already in your collection".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_server_error_falls_back_to_status_reason() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>", true);
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                message: "Internal Server Error".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_ignores_blank_message() {
        let err = classify_status(StatusCode::BAD_GATEWAY, r#"{"message": "  "}"#, false);
        assert_eq!(
            err,
            ApiError::Server {
                status: 502,
                message: "Bad Gateway".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_data_unwraps_envelope() {
        let body = r#"{"data": {"id": "p1", "name": "Monstera"}}"#;
        let plant: Plant = decode_data(body).unwrap();
        assert_eq!(plant.id, "p1");
        assert_eq!(plant.name, "Monstera");
    }

    #[test]
    fn test_decode_data_rejects_bare_payload() {
        let body = r#"{"id": "p1", "name": "Monstera"}"#;
        let result: Result<Plant, ApiError> = decode_data(body);
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_join_normalizes_slashes() {
        let session = SessionHandle::new();
        let mut config = ClientConfig::default();
        config.base_url = "http://localhost:9000/api/v1/".to_string();
        let client = ApiClient::new(&config, session).unwrap();

        assert_eq!(client.endpoint("/plants"), "http://localhost:9000/api/v1/plants");
        assert_eq!(client.endpoint("plants/7"), "http://localhost:9000/api/v1/plants/7");
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let mut config = ClientConfig::default();
        config.base_url = "not a url".to_string();
        let result = ApiClient::new(&config, SessionHandle::new());
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
