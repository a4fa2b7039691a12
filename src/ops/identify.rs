use std::cmp::Ordering;
use std::time::Duration;

use base64::Engine;
use serde::Serialize;
use tracing::{info, warn};

use crate::client::PlantMateClient;
use crate::error::ApiError;
use crate::models::IdentificationMatch;

#[derive(Debug, Serialize)]
struct IdentifyRequest<'a> {
    image: &'a str,
}

impl PlantMateClient {
    /// Identify a plant species from a photo. Returns matches ranked by
    /// confidence, best first.
    pub async fn identify_species(&self, image: &[u8]) -> Result<Vec<IdentificationMatch>, ApiError> {
        self.identify(image, "species").await
    }

    /// Identify a plant disease from a photo.
    pub async fn identify_disease(&self, image: &[u8]) -> Result<Vec<IdentificationMatch>, ApiError> {
        self.identify(image, "disease").await
    }

    /// Upload a base64-encoded image to the ML service. The service is an
    /// opaque collaborator: unauthenticated, its own base URL, its own
    /// (longer) timeout, and not routed through the query cache.
    async fn identify(&self, image: &[u8], kind: &str) -> Result<Vec<IdentificationMatch>, ApiError> {
        if image.is_empty() {
            return Err(ApiError::Validation("No image data provided.".to_string()));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let url = format!(
            "{}/{}",
            self.config().ml_base_url.trim_end_matches('/'),
            kind
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config().identify_timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        info!("Uploading {} bytes to {} for identification", image.len(), url);
        let response = client
            .post(&url)
            .json(&IdentifyRequest { image: &encoded })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Network(format!("Identification request to {} timed out", url))
                } else {
                    ApiError::Network(format!("Identification request to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read identification response: {}", e)))?;

        if !status.is_success() {
            warn!("Identification service returned {} for {}", status, url);
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: "Identification failed. Please try another photo.".to_string(),
            });
        }

        parse_matches(&text)
    }
}

/// The ML service has answered with a bare array, a `{"data": [...]}`
/// wrapper, and a `{"predictions": [...]}` wrapper across model versions;
/// accept all three and rank by confidence.
fn parse_matches(body: &str) -> Result<Vec<IdentificationMatch>, ApiError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        warn!("Identification response was not JSON: {}", e);
        ApiError::Server {
            status: 200,
            message: "The identification service returned an unexpected response.".to_string(),
        }
    })?;

    let list = if value.is_array() {
        value
    } else if let Some(data) = value.get("data") {
        data.clone()
    } else if let Some(predictions) = value.get("predictions") {
        predictions.clone()
    } else {
        return Err(ApiError::Server {
            status: 200,
            message: "The identification service returned an unexpected response.".to_string(),
        });
    };

    let mut matches: Vec<IdentificationMatch> = serde_json::from_value(list).map_err(|e| {
        warn!("Identification matches did not parse: {}", e);
        ApiError::Server {
            status: 200,
            message: "The identification service returned an unexpected response.".to_string(),
        }
    })?;

    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array_sorted_by_confidence() {
        let body = r#"[
            {"class_name": "Ficus", "confidence": 0.2},
            {"class_name": "Monstera deliciosa", "confidence": 0.9},
            {"class_name": "Pothos", "confidence": 0.5}
        ]"#;
        let matches = parse_matches(body).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].class_name, "Monstera deliciosa");
        assert_eq!(matches[2].class_name, "Ficus");
    }

    #[test]
    fn test_parse_data_wrapper() {
        let body = r#"{"data": [{"class": "Leaf spot", "confidence": 0.7}]}"#;
        let matches = parse_matches(body).unwrap();
        assert_eq!(matches[0].class_name, "Leaf spot");
    }

    #[test]
    fn test_parse_predictions_wrapper() {
        let body = r#"{"predictions": [{"class_name": "Rust", "confidence": 0.4}]}"#;
        let matches = parse_matches(body).unwrap();
        assert_eq!(matches[0].class_name, "Rust");
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        assert!(parse_matches(r#"{"results": []}"#).is_err());
        assert!(parse_matches("not json").is_err());
    }
}
