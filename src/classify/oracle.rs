// src/classify/oracle.rs
//
// Remote classification oracle. One POST per file carrying every column
// name plus a handful of sample rows; the response maps columns to roles
// and may also name the identity column and an error-extraction column.
// Any failure here is recoverable: callers degrade to fallback_role.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::OracleConfig;

/// Column batch sent to the oracle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    pub column_names: Vec<String>,
    pub sample_rows: Vec<BTreeMap<String, String>>,
}

/// Oracle verdict. Role values arrive as free strings and are validated
/// against the closed role enum by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    #[serde(default)]
    pub classifications: BTreeMap<String, String>,
    #[serde(default)]
    pub identity_column: Option<String>,
    #[serde(default)]
    pub error_extraction_column: Option<String>,
}

/// Never surfaced past classification: both variants degrade to the
/// local fallback.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("oracle response malformed: {0}")]
    Malformed(String),
}

pub trait RoleOracle: Send + Sync {
    fn classify(
        &self,
        request: &ClassifyRequest,
    ) -> impl Future<Output = Result<ClassifyResponse, OracleError>> + Send;
}

/// HTTP oracle client. Cheap to clone per run; the underlying connection
/// pool is shared.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: Url,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(endpoint: Url, auth_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            auth_token,
            timeout,
        }
    }

    /// Build from config; `Ok(None)` when no endpoint is configured.
    pub fn from_config(config: &OracleConfig) -> anyhow::Result<Option<Self>> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid oracle endpoint: {endpoint}"))?;
        Ok(Some(Self::new(
            endpoint,
            config.auth_token.clone(),
            config.timeout(),
        )))
    }
}

impl RoleOracle for HttpOracle {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, OracleError> {
        let mut call = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(request);
        if let Some(token) = &self.auth_token {
            call = call.bearer_auth(token);
        }
        let response = call.send().await?.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| OracleError::Malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let mut row = BTreeMap::new();
        row.insert("CPU_SN".to_string(), "9AB123456789_100-000000001".to_string());
        let request = ClassifyRequest {
            column_names: vec!["CPU_SN".into(), "Failtype".into()],
            sample_rows: vec![row],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("columnNames").is_some());
        assert!(value.get("sampleRows").is_some());
        assert_eq!(value["columnNames"][0], "CPU_SN");
    }

    #[test]
    fn response_parses_with_optional_fields_missing() {
        let parsed: ClassifyResponse =
            serde_json::from_str(r#"{"classifications":{"CPU_SN":"IDENTITY"}}"#).unwrap();
        assert_eq!(parsed.classifications["CPU_SN"], "IDENTITY");
        assert!(parsed.identity_column.is_none());
        assert!(parsed.error_extraction_column.is_none());
    }

    #[test]
    fn response_parses_full_payload() {
        let parsed: ClassifyResponse = serde_json::from_str(
            r#"{
                "classifications": {"CPU_SN": "IDENTITY", "Failtype": "ERROR_TYPE"},
                "identityColumn": "CPU_SN",
                "errorExtractionColumn": null
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.identity_column.as_deref(), Some("CPU_SN"));
        assert!(parsed.error_extraction_column.is_none());
    }

    #[test]
    fn endpointless_config_builds_no_oracle() {
        let config = OracleConfig::default();
        assert!(HttpOracle::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn bad_endpoint_is_an_error() {
        let config = OracleConfig {
            endpoint: Some("not a url".into()),
            ..OracleConfig::default()
        };
        assert!(HttpOracle::from_config(&config).is_err());
    }
}
