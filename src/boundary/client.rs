//! Model Server Client
//!
//! One synchronous JSON call per generation: `POST /generate` on the selected
//! model's server. A 200 means the server has written the OUTPUT payload into
//! the shared cache. Anything else carries a base64-encoded message.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::boundary::ModelDescriptor;
use crate::error::{Result, VoiceCacheError};

// == Wire Types ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInputs {
    #[serde(rename = "User Text")]
    pub user_text: Option<String>,
    /// PREPROCESSED hash of the user audio
    #[serde(rename = "User Audio")]
    pub user_audio: Option<String>,
}

/// Body of a generate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    #[serde(rename = "Inputs")]
    pub inputs: ModelInputs,
    #[serde(rename = "Options")]
    pub options: Map<String, Value>,
    /// OUTPUT hash the server must write
    #[serde(rename = "Output File")]
    pub output_file: String,
    #[serde(rename = "Session ID")]
    pub session_id: Option<String>,
    /// Accelerator index, or an empty string when none is assigned
    #[serde(rename = "GPU ID")]
    pub gpu_id: Value,
}

impl ModelRequest {
    pub fn gpu_id_value(gpu_id: Option<usize>) -> Value {
        match gpu_id {
            Some(id) => Value::from(id),
            None => Value::String(String::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// == Boundary Port ==
#[async_trait]
pub trait ModelBoundary: Send + Sync {
    /// Asks the model server to produce `request.output_file`.
    async fn generate(&self, model: &ModelDescriptor, request: &ModelRequest) -> Result<()>;
}

// == HTTP Client ==
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    /// Replaces `<model-id>_server` for every model when set
    host_override: Option<String>,
    /// Replaces every model's own port when set
    port_override: Option<u16>,
    timeout: Duration,
}

impl HttpModelClient {
    pub fn new(host_override: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            host_override,
            port_override: None,
            timeout,
        }
    }

    /// Sends every call to `port`, e.g. a single local stand-in server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }

    /// `http://<model-id>_server:<port>/generate`, or the override host.
    pub fn endpoint(&self, model: &ModelDescriptor) -> String {
        let port = self.port_override.unwrap_or(model.port);
        match &self.host_override {
            Some(host) => format!("http://{}:{}/generate", host, port),
            None => format!("http://{}_server:{}/generate", model.id, port),
        }
    }
}

/// Decodes the `{"message": "<base64>"}` body of a failed call.
pub fn decode_error_message(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    let bytes = STANDARD.decode(parsed.message.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl ModelBoundary for HttpModelClient {
    async fn generate(&self, model: &ModelDescriptor, request: &ModelRequest) -> Result<()> {
        let url = self.endpoint(model);
        debug!("POST {} for output {}", url, request.output_file);

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceCacheError::Timeout(self.timeout.as_secs())
                } else {
                    VoiceCacheError::ExternalInvocationFailure(format!(
                        "could not reach {}: {}",
                        url, e
                    ))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 200 {
            return Ok(());
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = decode_error_message(&body).unwrap_or_else(|| {
            format!("{} answered with status {} and no readable message", model.id, status)
        });
        warn!("Model server {} failed with status {}", model.id, status);
        Err(VoiceCacheError::ExternalInvocationFailure(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::RVC;
    use serde_json::json;

    #[test]
    fn test_endpoint_from_model_id() {
        let client = HttpModelClient::new(None, Duration::from_secs(1));
        assert_eq!(client.endpoint(&RVC), "http://rvc_server:6578/generate");

        let client = HttpModelClient::new(Some("127.0.0.1".into()), Duration::from_secs(1));
        assert_eq!(client.endpoint(&RVC), "http://127.0.0.1:6578/generate");

        let client = client.with_port(9000);
        assert_eq!(client.endpoint(&RVC), "http://127.0.0.1:9000/generate");
    }

    #[test]
    fn test_request_wire_format() {
        let request = ModelRequest {
            inputs: ModelInputs {
                user_text: Some("Hello".into()),
                user_audio: None,
            },
            options: Map::new(),
            output_file: "abc".into(),
            session_id: None,
            gpu_id: ModelRequest::gpu_id_value(None),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "Inputs": {"User Text": "Hello", "User Audio": null},
                "Options": {},
                "Output File": "abc",
                "Session ID": null,
                "GPU ID": ""
            })
        );
        assert_eq!(ModelRequest::gpu_id_value(Some(2)), json!(2));
    }

    #[test]
    fn test_decode_error_message() {
        let body = json!({"message": STANDARD.encode("model crashed")}).to_string();
        assert_eq!(decode_error_message(body.as_bytes()).as_deref(), Some("model crashed"));
        assert_eq!(decode_error_message(b"<html>"), None);
        assert_eq!(decode_error_message(br#"{"message": "%%%"}"#), None);
    }
}
