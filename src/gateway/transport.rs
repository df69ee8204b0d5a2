//! Outbound calls to ML task endpoints.
//!
//! [`HttpTransport`] makes exactly one attempt per `send`; retries are added
//! by wrapping it in [`Retrying`] when the client is built.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::config::schema::{ServiceDescriptor, TimeoutConfig};
use crate::error::{GatewayError, Result};
use crate::observability::tracing::REQUEST_ID_HEADER;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::RetryHandler;

pub const API_KEY_HEADER: &str = "x-api-key";

/// A file sent as one multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, upload: FileUpload },
}

impl FormPart {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        FormPart::Text {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn file(name: &str, upload: FileUpload) -> Self {
        FormPart::File {
            name: name.to_string(),
            upload,
        }
    }
}

/// Request body. Kept as plain data so every attempt can rebuild it.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub service: ServiceDescriptor,
    pub path: String,
    pub body: RequestBody,
    pub correlation_id: String,
}

impl OutboundRequest {
    pub fn url(&self) -> Result<url::Url> {
        let raw = format!("{}{}", self.service.base_url.trim_end_matches('/'), self.path);
        url::Url::parse(&raw).map_err(|e| GatewayError::Request(format!("{raw}: {e}")))
    }
}

/// Sends one request and returns the decoded JSON body of a 2xx response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeouts: TimeoutConfig,
}

impl HttpTransport {
    pub fn new(timeouts: TimeoutConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self { client, timeouts })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<Value> {
        let url = request.url()?;
        let timeout = self.timeouts.inference();

        with_timeout(timeout, async {
            let mut builder = self
                .client
                .post(url)
                .header(REQUEST_ID_HEADER, &request.correlation_id);
            if !request.service.api_key.is_empty() {
                builder = builder.header(API_KEY_HEADER, &request.service.api_key);
            }
            builder = match &request.body {
                RequestBody::Json(value) => builder.json(value),
                RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
            };

            let response = builder
                .send()
                .await
                .map_err(|e| GatewayError::from_reqwest(e, timeout))?;

            let status = response.status();
            if !status.is_success() {
                tracing::debug!(
                    service = %request.service.name,
                    status = status.as_u16(),
                    "ML service returned error status"
                );
                return Err(GatewayError::from_status(status.as_u16()));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| match GatewayError::from_reqwest(e, timeout) {
                    err @ (GatewayError::Timeout(_) | GatewayError::Network { .. }) => err,
                    other => GatewayError::Decode(other.to_string()),
                })
        })
        .await
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File { name, upload } => {
                let file = Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.content_type)
                    .map_err(|e| GatewayError::Request(e.to_string()))?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Decorator adding [`RetryHandler`] semantics to any transport.
pub struct Retrying<T> {
    inner: T,
    retry: RetryHandler,
}

impl<T: Transport> Retrying<T> {
    pub fn new(inner: T, retry: RetryHandler) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl<T: Transport> Transport for Retrying<T> {
    async fn send(&self, request: &OutboundRequest) -> Result<Value> {
        self.retry.execute(|| self.inner.send(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RetryConfig, ServiceConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn send(&self, _request: &OutboundRequest) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GatewayError::Server { status: 503 })
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    fn request(base_url: &str) -> OutboundRequest {
        OutboundRequest {
            service: ServiceConfig::new("complaint", base_url, false),
            path: "/api/v1/categorize".to_string(),
            body: RequestBody::Json(serde_json::json!({"text": "hello"})),
            correlation_id: "abc".to_string(),
        }
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let url = request("http://ml.internal:5000/complaint/").url().unwrap();
        assert_eq!(url.as_str(), "http://ml.internal:5000/complaint/api/v1/categorize");

        assert!(matches!(request("not a url").url(), Err(GatewayError::Request(_))));
    }

    #[test]
    fn test_build_form_rejects_bad_mime() {
        let parts = vec![FormPart::file("audio", FileUpload::new("a.wav", "not a mime", vec![1]))];
        assert!(build_form(&parts).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_decorator() {
        let transport = Retrying::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            RetryHandler::new(RetryConfig::default()),
        );

        let value = transport.send(&request("http://localhost:5000")).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 3);
    }
}
