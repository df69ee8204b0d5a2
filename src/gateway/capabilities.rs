//! One async function per ML capability offered to the host API.

use std::sync::Arc;

use serde_json::json;

use crate::config::schema::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::orchestrator::{Execution, Orchestrator, RequestContext};
use crate::gateway::registry::Registry;
use crate::gateway::transport::{
    FileUpload, FormPart, HttpTransport, OutboundRequest, RequestBody, Retrying, Transport,
};
use crate::resilience::RetryHandler;
use crate::validation::schema::{
    APP_CRAWLER, CATEGORIZE, COMPLAINT, DEEPFAKE, IDENTITY, TRANSCRIBE, VERIFY,
};
use crate::validation::Envelope;

/// Media for a multi-modal identity check.
#[derive(Debug, Clone)]
pub struct IdentityVerificationRequest {
    pub video: FileUpload,
    pub audio: FileUpload,
    pub document: FileUpload,
}

/// Exactly one way of pointing the crawler at an app.
#[derive(Debug, Clone)]
pub enum AppVerificationRequest {
    PlayStoreLink(String),
    PackageName(String),
    Apk(FileUpload),
}

impl AppVerificationRequest {
    fn into_part(self) -> FormPart {
        match self {
            AppVerificationRequest::PlayStoreLink(link) => FormPart::text("playstore_link", link),
            AppVerificationRequest::PackageName(name) => FormPart::text("package_name", name),
            AppVerificationRequest::Apk(upload) => FormPart::file("apk_file", upload),
        }
    }
}

/// Upstream entry point. Every method resolves to an [`Envelope`].
#[derive(Clone)]
pub struct MlGateway {
    orchestrator: Orchestrator,
    transport: Arc<dyn Transport>,
}

impl MlGateway {
    pub fn new(orchestrator: Orchestrator, transport: Arc<dyn Transport>) -> Self {
        Self {
            orchestrator,
            transport,
        }
    }

    /// Gateway over HTTP with the configured retry policy.
    pub fn http(registry: Arc<Registry>, config: &GatewayConfig) -> Result<Self> {
        let transport = Retrying::new(
            HttpTransport::new(config.timeouts.clone())?,
            RetryHandler::new(config.retries.clone()),
        );
        Ok(Self::new(Orchestrator::new(registry), Arc::new(transport)))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn categorize_text(&self, text: &str, ctx: RequestContext) -> Envelope {
        let body = RequestBody::Json(json!({ "text": text }));
        self.call(COMPLAINT, CATEGORIZE, "/api/v1/categorize", body, ctx)
            .await
            .envelope
    }

    pub async fn transcribe_audio(&self, audio: FileUpload, ctx: RequestContext) -> Envelope {
        let body = RequestBody::Multipart(vec![FormPart::file("audio", audio)]);
        self.call(COMPLAINT, TRANSCRIBE, "/transcribe", body, ctx)
            .await
            .envelope
    }

    pub async fn detect_deepfake(&self, video: FileUpload, ctx: RequestContext) -> Envelope {
        let body = RequestBody::Multipart(vec![FormPart::file("video", video)]);
        self.call(COMPLAINT, DEEPFAKE, "/detect/deepfake", body, ctx)
            .await
            .envelope
    }

    pub async fn verify_identity(
        &self,
        request: IdentityVerificationRequest,
        ctx: RequestContext,
    ) -> Envelope {
        let body = RequestBody::Multipart(vec![
            FormPart::file("video", request.video),
            FormPart::file("audio", request.audio),
            FormPart::file("document", request.document),
        ]);
        self.call(IDENTITY, VERIFY, "/verify", body, ctx).await.envelope
    }

    pub async fn verify_app(&self, request: AppVerificationRequest, ctx: RequestContext) -> Envelope {
        let body = RequestBody::Multipart(vec![request.into_part()]);
        self.call(APP_CRAWLER, VERIFY, "/app/verify", body, ctx)
            .await
            .envelope
    }

    /// Shared path for every capability; exposes the outcome as well.
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        path: &str,
        body: RequestBody,
        ctx: RequestContext,
    ) -> Execution {
        let descriptor = self.orchestrator.registry().descriptor(service).cloned();
        let transport = Arc::clone(&self.transport);
        let correlation_id = ctx.correlation_id.clone();

        self.orchestrator
            .execute(service, operation, &ctx, || async move {
                // Only reachable if the health gate admits a name the
                // registry does not know.
                let Some(service_descriptor) = descriptor else {
                    return Err(GatewayError::ServiceUnavailable {
                        service: service.to_string(),
                        reason: "service is not configured".to_string(),
                    });
                };
                let request = OutboundRequest {
                    service: service_descriptor,
                    path: path.to_string(),
                    body,
                    correlation_id,
                };
                transport.send(&request).await
            })
            .await
    }
}
