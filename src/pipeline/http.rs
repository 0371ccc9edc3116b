use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::pipeline::transform::{
    AnalysisService, TransformError, TransformRequest, TransformResponse, TransformService,
};
use crate::pipeline::TransformStep;
use crate::session::insight::AnalysisReport;
use crate::storage::artifact::ImageArtifact;

/// Path per remote endpoint, joined onto the transform base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPaths {
    pub scratch_removal: String,
    pub face_restore: String,
    pub upscale: String,
    pub colorize: String,
    pub adjust: String,
    pub auto_enhance: String,
    pub background_remove: String,
    pub inpaint: String,
    pub generative_edit: String,
    pub analyze: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            scratch_removal: String::from("/api/v1/image/scratch-removal"),
            face_restore: String::from("/api/v1/images/restore"),
            upscale: String::from("/api/v1/image/super-resolution"),
            colorize: String::from("/api/v1/image/colorize"),
            adjust: String::from("/api/v1/image/adjust"),
            auto_enhance: String::from("/api/v1/image/auto-enhance"),
            background_remove: String::from("/api/v1/image/segment"),
            inpaint: String::from("/api/v1/image/inpaint"),
            generative_edit: String::from("/api/v1/gen/edit"),
            analyze: String::from("/api/v1/image/analyze"),
        }
    }
}

impl EndpointPaths {
    pub fn for_step(&self, step: TransformStep) -> &str {
        match step {
            TransformStep::ScratchRemoval => &self.scratch_removal,
            TransformStep::FaceRestore => &self.face_restore,
            TransformStep::Upscale => &self.upscale,
            TransformStep::Colorize => &self.colorize,
            TransformStep::Adjust => &self.adjust,
            TransformStep::AutoEnhance => &self.auto_enhance,
            TransformStep::BackgroundRemove => &self.background_remove,
            TransformStep::Inpaint => &self.inpaint,
            TransformStep::GenerativeEdit => &self.generative_edit,
        }
    }
}

/// Multipart client for the restoration backend. One instance serves both
/// transform and analysis calls.
#[derive(Debug, Clone)]
pub struct HttpTransformService {
    client: reqwest::Client,
    base_url: Url,
    endpoints: EndpointPaths,
    timeout: Duration,
}

impl HttpTransformService {
    pub fn new(client: reqwest::Client, base_url: Url, endpoints: EndpointPaths, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            endpoints,
            timeout,
        }
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, TransformError> {
        self.base_url
            .join(path)
            .map_err(|e| TransformError::InvalidResponse(format!("invalid endpoint '{path}': {e}")))
    }

    async fn post_form(&self, url: Url, form: multipart::Form) -> Result<Value, TransformError> {
        debug!(%url, "posting transform form");
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransformError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransformError::remote(
                format!("http_{}", status.as_u16()),
                error_detail(body.as_str()),
            ));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| TransformError::InvalidResponse(format!("JSON decode failed: {e}")))
    }
}

fn image_part(artifact: &ImageArtifact, stem: &str) -> Result<multipart::Part, TransformError> {
    let mime = artifact.mime();
    multipart::Part::bytes(artifact.as_bytes().to_vec())
        .file_name(artifact.file_name(stem))
        .mime_str(mime)
        .map_err(|e| TransformError::InvalidResponse(format!("invalid mime '{mime}': {e}")))
}

/// FastAPI puts the reason under `detail`; anything else is passed on raw.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn extract_image(payload: &Value, field: &str) -> Result<ImageArtifact, TransformError> {
    let encoded = payload
        .get(field)
        .or_else(|| payload.get("image"))
        .and_then(Value::as_str)
        .ok_or_else(|| TransformError::InvalidResponse(format!("response is missing '{field}'")))?;
    ImageArtifact::from_base64(encoded).map_err(|e| TransformError::InvalidResponse(e.to_string()))
}

impl TransformService for HttpTransformService {
    fn apply(&self, request: TransformRequest) -> BoxFuture<'_, Result<TransformResponse, TransformError>> {
        Box::pin(async move {
            let step = request.step;
            let url = self.endpoint_url(self.endpoints.for_step(step))?;
            let mut form = multipart::Form::new().part(step.image_field(), image_part(&request.artifact, "input")?);
            if let Some(mask) = request.mask.as_ref() {
                form = form.part("mask", image_part(mask, "mask")?);
            }
            for (key, value) in request.params {
                form = form.text(key, value.to_string());
            }
            let payload = self.post_form(url, form).await?;
            let artifact = extract_image(&payload, step.response_field())?;
            Ok(TransformResponse { artifact })
        })
    }
}

impl AnalysisService for HttpTransformService {
    fn analyze(&self, artifact: ImageArtifact) -> BoxFuture<'_, Result<AnalysisReport, TransformError>> {
        Box::pin(async move {
            let url = self.endpoint_url(self.endpoints.analyze.as_str())?;
            let form = multipart::Form::new().part("file", image_part(&artifact, "input")?);
            let payload = self.post_form(url, form).await?;
            serde_json::from_value(payload)
                .map_err(|e| TransformError::InvalidResponse(format!("analysis decode failed: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detail_is_preferred_over_raw_body() {
        assert_eq!(error_detail(r#"{"detail":"Image too large"}"#), "Image too large");
        assert_eq!(error_detail("gateway timeout\n"), "gateway timeout");
    }

    #[test]
    fn image_is_read_from_the_step_field() {
        let payload = json!({ "restored_image": "data:image/png;base64,aGVsbG8=", "faces_detected": 1 });
        let artifact = extract_image(&payload, "restored_image").expect("image");
        assert_eq!(artifact.as_bytes(), b"hello");
    }

    #[test]
    fn missing_image_field_is_an_invalid_response() {
        let err = extract_image(&json!({ "ok": true }), "cutout_image").expect_err("no image");
        assert_eq!(err.code(), "invalid_response");
    }

    #[test]
    fn every_step_has_an_endpoint() {
        let endpoints = EndpointPaths::default();
        for step in TransformStep::CANONICAL_ORDER {
            assert!(endpoints.for_step(step).starts_with("/api/v1/"));
        }
    }
}
