use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::pipeline::TransformStep;
use crate::session::insight::AnalysisReport;
use crate::session::settings::SettingValue;
use crate::storage::artifact::ImageArtifact;

/// Structured failure from a remote transform or analysis call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{code}: {message}")]
    Remote { code: String, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransformError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Network(_) => "network_error",
            Self::Remote { code, .. } => code.as_str(),
            Self::InvalidResponse(_) => "invalid_response",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Network(message) | Self::InvalidResponse(message) => message.clone(),
            Self::Remote { message, .. } => message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub step: TransformStep,
    pub artifact: ImageArtifact,
    pub mask: Option<ImageArtifact>,
    pub params: Vec<(String, SettingValue)>,
}

#[derive(Debug, Clone)]
pub struct TransformResponse {
    pub artifact: ImageArtifact,
}

/// One endpoint per step, bytes in and bytes out.
pub trait TransformService: Send + Sync {
    fn apply(&self, request: TransformRequest) -> BoxFuture<'_, Result<TransformResponse, TransformError>>;
}

pub trait AnalysisService: Send + Sync {
    fn analyze(&self, artifact: ImageArtifact) -> BoxFuture<'_, Result<AnalysisReport, TransformError>>;
}

pub type SharedTransformService = Arc<dyn TransformService>;
pub type SharedAnalysisService = Arc<dyn AnalysisService>;
