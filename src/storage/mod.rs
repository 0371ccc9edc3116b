pub mod artifact;

use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use self::artifact::{ArtifactError, ImageArtifact};

/// Where a session's pristine source image lives.
///
/// The upload/project service owns the record; the session only keeps a
/// stable reference so the source can be re-read on every commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectSource {
    pub project_id: Option<String>,
    pub source_url: Option<String>,
}

impl ProjectSource {
    pub fn from_url(source_url: impl Into<String>) -> Self {
        Self {
            project_id: None,
            source_url: Some(source_url.into()),
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn resolve_url(&self, media_base: &Url) -> Result<Option<Url>, SourceError> {
        self.source_url
            .as_deref()
            .map(|path| resolve_media_url(media_base, path))
            .transpose()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source url '{value}': {message}")]
    InvalidUrl { value: String, message: String },
    #[error("source fetch failed: {0}")]
    Fetch(String),
    #[error("source fetch returned HTTP {status}")]
    Status { status: u16 },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Absolute http(s) URLs pass through; anything else is joined to the media base.
pub fn resolve_media_url(media_base: &Url, path: &str) -> Result<Url, SourceError> {
    let trimmed = path.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Url::parse(trimmed).map_err(|e| SourceError::InvalidUrl {
            value: trimmed.to_string(),
            message: e.to_string(),
        });
    }
    let relative = trimmed.trim_start_matches('/');
    let mut base = media_base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(path.as_str());
    }
    base.join(relative).map_err(|e| SourceError::InvalidUrl {
        value: trimmed.to_string(),
        message: e.to_string(),
    })
}

pub async fn fetch_source_artifact(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<ImageArtifact, SourceError> {
    debug!(%url, "fetching pristine source");
    let resp = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| SourceError::Fetch(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
        });
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| SourceError::Fetch(format!("body read failed: {e}")))?;
    Ok(ImageArtifact::from_bytes(bytes.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://media.fixpix.test/storage").expect("base url")
    }

    #[test]
    fn absolute_urls_pass_through() {
        let url = resolve_media_url(&base(), "https://cdn.example.com/a.png").expect("url");
        assert_eq!(url.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn relative_paths_join_onto_media_base() {
        let a = resolve_media_url(&base(), "/media/originals/a.png").expect("leading slash");
        let b = resolve_media_url(&base(), "media/originals/a.png").expect("no slash");
        assert_eq!(a.as_str(), "https://media.fixpix.test/storage/media/originals/a.png");
        assert_eq!(a, b);
    }

    #[test]
    fn project_source_without_url_resolves_to_none() {
        let source = ProjectSource::default().with_project_id("42");
        assert_eq!(source.resolve_url(&base()).expect("resolve"), None);
        assert_eq!(source.project_id.as_deref(), Some("42"));
    }
}
