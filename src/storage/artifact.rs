use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Opaque image payload threaded through the transform pipeline.
///
/// The bytes are immutable once wrapped: a step that "changes" the image
/// produces a new artifact, so the pristine source can always be re-read.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    bytes: Arc<[u8]>,
}

/// Content identity of an artifact (lowercase SHA-256 hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactIdentity(String);

impl ArtifactIdentity {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("image payload is empty")]
    Empty,
    #[error("image base64 decode failed: {0}")]
    Base64(String),
}

impl ImageArtifact {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, ArtifactError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ArtifactError::Empty);
        }
        Ok(Self {
            bytes: Arc::from(bytes),
        })
    }

    /// Accepts bare base64 or a `data:<mime>;base64,` URL.
    pub fn from_base64(value: &str) -> Result<Self, ArtifactError> {
        let trimmed = value.trim();
        let payload = match trimmed.split_once("base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => trimmed,
        };
        let bytes = BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ArtifactError::Base64(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn identity(&self) -> ArtifactIdentity {
        let digest = Sha256::digest(self.as_bytes());
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(format!("{byte:02x}").as_str());
        }
        ArtifactIdentity(out)
    }

    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(self.as_bytes()).ok()
    }

    pub fn mime(&self) -> &'static str {
        match self.format() {
            Some(ImageFormat::Png) => "image/png",
            Some(ImageFormat::Jpeg) => "image/jpeg",
            Some(ImageFormat::WebP) => "image/webp",
            Some(ImageFormat::Bmp) => "image/bmp",
            Some(ImageFormat::Tiff) => "image/tiff",
            _ => "application/octet-stream",
        }
    }

    pub fn file_name(&self, stem: &str) -> String {
        let ext = match self.format() {
            Some(ImageFormat::Png) => "png",
            Some(ImageFormat::Jpeg) => "jpg",
            Some(ImageFormat::WebP) => "webp",
            Some(ImageFormat::Bmp) => "bmp",
            Some(ImageFormat::Tiff) => "tiff",
            _ => "bin",
        };
        format!("{stem}.{ext}")
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("len", &self.len())
            .field("mime", &self.mime())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    #[test]
    fn rejects_empty_payload() {
        let err = ImageArtifact::from_bytes(Vec::new()).expect_err("empty should fail");
        assert_eq!(err, ArtifactError::Empty);
    }

    #[test]
    fn decodes_data_url_and_bare_base64_to_same_bytes() {
        let artifact = ImageArtifact::from_bytes(PNG_MAGIC.to_vec()).expect("artifact");
        let bare = artifact.to_base64();
        let data_url = format!("data:image/png;base64,{bare}");

        let a = ImageArtifact::from_base64(bare.as_str()).expect("bare base64");
        let b = ImageArtifact::from_base64(data_url.as_str()).expect("data url");
        assert_eq!(a, b);
        assert_eq!(a, artifact);
    }

    #[test]
    fn sniffs_png_mime_and_file_name() {
        let artifact = ImageArtifact::from_bytes(PNG_MAGIC.to_vec()).expect("artifact");
        assert_eq!(artifact.mime(), "image/png");
        assert_eq!(artifact.file_name("source"), "source.png");
    }

    #[test]
    fn identity_tracks_content_not_allocation() {
        let a = ImageArtifact::from_bytes(b"one".to_vec()).expect("a");
        let b = ImageArtifact::from_bytes(b"one".to_vec()).expect("b");
        let c = ImageArtifact::from_bytes(b"two".to_vec()).expect("c");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().as_str().len(), 64);
        assert_eq!(a.mime(), "application/octet-stream");
    }
}
