//! Advisory image analysis. Nothing here gates editing; a scan only
//! produces findings and a list of suggested queue entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::transform::TransformError;
use crate::session::registry::CommandId;
use crate::session::settings::SettingValue;
use crate::storage::artifact::ArtifactIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default)]
    pub description: String,
}

/// Analysis service response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(default)]
    pub quality: Option<ImageQuality>,
    #[serde(default)]
    pub faces_detected: u32,
    #[serde(default)]
    pub is_blurry: bool,
    #[serde(default)]
    pub has_damage: bool,
    #[serde(default)]
    pub is_grayscale: bool,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl AnalysisReport {
    /// Findings the service left out are derived from the flags.
    pub fn with_derived_findings(mut self) -> Self {
        if !self.findings.is_empty() {
            return self;
        }
        if self.faces_detected > 0 {
            self.findings.push(Finding {
                kind: FindingKind::Info,
                label: String::from("Faces Detected"),
                score: Some(85),
                description: format!(
                    "{} faces found. Restore details recommended.",
                    self.faces_detected
                ),
            });
        }
        if self.has_damage {
            self.findings.push(Finding {
                kind: FindingKind::Critical,
                label: String::from("Structural Damage"),
                score: Some(92),
                description: String::from("Scratches and defects detected on surface."),
            });
        }
        if self.quality == Some(ImageQuality::Low) {
            self.findings.push(Finding {
                kind: FindingKind::Info,
                label: String::from("Low Resolution"),
                score: None,
                description: String::from("Image quality is below print standards."),
            });
        }
        self
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();
        if self.faces_detected > 0 {
            out.push(Recommendation::flag(CommandId::FaceRestoration));
        }
        if self.has_damage {
            out.push(Recommendation::flag(CommandId::RemoveScratches));
        }
        if self.is_grayscale {
            out.push(Recommendation::flag(CommandId::Colorize));
        }
        if self.quality == Some(ImageQuality::Low) {
            out.push(Recommendation {
                id: CommandId::UpscaleX,
                value: SettingValue::Number(2.0),
            });
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: CommandId,
    pub value: SettingValue,
}

impl Recommendation {
    fn flag(id: CommandId) -> Self {
        Self {
            id,
            value: SettingValue::Flag(true),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis service failed: {0}")]
    Service(#[from] TransformError),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightState {
    pub analyzing: bool,
    pub analyzed: bool,
    #[serde(skip)]
    identity: Option<ArtifactIdentity>,
    pub report: Option<AnalysisReport>,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl InsightState {
    pub fn begin(&mut self, identity: ArtifactIdentity) {
        *self = Self {
            analyzing: true,
            identity: Some(identity),
            ..Self::default()
        };
    }

    /// Returns false when the result belongs to an image that is no
    /// longer the session source; such results are dropped.
    pub fn complete(&mut self, identity: &ArtifactIdentity, report: AnalysisReport) -> bool {
        if self.identity.as_ref() != Some(identity) || !self.analyzing {
            return false;
        }
        let report = report.with_derived_findings();
        self.recommendations = report.recommendations();
        self.report = Some(report);
        self.analyzing = false;
        self.analyzed = true;
        self.last_error = None;
        true
    }

    pub fn fail(&mut self, identity: &ArtifactIdentity, error: &AnalysisError) -> bool {
        if self.identity.as_ref() != Some(identity) || !self.analyzing {
            return false;
        }
        self.analyzing = false;
        self.analyzed = false;
        self.report = None;
        self.recommendations.clear();
        self.last_error = Some(error.to_string());
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn identity(&self) -> Option<&ArtifactIdentity> {
        self.identity.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::artifact::ImageArtifact;
    use pretty_assertions::assert_eq;

    fn identity(bytes: &[u8]) -> ArtifactIdentity {
        ImageArtifact::from_bytes(bytes.to_vec())
            .expect("artifact")
            .identity()
    }

    fn damaged_portrait() -> AnalysisReport {
        AnalysisReport {
            quality: Some(ImageQuality::Low),
            faces_detected: 2,
            is_blurry: true,
            has_damage: true,
            is_grayscale: true,
            findings: Vec::new(),
        }
    }

    #[test]
    fn report_parses_camel_case_wire_format() {
        let report: AnalysisReport = serde_json::from_str(
            r#"{"quality":"medium","facesDetected":1,"isBlurry":false,"hasDamage":false,"isGrayscale":true}"#,
        )
        .expect("report json");
        assert_eq!(report.quality, Some(ImageQuality::Medium));
        assert_eq!(report.faces_detected, 1);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn recommendations_follow_detected_issues() {
        let ids = damaged_portrait()
            .recommendations()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                CommandId::FaceRestoration,
                CommandId::RemoveScratches,
                CommandId::Colorize,
                CommandId::UpscaleX,
            ]
        );
    }

    #[test]
    fn missing_findings_are_derived() {
        let labels = damaged_portrait()
            .with_derived_findings()
            .findings
            .into_iter()
            .map(|f| f.label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Faces Detected", "Structural Damage", "Low Resolution"]);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut state = InsightState::default();
        let old = identity(b"old");
        state.begin(old.clone());
        state.begin(identity(b"new"));

        assert!(!state.complete(&old, damaged_portrait()));
        assert!(state.analyzing);
        assert!(state.report.is_none());
    }

    #[test]
    fn failure_returns_to_unanalyzed_with_error() {
        let mut state = InsightState::default();
        let id = identity(b"img");
        state.begin(id.clone());
        let err = AnalysisError::Service(TransformError::Network(String::from("refused")));

        assert!(state.fail(&id, &err));
        assert!(!state.analyzing);
        assert!(!state.analyzed);
        assert_eq!(
            state.last_error.as_deref(),
            Some("analysis service failed: network error: refused")
        );
    }
}
