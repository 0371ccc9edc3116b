use serde::Serialize;

use crate::pipeline::{SeedPolicy, TransformStep};
use crate::session::error::ValidationError;
use crate::session::settings::{SettingValue, SettingsPatch, SettingsSnapshot};

pub const DEFAULT_UPSCALE_CAP: f64 = 4.0;

/// Scale factors the super-resolution model supports. `1` means off.
pub const UPSCALE_FACTORS: [f64; 3] = [1.0, 2.0, 4.0];

const ADJUST_KEYS: [&str; 3] = ["brightness", "contrast", "saturation"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub step: TransformStep,
    /// Form fields sent alongside the image, in send order.
    pub params: Vec<(String, SettingValue)>,
}

impl PlannedStep {
    fn new(step: TransformStep) -> Self {
        Self {
            step,
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &str, value: impl Into<SettingValue>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformPlan {
    pub steps: Vec<PlannedStep>,
}

impl TransformPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn step_ids(&self) -> Vec<TransformStep> {
        self.steps.iter().map(|s| s.step).collect()
    }

    /// Where the chain starts. Only a plan made entirely of
    /// running-result steps continues from the published image.
    pub fn seed_policy(&self) -> SeedPolicy {
        if !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.step.seed_policy() == SeedPolicy::RunningResult)
        {
            SeedPolicy::RunningResult
        } else {
            SeedPolicy::Pristine
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    pub upscale_cap: f64,
    pub has_mask: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            upscale_cap: DEFAULT_UPSCALE_CAP,
            has_mask: false,
        }
    }
}

/// Committed snapshot with the staged queue laid over it.
pub fn effective_parameters(snapshot: &SettingsSnapshot, staged: &SettingsPatch) -> SettingsSnapshot {
    snapshot.merged(staged)
}

fn number_or(params: &SettingsSnapshot, key: &str, fallback: f64) -> f64 {
    params.number(key).unwrap_or(fallback)
}

/// Builds the canonical-order plan. Staging order never matters: steps are
/// visited in `CANONICAL_ORDER` and emitted only when enabled.
pub fn build_plan(params: &SettingsSnapshot, options: PlanOptions) -> Result<TransformPlan, ValidationError> {
    let mut steps = Vec::new();
    for step in TransformStep::CANONICAL_ORDER {
        let planned = match step {
            TransformStep::ScratchRemoval
            | TransformStep::Colorize
            | TransformStep::AutoEnhance
            | TransformStep::FaceRestore
            | TransformStep::BackgroundRemove => {
                if !params.flag(step.api_param()) {
                    continue;
                }
                match step {
                    TransformStep::FaceRestore => PlannedStep::new(step)
                        .param("mode", "quality")
                        .param("upscale", true)
                        .param("fidelity", 0.5),
                    TransformStep::Colorize => PlannedStep::new(step).param("render_factor", 35.0),
                    TransformStep::BackgroundRemove => PlannedStep::new(step)
                        .param("mode", "auto")
                        .param("return_type", "transparent"),
                    _ => PlannedStep::new(step),
                }
            }
            TransformStep::Upscale => {
                let requested = number_or(params, step.api_param(), 1.0).min(options.upscale_cap);
                // Largest supported factor that does not exceed the request.
                let Some(scale) = UPSCALE_FACTORS
                    .into_iter()
                    .filter(|factor| *factor <= requested)
                    .reduce(f64::max)
                    .filter(|factor| *factor > 1.0)
                else {
                    continue;
                };
                PlannedStep::new(step).param("scale", scale)
            }
            TransformStep::Adjust => {
                let values = ADJUST_KEYS.map(|key| (key, number_or(params, key, 1.0)));
                if values.iter().all(|(_, v)| (*v - 1.0).abs() < f64::EPSILON) {
                    continue;
                }
                values
                    .into_iter()
                    .fold(PlannedStep::new(step), |planned, (key, v)| planned.param(key, v))
            }
            TransformStep::Inpaint => {
                if !params.flag(step.api_param()) {
                    continue;
                }
                if !options.has_mask {
                    return Err(ValidationError::MissingMask);
                }
                PlannedStep::new(step).param("mode", "fast")
            }
            TransformStep::GenerativeEdit => {
                let Some(value) = params.get(step.api_param()) else {
                    continue;
                };
                let prompt = match value {
                    SettingValue::Text(text) => text.trim(),
                    SettingValue::Flag(false) => continue,
                    _ => "",
                };
                if prompt.is_empty() {
                    return Err(ValidationError::EmptyPrompt);
                }
                PlannedStep::new(step)
                    .param("mode", "img2img")
                    .param("prompt", prompt)
            }
        };
        steps.push(planned);
    }
    Ok(TransformPlan { steps })
}
