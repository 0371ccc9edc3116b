pub mod engine;
pub mod http;
pub mod plan;
pub mod transform;

use std::fmt;

use serde::{Deserialize, Serialize};

/// One remote transformation kind. Declaration order is the canonical
/// execution order: a plan always runs its steps in this sequence no matter
/// how the user staged them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransformStep {
    ScratchRemoval,
    FaceRestore,
    Upscale,
    Colorize,
    Adjust,
    AutoEnhance,
    BackgroundRemove,
    Inpaint,
    GenerativeEdit,
}

/// Which artifact a step wants as the head of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Restart from the untouched upload.
    Pristine,
    /// Continue from the last published result.
    RunningResult,
}

impl TransformStep {
    pub const CANONICAL_ORDER: [Self; 9] = [
        Self::ScratchRemoval,
        Self::FaceRestore,
        Self::Upscale,
        Self::Colorize,
        Self::Adjust,
        Self::AutoEnhance,
        Self::BackgroundRemove,
        Self::Inpaint,
        Self::GenerativeEdit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScratchRemoval => "scratch_removal",
            Self::FaceRestore => "face_restore",
            Self::Upscale => "upscale",
            Self::Colorize => "colorize",
            Self::Adjust => "adjust",
            Self::AutoEnhance => "auto_enhance",
            Self::BackgroundRemove => "background_remove",
            Self::Inpaint => "inpaint",
            Self::GenerativeEdit => "generative_edit",
        }
    }

    /// 1-based position in the canonical order.
    pub fn priority(self) -> usize {
        Self::CANONICAL_ORDER
            .iter()
            .position(|step| *step == self)
            .map_or(usize::MAX, |idx| idx + 1)
    }

    pub fn seed_policy(self) -> SeedPolicy {
        match self {
            Self::Inpaint => SeedPolicy::RunningResult,
            _ => SeedPolicy::Pristine,
        }
    }

    /// Settings key that switches the step on.
    pub fn api_param(self) -> &'static str {
        match self {
            Self::ScratchRemoval => "removeScratches",
            Self::FaceRestore => "faceRestoration",
            Self::Upscale => "upscaleX",
            Self::Colorize => "colorize",
            Self::Adjust => "adjust",
            Self::AutoEnhance => "autoEnhance",
            Self::BackgroundRemove => "removeBackground",
            Self::Inpaint => "objectRemoval",
            Self::GenerativeEdit => "generativeFill",
        }
    }

    /// Multipart field name the remote endpoint expects the image under.
    pub fn image_field(self) -> &'static str {
        match self {
            Self::FaceRestore | Self::Upscale => "file",
            _ => "image",
        }
    }

    /// JSON field holding the base64 result image.
    pub fn response_field(self) -> &'static str {
        match self {
            Self::FaceRestore => "restored_image",
            Self::Upscale => "upscaled_image",
            Self::Colorize => "colorized_image",
            Self::BackgroundRemove => "cutout_image",
            Self::Inpaint => "repaired_image",
            Self::ScratchRemoval | Self::Adjust | Self::AutoEnhance | Self::GenerativeEdit => {
                "image"
            }
        }
    }
}

impl fmt::Display for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
