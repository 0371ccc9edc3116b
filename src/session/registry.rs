//! Static command catalog: what every tool is, how it reaches the remote
//! API, and which staged tools should not be combined.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pipeline::plan::UPSCALE_FACTORS;
use crate::pipeline::TransformStep;
use crate::session::error::ValidationError;
use crate::session::focus::FocusMode;
use crate::session::settings::SettingValue;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CommandId {
    FaceRestoration,
    RemoveScratches,
    Colorize,
    UpscaleX,
    AutoEnhance,
    RemoveBackground,
    ObjectRemoval,
    GenerativeFill,
    Brightness,
    Contrast,
    Saturation,
    MagicEraser,
    Crop,
}

impl CommandId {
    pub const ALL: [Self; 13] = [
        Self::FaceRestoration,
        Self::RemoveScratches,
        Self::Colorize,
        Self::UpscaleX,
        Self::AutoEnhance,
        Self::RemoveBackground,
        Self::ObjectRemoval,
        Self::GenerativeFill,
        Self::Brightness,
        Self::Contrast,
        Self::Saturation,
        Self::MagicEraser,
        Self::Crop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FaceRestoration => "faceRestoration",
            Self::RemoveScratches => "removeScratches",
            Self::Colorize => "colorize",
            Self::UpscaleX => "upscaleX",
            Self::AutoEnhance => "autoEnhance",
            Self::RemoveBackground => "removeBackground",
            Self::ObjectRemoval => "objectRemoval",
            Self::GenerativeFill => "generativeFill",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturation => "saturation",
            Self::MagicEraser => "magicEraser",
            Self::Crop => "crop",
        }
    }

    pub fn descriptor(self) -> &'static CommandDescriptor {
        &COMMANDS[self as usize]
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == trimmed)
            // Older web clients still send the snake_case eraser id.
            .or_else(|| (trimmed == "magic_eraser").then_some(Self::MagicEraser))
            .ok_or_else(|| ValidationError::UnknownCommand(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Applied to settings immediately.
    Live,
    /// Staged in the pending queue until commit.
    Queued,
    /// Takes over the canvas as a focus mode.
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueKind {
    Flag,
    Number { min: f64, max: f64 },
    /// One of a fixed set of numbers.
    Choice { options: &'static [f64] },
    Text,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDescriptor {
    pub id: CommandId,
    pub label: &'static str,
    pub api_param: Option<&'static str>,
    pub kind: CommandKind,
    pub value_kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<TransformStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FocusMode>,
}

impl CommandDescriptor {
    pub fn conflicts_with(&self) -> BTreeSet<CommandId> {
        CONFLICT_RULES
            .iter()
            .filter_map(|rule| match rule.tools {
                [a, b] if a == self.id => Some(b),
                [a, b] if b == self.id => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn validate_value(&self, value: &SettingValue) -> Result<(), ValidationError> {
        let ok = match (self.value_kind, value) {
            (ValueKind::Flag, SettingValue::Flag(_)) => true,
            (ValueKind::Number { min, max }, SettingValue::Number(v)) => {
                v.is_finite() && *v >= min && *v <= max
            }
            (ValueKind::Choice { options }, SettingValue::Number(v)) => options.contains(v),
            (ValueKind::Text, SettingValue::Text(_)) => true,
            _ => false,
        };
        if ok {
            return Ok(());
        }
        let expected = match self.value_kind {
            ValueKind::Flag => String::from("a boolean"),
            ValueKind::Number { min, max } => format!("a number in {min}..={max}"),
            ValueKind::Choice { options } => format!(
                "one of {}",
                options
                    .iter()
                    .map(|v| SettingValue::Number(*v).to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ValueKind::Text => String::from("a string"),
            ValueKind::None => String::from("no value"),
        };
        Err(ValidationError::InvalidValue {
            id: self.id.to_string(),
            expected,
        })
    }
}

const fn queued(
    id: CommandId,
    label: &'static str,
    api_param: &'static str,
    value_kind: ValueKind,
    badge: Option<&'static str>,
    step: TransformStep,
) -> CommandDescriptor {
    CommandDescriptor {
        id,
        label,
        api_param: Some(api_param),
        kind: CommandKind::Queued,
        value_kind,
        badge,
        step: Some(step),
        mode: None,
    }
}

const fn live(id: CommandId, label: &'static str, api_param: &'static str, min: f64, max: f64) -> CommandDescriptor {
    CommandDescriptor {
        id,
        label,
        api_param: Some(api_param),
        kind: CommandKind::Live,
        value_kind: ValueKind::Number { min, max },
        badge: None,
        step: Some(TransformStep::Adjust),
        mode: None,
    }
}

const fn mode(id: CommandId, label: &'static str, mode: FocusMode) -> CommandDescriptor {
    CommandDescriptor {
        id,
        label,
        api_param: None,
        kind: CommandKind::Mode,
        value_kind: ValueKind::None,
        badge: None,
        step: None,
        mode: Some(mode),
    }
}

// Indexed by `CommandId as usize`; keep in declaration order.
static COMMANDS: [CommandDescriptor; 13] = [
    queued(
        CommandId::FaceRestoration,
        "Face Restoration",
        "faceRestoration",
        ValueKind::Flag,
        Some("GFPGAN"),
        TransformStep::FaceRestore,
    ),
    queued(
        CommandId::RemoveScratches,
        "Scratch Removal",
        "removeScratches",
        ValueKind::Flag,
        None,
        TransformStep::ScratchRemoval,
    ),
    queued(
        CommandId::Colorize,
        "Colorize Photo",
        "colorize",
        ValueKind::Flag,
        Some("DeOldify"),
        TransformStep::Colorize,
    ),
    queued(
        CommandId::UpscaleX,
        "Super Resolution",
        "upscaleX",
        ValueKind::Choice {
            options: &UPSCALE_FACTORS,
        },
        Some("RealESRGAN"),
        TransformStep::Upscale,
    ),
    queued(
        CommandId::AutoEnhance,
        "Auto Enhance",
        "autoEnhance",
        ValueKind::Flag,
        None,
        TransformStep::AutoEnhance,
    ),
    queued(
        CommandId::RemoveBackground,
        "Remove Background",
        "removeBackground",
        ValueKind::Flag,
        Some("AI"),
        TransformStep::BackgroundRemove,
    ),
    queued(
        CommandId::ObjectRemoval,
        "Object Removal",
        "objectRemoval",
        ValueKind::Flag,
        Some("LaMa"),
        TransformStep::Inpaint,
    ),
    queued(
        CommandId::GenerativeFill,
        "Generative Edit",
        "generativeFill",
        ValueKind::Text,
        Some("SDXL"),
        TransformStep::GenerativeEdit,
    ),
    live(CommandId::Brightness, "Brightness", "brightness", 0.5, 1.5),
    live(CommandId::Contrast, "Contrast", "contrast", 0.5, 1.5),
    live(CommandId::Saturation, "Saturation", "saturation", 0.0, 2.0),
    mode(CommandId::MagicEraser, "Magic Eraser", FocusMode::Masking),
    mode(CommandId::Crop, "Crop & Rotate", FocusMode::Cropping),
];

pub fn commands() -> &'static [CommandDescriptor] {
    &COMMANDS
}

pub fn lookup(id: &str) -> Option<&'static CommandDescriptor> {
    id.parse::<CommandId>().ok().map(CommandId::descriptor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRule {
    pub tools: [CommandId; 2],
    pub message: &'static str,
    pub severity: ConflictSeverity,
}

const CONFLICT_RULES: &[ConflictRule] = &[
    ConflictRule {
        tools: [CommandId::Crop, CommandId::UpscaleX],
        message: "Crop before upscaling for best results",
        severity: ConflictSeverity::Warning,
    },
    ConflictRule {
        tools: [CommandId::RemoveBackground, CommandId::Colorize],
        message: "Background removal may affect colorization",
        severity: ConflictSeverity::Info,
    },
];

/// Advisory only; the engine never rejects a commit because of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub tools: [CommandId; 2],
    pub message: &'static str,
    pub severity: ConflictSeverity,
}

pub fn conflicts<I>(active: I) -> Vec<Conflict>
where
    I: IntoIterator<Item = CommandId>,
{
    let active = active.into_iter().collect::<BTreeSet<_>>();
    CONFLICT_RULES
        .iter()
        .filter(|rule| rule.tools.iter().all(|tool| active.contains(tool)))
        .map(|rule| Conflict {
            tools: rule.tools,
            message: rule.message,
            severity: rule.severity,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecipeValue {
    Flag(bool),
    Number(f64),
}

impl From<RecipeValue> for SettingValue {
    fn from(value: RecipeValue) -> Self {
        match value {
            RecipeValue::Flag(v) => SettingValue::Flag(v),
            RecipeValue::Number(v) => SettingValue::Number(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecipeCommand {
    pub id: CommandId,
    pub value: RecipeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recipe {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub commands: &'static [RecipeCommand],
}

const fn on(id: CommandId) -> RecipeCommand {
    RecipeCommand {
        id,
        value: RecipeValue::Flag(true),
    }
}

const fn scale(id: CommandId, factor: f64) -> RecipeCommand {
    RecipeCommand {
        id,
        value: RecipeValue::Number(factor),
    }
}

const RECIPES: &[Recipe] = &[
    Recipe {
        id: "fix_all",
        label: "Magic Fix",
        description: "Auto-detect and fix all issues",
        commands: &[on(CommandId::FaceRestoration), scale(CommandId::UpscaleX, 2.0)],
    },
    Recipe {
        id: "old_photo",
        label: "Old Photo",
        description: "Restore vintage photographs",
        commands: &[
            on(CommandId::FaceRestoration),
            on(CommandId::RemoveScratches),
            on(CommandId::Colorize),
        ],
    },
    Recipe {
        id: "portrait_pro",
        label: "Portrait Pro",
        description: "Enhance portrait photos",
        commands: &[
            on(CommandId::FaceRestoration),
            scale(CommandId::UpscaleX, 2.0),
            on(CommandId::AutoEnhance),
        ],
    },
];

pub fn recipes() -> &'static [Recipe] {
    RECIPES
}

pub fn recipe(id: &str) -> Result<&'static Recipe, ValidationError> {
    RECIPES
        .iter()
        .find(|r| r.id == id.trim())
        .ok_or_else(|| ValidationError::UnknownRecipe(id.trim().to_string()))
}
