use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::error::ValidationError;
use crate::session::registry::CommandId;

/// Canvas interaction mode. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    #[default]
    None,
    Masking,
    Cropping,
}

impl FocusMode {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "masking" | "eraser" | "magic_eraser" | "magiceraser" => Ok(Self::Masking),
            "cropping" | "crop" => Ok(Self::Cropping),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Masking => "masking",
            Self::Cropping => "cropping",
        }
    }

    /// Registry command that activates this mode.
    pub fn command(self) -> Option<CommandId> {
        match self {
            Self::None => None,
            Self::Masking => Some(CommandId::MagicEraser),
            Self::Cropping => Some(CommandId::Crop),
        }
    }
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeTransition {
    pub previous: FocusMode,
    pub current: FocusMode,
}

impl ModeTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Clone, Default)]
pub struct FocusModeController {
    active: FocusMode,
}

impl FocusModeController {
    pub fn active(&self) -> FocusMode {
        self.active
    }

    /// Switching between two modes goes straight across; there is no
    /// intermediate `None` state to observe.
    pub fn enter(&mut self, mode: FocusMode) -> ModeTransition {
        let previous = std::mem::replace(&mut self.active, mode);
        ModeTransition {
            previous,
            current: mode,
        }
    }

    pub fn exit(&mut self) -> ModeTransition {
        self.enter(FocusMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_masking_from_cropping_switches_directly() {
        let mut controller = FocusModeController::default();
        controller.enter(FocusMode::Cropping);

        let transition = controller.enter(FocusMode::Masking);

        assert_eq!(
            transition,
            ModeTransition {
                previous: FocusMode::Cropping,
                current: FocusMode::Masking,
            }
        );
        assert_eq!(controller.active(), FocusMode::Masking);
    }

    #[test]
    fn exit_returns_to_none_and_is_repeatable() {
        let mut controller = FocusModeController::default();
        controller.enter(FocusMode::Masking);
        assert!(controller.exit().changed());
        assert!(!controller.exit().changed());
        assert_eq!(controller.active(), FocusMode::None);
    }

    #[test]
    fn parse_accepts_command_aliases() {
        assert_eq!(FocusMode::parse("eraser"), Ok(FocusMode::Masking));
        assert_eq!(FocusMode::parse("Crop"), Ok(FocusMode::Cropping));
        assert_eq!(
            FocusMode::parse("zoom"),
            Err(ValidationError::UnknownMode(String::from("zoom")))
        );
    }
}
