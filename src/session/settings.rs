use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::error::ValidationError;

/// A single parameter value. Untagged on the wire so clients send plain
/// JSON booleans, numbers and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Only `false` counts as falsy; zero and empty text are kept.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(v) => write!(f, "{v}"),
            Self::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v.as_str()),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub type SettingsPatch = BTreeMap<String, SettingValue>;

/// Immutable parameter set; always carries the default key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSnapshot {
    values: BTreeMap<String, SettingValue>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        let values = [
            ("removeScratches", SettingValue::Flag(false)),
            ("faceRestoration", SettingValue::Flag(false)),
            ("upscaleX", SettingValue::Number(1.0)),
            ("colorize", SettingValue::Flag(false)),
            ("brightness", SettingValue::Number(1.0)),
            ("contrast", SettingValue::Number(1.0)),
            ("saturation", SettingValue::Number(1.0)),
            ("autoEnhance", SettingValue::Flag(false)),
            ("removeBackground", SettingValue::Flag(false)),
            ("filterPreset", SettingValue::Text(String::from("none"))),
            ("whiteBalance", SettingValue::Flag(false)),
            ("denoiseStrength", SettingValue::Number(0.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { values }
    }
}

impl SettingsSnapshot {
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(SettingValue::as_bool).unwrap_or(false)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(SettingValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Patch on top of this snapshot; keys the defaults don't know survive.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut values = self.values.clone();
        for (k, v) in patch {
            values.insert(k.clone(), v.clone());
        }
        Self { values }
    }

    /// Wholesale replacement, re-seeding any default key the caller omitted.
    pub fn replaced(values: SettingsPatch) -> Self {
        Self::default().merged(&values)
    }

    pub fn without(&self, keys: &[&str]) -> Self {
        let mut values = self.values.clone();
        for key in keys {
            values.remove(*key);
        }
        Self { values }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsUpdate {
    Patch(SettingsPatch),
    Replace(SettingsPatch),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub snapshot: SettingsSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// Linear undo log. A `set` at a rewound index drops the redo branch.
#[derive(Debug, Clone)]
pub struct SettingsHistory {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl Default for SettingsHistory {
    fn default() -> Self {
        Self::new(SettingsSnapshot::default())
    }
}

impl SettingsHistory {
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self {
            entries: vec![HistoryEntry {
                snapshot: initial,
                recorded_at: Utc::now(),
            }],
            index: 0,
        }
    }

    pub fn current(&self) -> &SettingsSnapshot {
        &self.entries[self.index].snapshot
    }

    pub fn set(&mut self, update: SettingsUpdate) -> &SettingsSnapshot {
        let next = match update {
            SettingsUpdate::Patch(patch) => self.current().merged(&patch),
            SettingsUpdate::Replace(values) => SettingsSnapshot::replaced(values),
        };
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            snapshot: next,
            recorded_at: Utc::now(),
        });
        self.index = self.entries.len() - 1;
        self.current()
    }

    /// Returns the snapshot now current, or `None` at the start of the log.
    pub fn undo(&mut self) -> Option<&SettingsSnapshot> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<&SettingsSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        Some(self.current())
    }

    pub fn jump_to(&mut self, index: usize) -> Result<&SettingsSnapshot, ValidationError> {
        if index >= self.entries.len() {
            return Err(ValidationError::HistoryIndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.index = index;
        Ok(self.current())
    }

    pub fn reset(&mut self, initial: SettingsSnapshot) {
        *self = Self::new(initial);
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}
