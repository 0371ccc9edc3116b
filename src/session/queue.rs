use std::collections::BTreeMap;

use crate::session::error::ValidationError;
use crate::session::registry::{self, CommandDescriptor, CommandId, CommandKind, Conflict};
use crate::session::settings::{SettingValue, SettingsPatch};

/// Staged queued operations, keyed by command. Never touches settings
/// history; only a successful commit folds these into a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    entries: BTreeMap<CommandId, SettingValue>,
}

fn queued_descriptor(id: CommandId) -> Result<&'static CommandDescriptor, ValidationError> {
    let descriptor = id.descriptor();
    if descriptor.kind != CommandKind::Queued {
        return Err(ValidationError::NotQueued { id: id.to_string() });
    }
    Ok(descriptor)
}

impl PendingQueue {
    /// Falsy values remove the entry, present or not. Anything else is
    /// validated against the registry before it is stored.
    pub fn toggle(&mut self, id: CommandId, value: SettingValue) -> Result<bool, ValidationError> {
        let descriptor = queued_descriptor(id)?;
        if !value.is_truthy() {
            return Ok(self.entries.remove(&id).is_some());
        }
        descriptor.validate_value(&value)?;
        let changed = self.entries.get(&id) != Some(&value);
        self.entries.insert(id, value);
        Ok(changed)
    }

    pub fn apply_recipe(&mut self, recipe_id: &str) -> Result<&'static registry::Recipe, ValidationError> {
        let recipe = registry::recipe(recipe_id)?;
        let staged = recipe
            .commands
            .iter()
            .map(|cmd| (cmd.id, SettingValue::from(cmd.value)))
            .collect::<Vec<_>>();
        self.merge_all(staged)?;
        Ok(recipe)
    }

    /// All-or-nothing merge; one bad pair leaves the queue as it was.
    pub fn merge_all(&mut self, pairs: Vec<(CommandId, SettingValue)>) -> Result<(), ValidationError> {
        for (id, value) in &pairs {
            queued_descriptor(*id)?.validate_value(value)?;
        }
        for (id, value) in pairs {
            self.entries.insert(id, value);
        }
        Ok(())
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.entries.is_empty();
        self.entries.clear();
        had
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: CommandId) -> Option<&SettingValue> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandId, &SettingValue)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    pub fn ids(&self) -> impl Iterator<Item = CommandId> + '_ {
        self.entries.keys().copied()
    }

    /// Queue entries keyed by their settings parameter name.
    pub fn as_patch(&self) -> SettingsPatch {
        self.entries
            .iter()
            .filter_map(|(id, value)| {
                id.descriptor()
                    .api_param
                    .map(|param| (param.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(id, value)| {
                let label = id.descriptor().label;
                match value {
                    SettingValue::Number(_) => format!("{label} ({value}x)"),
                    _ => label.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        registry::conflicts(self.ids())
    }

    /// Drops what a finished commit consumed. Entries re-toggled to a
    /// different value while the commit ran stay staged.
    pub fn remove_committed(&mut self, committed: &BTreeMap<CommandId, SettingValue>) {
        for (id, value) in committed {
            if self.entries.get(id) == Some(value) {
                self.entries.remove(id);
            }
        }
    }

    pub fn snapshot(&self) -> BTreeMap<CommandId, SettingValue> {
        self.entries.clone()
    }
}
