use std::collections::BTreeSet;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::api::response::{respond, ApiJson};
use crate::pipeline::{SeedPolicy, TransformStep};
use crate::session::registry::{self, CommandDescriptor, CommandId, Recipe};

#[derive(Debug, Clone, Serialize)]
pub struct CommandEntry {
    #[serde(flatten)]
    pub descriptor: &'static CommandDescriptor,
    pub conflicts_with: BTreeSet<CommandId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepEntry {
    pub step: TransformStep,
    pub priority: usize,
    pub seed: SeedPolicy,
    pub response_field: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandCatalog {
    pub commands: Vec<CommandEntry>,
    pub recipes: &'static [Recipe],
    pub steps: Vec<StepEntry>,
}

pub fn command_catalog() -> CommandCatalog {
    CommandCatalog {
        commands: registry::commands()
            .iter()
            .map(|descriptor| CommandEntry {
                descriptor,
                conflicts_with: descriptor.conflicts_with(),
            })
            .collect(),
        recipes: registry::recipes(),
        steps: TransformStep::CANONICAL_ORDER
            .into_iter()
            .map(|step| StepEntry {
                step,
                priority: step.priority(),
                seed: step.seed_policy(),
                response_field: step.response_field(),
            })
            .collect(),
    }
}

pub async fn list_commands_handler() -> ApiJson<Value> {
    respond(StatusCode::OK, command_catalog())
}
