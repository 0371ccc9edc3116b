use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::plan::TransformPlan;
use crate::pipeline::transform::{TransformError, TransformRequest, TransformService};
use crate::pipeline::TransformStep;
use crate::session::events::{EventEmitter, SessionEvent};
use crate::storage::artifact::ImageArtifact;

/// Everything a commit needs once it leaves the session lock.
#[derive(Debug)]
pub struct CommitJob {
    pub ticket: u64,
    pub session_id: Uuid,
    pub plan: TransformPlan,
    pub seed: ImageArtifact,
    pub mask: Option<ImageArtifact>,
    pub cancel: CancellationToken,
    pub events: EventEmitter,
}

#[derive(Debug)]
pub enum CommitOutcome {
    Completed {
        artifact: Option<ImageArtifact>,
        steps: Vec<TransformStep>,
    },
    Failed {
        step: TransformStep,
        cause: TransformError,
        completed_steps: usize,
    },
    Canceled {
        completed_steps: usize,
    },
}

impl CommitJob {
    /// Runs the plan front to back, feeding each result into the next step.
    /// Cancellation is honoured between steps; an in-flight call always
    /// resolves first.
    pub async fn run(self, transforms: &dyn TransformService) -> CommitOutcome {
        let CommitJob {
            ticket,
            session_id,
            plan,
            seed,
            mask,
            cancel,
            events,
        } = self;

        if plan.is_empty() {
            return CommitOutcome::Completed {
                artifact: None,
                steps: Vec::new(),
            };
        }

        let started = Instant::now();
        let mut running = seed;
        let mut completed = Vec::with_capacity(plan.len());

        for planned in plan.steps {
            if cancel.is_cancelled() {
                info!(%session_id, ticket, completed_steps = completed.len(), "commit canceled");
                return CommitOutcome::Canceled {
                    completed_steps: completed.len(),
                };
            }

            let step = planned.step;
            let step_started = Instant::now();
            let request = TransformRequest {
                step,
                artifact: running.clone(),
                mask: if step == TransformStep::Inpaint {
                    mask.clone()
                } else {
                    None
                },
                params: planned.params,
            };
            match transforms.apply(request).await {
                Ok(response) => {
                    let elapsed_ms = step_started.elapsed().as_millis() as u64;
                    info!(%session_id, ticket, step = step.as_str(), elapsed_ms, "transform step completed");
                    events.emit(SessionEvent::StepCompleted {
                        ticket,
                        step,
                        elapsed_ms,
                    });
                    running = response.artifact;
                    completed.push(step);
                }
                Err(cause) => {
                    warn!(
                        %session_id,
                        ticket,
                        step = step.as_str(),
                        code = cause.code(),
                        error = %cause,
                        "transform step failed"
                    );
                    return CommitOutcome::Failed {
                        step,
                        cause,
                        completed_steps: completed.len(),
                    };
                }
            }
        }

        info!(
            %session_id,
            ticket,
            steps = completed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "commit chain finished"
        );
        CommitOutcome::Completed {
            artifact: Some(running),
            steps: completed,
        }
    }
}
