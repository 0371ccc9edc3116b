pub mod error;
pub mod events;
pub mod focus;
pub mod insight;
pub mod queue;
pub mod registry;
pub mod settings;
pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::engine::{CommitJob, CommitOutcome};
use crate::pipeline::plan::{build_plan, effective_parameters, PlanOptions, TransformPlan, DEFAULT_UPSCALE_CAP};
use crate::pipeline::transform::{SharedAnalysisService, SharedTransformService};
use crate::pipeline::{SeedPolicy, TransformStep};
use crate::storage::artifact::ImageArtifact;
use crate::storage::ProjectSource;
use crate::worker::CommitState;

use self::error::{CommitError, ValidationError};
use self::events::{EventEmitter, SessionEnvelope, SessionEvent};
use self::focus::{FocusMode, FocusModeController, ModeTransition};
use self::insight::{AnalysisError, AnalysisReport, InsightState};
use self::queue::PendingQueue;
use self::registry::{CommandId, CommandKind, Conflict};
use self::settings::{SettingValue, SettingsHistory, SettingsPatch, SettingsSnapshot, SettingsUpdate};

/// Settings keys that describe a one-off action rather than a lasting look.
const TRANSIENT_KEYS: [&str; 2] = ["objectRemoval", "generativeFill"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionOptions {
    pub log_commits_to_history: bool,
    pub upscale_cap: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            log_commits_to_history: true,
            upscale_cap: DEFAULT_UPSCALE_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Commit,
    Replay,
}

#[derive(Debug)]
struct InFlight {
    ticket: u64,
    kind: CommitKind,
    cancel: CancellationToken,
    committed: BTreeMap<CommandId, SettingValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub ticket: Option<u64>,
    pub kind: CommitKind,
    pub steps: Vec<TransformStep>,
    pub published: bool,
    pub pending_count: usize,
}

/// One image being edited: settings history, staged queue, canvas mode,
/// insights and the published result. Mutations are synchronous; the
/// only async work (the transform chain) runs outside via [`CommitJob`].
#[derive(Debug)]
pub struct EditSession {
    id: Uuid,
    source: ImageArtifact,
    source_ref: ProjectSource,
    settings: SettingsHistory,
    queue: PendingQueue,
    focus: FocusModeController,
    insight: InsightState,
    mask: Option<ImageArtifact>,
    published: Option<ImageArtifact>,
    commit_state: CommitState,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    options: SessionOptions,
    events: EventEmitter,
}

impl EditSession {
    pub fn new(source: ImageArtifact, source_ref: ProjectSource, options: SessionOptions) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            source,
            source_ref,
            settings: SettingsHistory::default(),
            queue: PendingQueue::default(),
            focus: FocusModeController::default(),
            insight: InsightState::default(),
            mask: None,
            published: None,
            commit_state: CommitState::Idle,
            in_flight: None,
            next_ticket: 1,
            options,
            events: EventEmitter::new(id),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &ImageArtifact {
        &self.source
    }

    pub fn published(&self) -> Option<&ImageArtifact> {
        self.published.as_ref()
    }

    /// What the canvas shows: the last published result, else the source.
    pub fn current_artifact(&self) -> &ImageArtifact {
        self.published.as_ref().unwrap_or(&self.source)
    }

    pub fn settings(&self) -> &SettingsSnapshot {
        self.settings.current()
    }

    pub fn history(&self) -> &SettingsHistory {
        &self.settings
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn mode(&self) -> FocusMode {
        self.focus.active()
    }

    pub fn insights(&self) -> &InsightState {
        &self.insight
    }

    pub fn commit_state(&self) -> CommitState {
        self.commit_state
    }

    pub fn is_committing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnvelope> {
        self.events.subscribe()
    }

    fn emit_settings(&self) {
        self.events.emit(SessionEvent::SettingsChanged {
            index: self.settings.index(),
            snapshot: self.settings.current().clone(),
        });
    }

    fn emit_queue(&self) {
        self.events.emit(SessionEvent::QueueChanged {
            pending_count: self.queue.pending_count(),
            summary: self.queue.summary(),
        });
    }

    fn set_commit_state(&mut self, next: CommitState) -> bool {
        if !self.commit_state.can_transition_to(next) {
            warn!(session_id = %self.id, from = ?self.commit_state, to = ?next, "refused commit state transition");
            return false;
        }
        self.commit_state = next;
        true
    }

    // Settings

    pub fn set_live(&mut self, id: CommandId, value: SettingValue) -> Result<&SettingsSnapshot, ValidationError> {
        let descriptor = id.descriptor();
        let Some(param) = descriptor.api_param.filter(|_| descriptor.kind == CommandKind::Live) else {
            return Err(ValidationError::NotLive { id: id.to_string() });
        };
        descriptor.validate_value(&value)?;
        self.settings
            .set(SettingsUpdate::Patch(SettingsPatch::from([(param.to_string(), value)])));
        self.emit_settings();
        Ok(self.settings.current())
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> &SettingsSnapshot {
        self.settings.set(update);
        self.emit_settings();
        self.settings.current()
    }

    pub fn undo(&mut self) -> bool {
        let moved = self.settings.undo().is_some();
        if moved {
            self.emit_settings();
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.settings.redo().is_some();
        if moved {
            self.emit_settings();
        }
        moved
    }

    pub fn jump_to_index(&mut self, index: usize) -> Result<&SettingsSnapshot, ValidationError> {
        self.settings.jump_to(index)?;
        self.emit_settings();
        Ok(self.settings.current())
    }

    // Queue

    pub fn toggle_queued(&mut self, id: CommandId, value: SettingValue) -> Result<bool, ValidationError> {
        let changed = self.queue.toggle(id, value)?;
        if changed {
            self.emit_queue();
        }
        Ok(changed)
    }

    pub fn apply_recipe(&mut self, recipe_id: &str) -> Result<&'static registry::Recipe, ValidationError> {
        let recipe = self.queue.apply_recipe(recipe_id)?;
        self.emit_queue();
        Ok(recipe)
    }

    pub fn clear_queue(&mut self) {
        if self.queue.clear() {
            self.emit_queue();
        }
    }

    /// Advisory pairs among staged commands and the active mode's command.
    pub fn conflicts(&self) -> Vec<Conflict> {
        registry::conflicts(self.queue.ids().chain(self.focus.active().command()))
    }

    // Focus mode

    pub fn enter_mode(&mut self, mode: FocusMode) -> ModeTransition {
        let transition = self.focus.enter(mode);
        if transition.changed() {
            self.events.emit(SessionEvent::ModeChanged {
                previous: transition.previous,
                current: transition.current,
            });
        }
        transition
    }

    pub fn exit_mode(&mut self) -> ModeTransition {
        self.enter_mode(FocusMode::None)
    }

    /// Painting a mask stages object removal; clearing it unstages it.
    pub fn set_mask(&mut self, mask: ImageArtifact) {
        self.mask = Some(mask);
        self.events.emit(SessionEvent::MaskChanged { present: true });
        if self.queue.toggle(CommandId::ObjectRemoval, SettingValue::Flag(true)) == Ok(true) {
            self.emit_queue();
        }
    }

    pub fn clear_mask(&mut self) {
        if self.mask.take().is_some() {
            self.events.emit(SessionEvent::MaskChanged { present: false });
        }
        if self.queue.toggle(CommandId::ObjectRemoval, SettingValue::Flag(false)) == Ok(true) {
            self.emit_queue();
        }
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    // Insights

    /// Marks the scan as running and hands back what to analyze.
    pub fn begin_analysis(&mut self) -> ImageArtifact {
        self.insight.begin(self.source.identity());
        self.events.emit(SessionEvent::AnalysisStarted);
        self.source.clone()
    }

    pub fn finish_analysis(
        &mut self,
        source: &ImageArtifact,
        result: Result<AnalysisReport, AnalysisError>,
    ) -> bool {
        let identity = source.identity();
        match result {
            Ok(report) => {
                let applied = self.insight.complete(&identity, report);
                if applied {
                    self.events.emit(SessionEvent::AnalysisCompleted {
                        recommendations: self.insight.recommendations.len(),
                    });
                }
                applied
            }
            Err(err) => {
                let applied = self.insight.fail(&identity, &err);
                if applied {
                    warn!(session_id = %self.id, error = %err, "image analysis failed");
                    self.events.emit(SessionEvent::AnalysisFailed {
                        message: err.to_string(),
                    });
                }
                applied
            }
        }
    }

    /// Stages every recommendation in one step.
    pub fn apply_recommendations(&mut self) -> Result<usize, ValidationError> {
        let pairs = self
            .insight
            .recommendations
            .iter()
            .map(|r| (r.id, r.value.clone()))
            .collect::<Vec<_>>();
        let count = pairs.len();
        if count == 0 {
            return Ok(0);
        }
        self.queue.merge_all(pairs)?;
        self.emit_queue();
        Ok(count)
    }

    /// New upload: every piece of per-image state starts over. A commit
    /// still running against the old image is canceled and its result
    /// will be refused.
    pub fn replace_source(&mut self, source: ImageArtifact, source_ref: ProjectSource) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
            self.set_commit_state(CommitState::Canceled);
        }
        self.source = source;
        self.source_ref = source_ref;
        self.settings.reset(SettingsSnapshot::default());
        self.queue.clear();
        self.insight.reset();
        self.mask = None;
        self.published = None;
        self.events.emit(SessionEvent::SourceChanged {
            identity: self.source.identity().to_string(),
        });
        self.emit_settings();
        self.emit_queue();
    }

    // Commit

    fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            upscale_cap: self.options.upscale_cap,
            has_mask: self.mask.is_some(),
        }
    }

    fn start_job(
        &mut self,
        plan: TransformPlan,
        kind: CommitKind,
        committed: BTreeMap<CommandId, SettingValue>,
    ) -> Result<CommitJob, CommitError> {
        if !self.set_commit_state(CommitState::Running) {
            return Err(CommitError::SessionBusy);
        }
        let seed = match (plan.seed_policy(), self.published.as_ref()) {
            (SeedPolicy::RunningResult, Some(result)) => result.clone(),
            _ => self.source.clone(),
        };
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancel = CancellationToken::new();
        let steps = plan.step_ids();
        info!(session_id = %self.id, ticket, kind = ?kind, steps = steps.len(), "commit started");
        self.events.emit(SessionEvent::CommitStarted { ticket, steps });
        self.in_flight = Some(InFlight {
            ticket,
            kind,
            cancel: cancel.clone(),
            committed,
        });
        Ok(CommitJob {
            ticket,
            session_id: self.id,
            plan,
            seed,
            mask: self.mask.clone(),
            cancel,
            events: self.events.clone(),
        })
    }

    /// First phase of a commit. `Ok(None)` means nothing is staged and
    /// nothing will run.
    pub fn begin_commit(&mut self) -> Result<Option<CommitJob>, CommitError> {
        if self.in_flight.is_some() {
            return Err(CommitError::SessionBusy);
        }
        if !self.queue.has_pending() {
            return Ok(None);
        }
        let params = effective_parameters(self.settings.current(), &self.queue.as_patch());
        let plan = build_plan(&params, self.plan_options())?;
        let committed = self.queue.snapshot();
        self.start_job(plan, CommitKind::Commit, committed).map(Some)
    }

    /// Re-renders the current snapshot with no queue involved. An empty
    /// plan means the defaults are showing, so the pristine image is the
    /// result.
    pub fn begin_replay(&mut self) -> Result<Option<CommitJob>, CommitError> {
        if self.in_flight.is_some() {
            return Err(CommitError::SessionBusy);
        }
        let plan = build_plan(self.settings.current(), self.plan_options())?;
        if plan.is_empty() {
            self.published = None;
            return Ok(None);
        }
        self.start_job(plan, CommitKind::Replay, BTreeMap::new()).map(Some)
    }

    pub fn cancel_commit(&self) -> bool {
        match self.in_flight.as_ref() {
            Some(in_flight) => {
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Final phase: publish on success, otherwise leave queue and result
    /// exactly as they were before `begin_*`.
    pub fn finish_commit(&mut self, ticket: u64, outcome: CommitOutcome) -> Result<CommitReport, CommitError> {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => in_flight,
            other => {
                self.in_flight = other;
                return Err(CommitError::StaleTicket(ticket));
            }
        };

        match outcome {
            CommitOutcome::Completed { artifact, steps } => {
                self.published = artifact;
                self.set_commit_state(CommitState::Succeeded);
                if in_flight.kind == CommitKind::Commit {
                    self.queue.remove_committed(&in_flight.committed);
                    if in_flight.committed.contains_key(&CommandId::ObjectRemoval) {
                        self.mask = None;
                        self.events.emit(SessionEvent::MaskChanged { present: false });
                    }
                    if self.options.log_commits_to_history {
                        let logged = in_flight
                            .committed
                            .iter()
                            .filter_map(|(id, value)| {
                                id.descriptor()
                                    .api_param
                                    .filter(|param| !TRANSIENT_KEYS.contains(param))
                                    .map(|param| (param.to_string(), value.clone()))
                            })
                            .collect::<SettingsPatch>();
                        if !logged.is_empty() {
                            self.settings.set(SettingsUpdate::Patch(logged));
                            self.emit_settings();
                        }
                    }
                    self.emit_queue();
                }
                info!(session_id = %self.id, ticket, steps = steps.len(), "commit published");
                self.events.emit(SessionEvent::CommitSucceeded {
                    ticket,
                    steps: steps.clone(),
                });
                Ok(CommitReport {
                    ticket: Some(ticket),
                    kind: in_flight.kind,
                    steps,
                    published: self.published.is_some(),
                    pending_count: self.queue.pending_count(),
                })
            }
            CommitOutcome::Failed { step, cause, .. } => {
                self.set_commit_state(CommitState::Failed);
                self.events.emit(SessionEvent::CommitFailed {
                    ticket,
                    step,
                    code: cause.code().to_string(),
                    message: cause.message(),
                });
                Err(CommitError::TransformStepFailed { step, cause })
            }
            CommitOutcome::Canceled { completed_steps } => {
                self.set_commit_state(CommitState::Canceled);
                self.events.emit(SessionEvent::CommitCanceled {
                    ticket,
                    completed_steps,
                });
                Err(CommitError::Canceled { completed_steps })
            }
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            project_id: self.source_ref.project_id.clone(),
            source_url: self.source_ref.source_url.clone(),
            source_identity: self.source.identity().to_string(),
            settings: self.settings.current().clone(),
            history_index: self.settings.index(),
            history_len: self.settings.len(),
            can_undo: self.settings.can_undo(),
            can_redo: self.settings.can_redo(),
            pending: self.queue.snapshot(),
            has_pending: self.queue.has_pending(),
            pending_count: self.queue.pending_count(),
            summary: self.queue.summary(),
            conflicts: self.conflicts(),
            mode: self.focus.active(),
            has_mask: self.mask.is_some(),
            commit_state: self.commit_state,
            insights: self.insight.clone(),
            has_result: self.published.is_some(),
            result_identity: self.published.as_ref().map(|a| a.identity().to_string()),
        }
    }
}

/// Derived, read-only state for UI clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub source_identity: String,
    pub settings: SettingsSnapshot,
    pub history_index: usize,
    pub history_len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub pending: BTreeMap<CommandId, SettingValue>,
    pub has_pending: bool,
    pub pending_count: usize,
    pub summary: String,
    pub conflicts: Vec<Conflict>,
    pub mode: FocusMode,
    pub has_mask: bool,
    pub commit_state: CommitState,
    pub insights: InsightState,
    pub has_result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_identity: Option<String>,
}

/// Shared, lockable session. The lock is only held for the synchronous
/// phases; transform calls run with it released.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    inner: Arc<Mutex<EditSession>>,
}

impl SessionHandle {
    pub fn new(session: EditSession) -> Self {
        Self {
            id: session.id(),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, EditSession> {
        self.inner.lock().await
    }

    pub async fn commit(&self, transforms: SharedTransformService) -> Result<CommitReport, CommitError> {
        let job = self.inner.lock().await.begin_commit()?;
        self.drive(job, CommitKind::Commit, transforms).await
    }

    pub async fn replay(&self, transforms: SharedTransformService) -> Result<CommitReport, CommitError> {
        let job = self.inner.lock().await.begin_replay()?;
        self.drive(job, CommitKind::Replay, transforms).await
    }

    /// The chain and its settlement run on their own task, so the ticket is
    /// settled even when the caller's future is dropped mid-commit.
    async fn drive(
        &self,
        job: Option<CommitJob>,
        kind: CommitKind,
        transforms: SharedTransformService,
    ) -> Result<CommitReport, CommitError> {
        let Some(job) = job else {
            let session = self.inner.lock().await;
            return Ok(CommitReport {
                ticket: None,
                kind,
                steps: Vec::new(),
                published: session.published().is_some(),
                pending_count: session.queue().pending_count(),
            });
        };
        let ticket = job.ticket;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let outcome = job.run(transforms.as_ref()).await;
            inner.lock().await.finish_commit(ticket, outcome)
        });
        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                warn!(session_id = %self.id, ticket, error = %join_error, "commit task ended before settling");
                self.inner
                    .lock()
                    .await
                    .finish_commit(ticket, CommitOutcome::Canceled { completed_steps: 0 })
            }
        }
    }

    pub async fn cancel(&self) -> bool {
        self.inner.lock().await.cancel_commit()
    }

    /// Starts a background scan of the current source. The returned handle
    /// resolves once the result has been applied (or dropped as stale).
    pub async fn analyze(&self, service: SharedAnalysisService) -> JoinHandle<bool> {
        let source = self.inner.lock().await.begin_analysis();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = service
                .analyze(source.clone())
                .await
                .map_err(AnalysisError::from);
            inner.lock().await.finish_analysis(&source, result)
        })
    }
}
