//! Distribution orchestrator: events in, assigned (or queued) work out.
//!
//! One subscriber worker per event type feeds [`DistributionOrchestrator::process_event`].
//! Each generated task runs through the engine and is handed to task management on
//! its own; a failure on one task never stops its siblings.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use taskforge_core::{TaskId, UserId};
use taskforge_distribution::collaborator::bounded;
use taskforge_distribution::{
    AssignmentEngine, AssignmentOutcome, AssignmentState, CompletedTask, DEFAULT_LOOKUP_TIMEOUT, DistributionError,
    SkillProfile, TaskDefinition, TaskManagement, UnassignedReason, WorkloadSnapshot, generate_from_event,
};
use taskforge_events::{DomainEvent, EventBus, EventType};

use crate::workers::{SubscriberWorker, WorkerHandle};

const TASK_MANAGEMENT: &str = "task management";

const DISTRIBUTION_PANICKED: &str = "task distribution panicked";

/// What happened to one generated task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub definition: TaskDefinition,
    pub outcome: AssignmentOutcome,
    /// Set when task management created the task right away.
    pub task_id: Option<TaskId>,
    /// Set when task management refused or could not be reached.
    pub submit_error: Option<String>,
}

impl TaskReport {
    pub fn state(&self) -> AssignmentState {
        self.outcome.state()
    }

    fn panicked(definition: TaskDefinition) -> Self {
        Self {
            definition,
            outcome: AssignmentOutcome::Unassigned {
                reason: UnassignedReason::AssignmentFailed {
                    error: DISTRIBUTION_PANICKED.to_string(),
                },
            },
            task_id: None,
            submit_error: Some(DISTRIBUTION_PANICKED.to_string()),
        }
    }
}

/// Every report produced for one event consumed from the bus.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event: DomainEvent,
    pub reports: Vec<TaskReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub task_id: TaskId,
    pub to: UserId,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReassignmentReport {
    pub reassigned: Vec<Reassignment>,
    pub skipped: usize,
}

pub struct DistributionOrchestrator {
    engine: AssignmentEngine,
    tasks: Arc<dyn TaskManagement>,
    timeout: Duration,
}

impl DistributionOrchestrator {
    pub fn new(engine: AssignmentEngine, tasks: Arc<dyn TaskManagement>) -> Self {
        Self {
            engine,
            tasks,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Upper bound for each task management call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &AssignmentEngine {
        &self.engine
    }

    /// Subscribe to every event type in the vocabulary. Each type gets its own
    /// worker, so a slow burst of one kind does not hold up the others.
    pub fn start<B>(self: &Arc<Self>, bus: &B) -> Vec<WorkerHandle>
    where
        B: EventBus<DomainEvent> + ?Sized,
    {
        self.spawn_workers(bus, None)
    }

    /// Like [`start`](Self::start), and every processed event is also sent to
    /// `reports`, once per event even when it produced no tasks.
    pub fn start_reporting<B>(
        self: &Arc<Self>,
        bus: &B,
        reports: mpsc::UnboundedSender<ProcessedEvent>,
    ) -> Vec<WorkerHandle>
    where
        B: EventBus<DomainEvent> + ?Sized,
    {
        self.spawn_workers(bus, Some(reports))
    }

    fn spawn_workers<B>(
        self: &Arc<Self>,
        bus: &B,
        sink: Option<mpsc::UnboundedSender<ProcessedEvent>>,
    ) -> Vec<WorkerHandle>
    where
        B: EventBus<DomainEvent> + ?Sized,
    {
        let workers: Vec<WorkerHandle> = EventType::VOCABULARY
            .into_iter()
            .map(|event_type| {
                let this = Arc::clone(self);
                let sink = sink.clone();
                SubscriberWorker::spawn("distribution", bus, event_type, move |event: DomainEvent| {
                    let this = Arc::clone(&this);
                    let sink = sink.clone();
                    async move {
                        let reports = this.process_event(&event).await;
                        if let Some(sink) = sink {
                            // Receiver gone means nobody is listening any more.
                            let _ = sink.send(ProcessedEvent { event, reports });
                        }
                        Ok::<_, Infallible>(())
                    }
                })
            })
            .collect();

        info!(workers = workers.len(), "distribution orchestrator started");
        workers
    }

    /// Generate, rank and submit every task for one event, in generation order.
    ///
    /// A panic while distributing one task is contained to that task: it is
    /// reported as unassigned and its siblings still run.
    #[instrument(skip_all, fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &DomainEvent) -> Vec<TaskReport> {
        if !event.event_type.is_known() {
            debug!("event type outside the vocabulary; ignored");
            return Vec::new();
        }

        let definitions = generate_from_event(event);
        if definitions.is_empty() {
            debug!("event produced no tasks");
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let task_kind = definition.task_kind;
            let fallback = definition.clone();
            match AssertUnwindSafe(self.distribute(definition)).catch_unwind().await {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!(task_kind = task_kind.as_str(), "task distribution panicked; task left unassigned");
                    reports.push(TaskReport::panicked(fallback));
                }
            }
        }
        reports
    }

    /// Close a task now and feed the outcome back into the assignee's history.
    pub async fn complete_task(&self, task_id: TaskId) -> Result<CompletedTask, DistributionError> {
        self.complete_task_at(task_id, Utc::now()).await
    }

    /// Close a task at `completed_at`. The task counts as on time when it finished
    /// no later than its due time; the on-time flag is recorded against the
    /// assignee and task kind, so the next ranking for that kind sees it.
    ///
    /// A failed history write is logged; the completion itself stands.
    #[instrument(skip_all, fields(task_id = %task_id))]
    pub async fn complete_task_at(
        &self,
        task_id: TaskId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletedTask, DistributionError> {
        let completed = bounded(TASK_MANAGEMENT, self.timeout, self.tasks.complete(task_id, completed_at)).await?;

        let recorded = self
            .engine
            .learner()
            .record_completion(completed.user_id, completed.task_kind, completed.on_time)
            .await;
        if let Err(err) = recorded {
            warn!(user_id = %completed.user_id, error = %err, "completion not recorded in history");
        }

        info!(user_id = %completed.user_id, on_time = completed.on_time, "task completed");
        Ok(completed)
    }

    async fn distribute(&self, definition: TaskDefinition) -> TaskReport {
        let selection = self.engine.select_assignee(&definition).await;
        if let Err(err) = &selection {
            warn!(task_kind = definition.task_kind.as_str(), error = %err, "assignment failed; task left unassigned");
        }
        let outcome = AssignmentOutcome::from_selection(selection);

        let (task_id, submit_error) =
            match bounded(TASK_MANAGEMENT, self.timeout, self.tasks.submit(&definition, &outcome)).await {
                Ok(task_id) => {
                    info!(
                        task_kind = definition.task_kind.as_str(),
                        state = ?outcome.state(),
                        assignee = ?outcome.assignee(),
                        task_id = ?task_id,
                        "task distributed"
                    );
                    (task_id, None)
                }
                Err(err) => {
                    warn!(task_kind = definition.task_kind.as_str(), error = %err, "task management rejected task");
                    (None, Some(err.to_string()))
                }
            };

        TaskReport {
            definition,
            outcome,
            task_id,
            submit_error,
        }
    }

    /// Move every open task of `user_id` to the best remaining eligible user.
    ///
    /// Tasks that cannot be placed are counted as skipped.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn reassign_from_user(&self, user_id: UserId) -> Result<ReassignmentReport, DistributionError> {
        let open = bounded(TASK_MANAGEMENT, self.timeout, self.tasks.open_tasks(user_id)).await?;
        if open.is_empty() {
            return Ok(ReassignmentReport::default());
        }

        let pool: Vec<UserId> = self
            .engine
            .workload()
            .eligible_user_ids()
            .await?
            .into_iter()
            .filter(|candidate| *candidate != user_id)
            .collect();
        if pool.is_empty() {
            warn!(open = open.len(), "nobody eligible to take over; all tasks skipped");
            return Ok(ReassignmentReport {
                reassigned: Vec::new(),
                skipped: open.len(),
            });
        }

        let mut report = ReassignmentReport::default();
        for task in open {
            let ranked = match self.engine.candidate_scores(&task.to_definition(), Some(&pool)).await {
                Ok(ranked) => ranked,
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "ranking failed; task skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            let Some(best) = ranked.first() else {
                report.skipped += 1;
                continue;
            };

            match bounded(TASK_MANAGEMENT, self.timeout, self.tasks.reassign(task.task_id, best.user_id)).await {
                Ok(()) => {
                    info!(task_id = %task.task_id, to = %best.user_id, score = best.score, "task reassigned");
                    report.reassigned.push(Reassignment {
                        task_id: task.task_id,
                        to: best.user_id,
                        title: task.title,
                    });
                }
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "reassignment refused; task skipped");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Proficiency in every skill for every active user.
    pub async fn all_skills(&self) -> Result<BTreeMap<UserId, SkillProfile>, DistributionError> {
        let users = self.engine.workload().active_users().await?;
        let learner = self.engine.learner();
        let profiles = join_all(users.iter().map(|user_id| learner.skill_profile(*user_id))).await;
        Ok(users.into_iter().zip(profiles).collect())
    }

    pub async fn all_workloads(&self) -> Result<WorkloadSnapshot, DistributionError> {
        self.engine.workload().all_workloads().await
    }
}
