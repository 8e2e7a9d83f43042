//! Multi-step operations without a global transaction
//!
//! A saga is an ordered list of steps. Each step carries its own failure
//! policy: `Continue` logs the failure and moves on, `Abort` stops the saga
//! and runs the compensations of every step that already succeeded, newest
//! first. Every outcome lands in a [`SagaReport`].
//!
//! Step actions are plain futures. They do nothing until the saga awaits
//! them, so building a saga has no side effects and unused compensations
//! are simply dropped.

use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Log and keep going
    Continue,
    /// Stop and compensate
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Not attempted because an earlier step aborted the saga
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// Per-step record of one saga run
#[derive(Debug, Clone, Serialize)]
pub struct SagaReport {
    pub saga: String,
    pub project_ref: String,
    pub steps: Vec<StepOutcome>,
    /// Compensations run after an abort, newest step first
    pub compensations: Vec<StepOutcome>,
    pub aborted_at: Option<String>,
}

/// Report of a best-effort teardown
pub type TeardownReport = SagaReport;

impl SagaReport {
    fn new(saga: &str, project_ref: &str) -> Self {
        Self {
            saga: saga.to_string(),
            project_ref: project_ref.to_string(),
            steps: Vec::new(),
            compensations: Vec::new(),
            aborted_at: None,
        }
    }

    /// True unless an `Abort` step failed
    pub fn success(&self) -> bool {
        self.aborted_at.is_none()
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn succeeded_steps(&self) -> Vec<String> {
        self.with_status(StepStatus::Succeeded)
    }

    pub fn failed_steps(&self) -> Vec<String> {
        self.with_status(StepStatus::Failed)
    }

    fn with_status(&self, status: StepStatus) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.step.clone())
            .collect()
    }

    /// Failed steps as `TeardownStepFailure` errors
    pub fn failures(&self) -> Vec<LifecycleError> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| LifecycleError::TeardownStepFailure {
                step: s.step.clone(),
                error: s.error.clone().unwrap_or_default(),
            })
            .collect()
    }

    fn record(&mut self, step: &str, status: StepStatus, error: Option<String>) {
        self.steps.push(StepOutcome {
            step: step.to_string(),
            status,
            error,
        });
    }
}

type StepFuture<'a> = BoxFuture<'a, Result<(), LifecycleError>>;

struct SagaStep<'a> {
    name: &'static str,
    policy: StepPolicy,
    action: StepFuture<'a>,
    compensation: Option<StepFuture<'a>>,
}

pub struct Saga<'a> {
    name: &'static str,
    project_ref: String,
    steps: Vec<SagaStep<'a>>,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str, project_ref: impl Into<String>) -> Self {
        Self {
            name,
            project_ref: project_ref.into(),
            steps: Vec::new(),
        }
    }

    pub fn step<F>(mut self, name: &'static str, policy: StepPolicy, action: F) -> Self
    where
        F: Future<Output = Result<(), LifecycleError>> + Send + 'a,
    {
        self.steps.push(SagaStep {
            name,
            policy,
            action: Box::pin(action),
            compensation: None,
        });
        self
    }

    /// A step whose effect is undone by `compensation` if a later step aborts
    pub fn compensated_step<F, C>(
        mut self,
        name: &'static str,
        policy: StepPolicy,
        action: F,
        compensation: C,
    ) -> Self
    where
        F: Future<Output = Result<(), LifecycleError>> + Send + 'a,
        C: Future<Output = Result<(), LifecycleError>> + Send + 'a,
    {
        self.steps.push(SagaStep {
            name,
            policy,
            action: Box::pin(action),
            compensation: Some(Box::pin(compensation)),
        });
        self
    }

    pub async fn run(self) -> SagaReport {
        let mut report = SagaReport::new(self.name, &self.project_ref);
        let mut completed: Vec<(&'static str, Option<StepFuture<'a>>)> = Vec::new();
        let mut steps = self.steps.into_iter();

        while let Some(step) = steps.next() {
            match step.action.await {
                Ok(()) => {
                    debug!(saga = self.name, step = step.name, "[Lifecycle] Step succeeded");
                    report.record(step.name, StepStatus::Succeeded, None);
                    completed.push((step.name, step.compensation));
                }
                Err(e) if step.policy == StepPolicy::Continue => {
                    warn!(
                        saga = self.name,
                        project_ref = %self.project_ref,
                        step = step.name,
                        error = %e,
                        "[Lifecycle] Step failed, continuing"
                    );
                    report.record(step.name, StepStatus::Failed, Some(e.to_string()));
                }
                Err(e) => {
                    error!(
                        saga = self.name,
                        project_ref = %self.project_ref,
                        step = step.name,
                        error = %e,
                        "[Lifecycle] Step failed, aborting"
                    );
                    report.record(step.name, StepStatus::Failed, Some(e.to_string()));
                    report.aborted_at = Some(step.name.to_string());
                    break;
                }
            }
        }

        if report.aborted_at.is_none() {
            return report;
        }

        for skipped in steps {
            report.record(skipped.name, StepStatus::Skipped, None);
        }

        for (name, compensation) in completed.into_iter().rev() {
            let Some(compensation) = compensation else {
                continue;
            };
            let outcome = match compensation.await {
                Ok(()) => StepOutcome {
                    step: name.to_string(),
                    status: StepStatus::Succeeded,
                    error: None,
                },
                Err(e) => {
                    warn!(
                        saga = self.name,
                        project_ref = %self.project_ref,
                        step = name,
                        error = %e,
                        "[Lifecycle] Compensation failed"
                    );
                    StepOutcome {
                        step: name.to_string(),
                        status: StepStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.compensations.push(outcome);
        }

        report
    }
}
