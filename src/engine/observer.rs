use crate::error::{ExecutionError, StepError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Events fired during a run's lifecycle.
#[derive(Debug, Clone)]
pub enum ExecutionEvent<'a> {
    RunStarted {
        run_id: &'a str,
        agent_id: &'a str,
        steps: usize,
    },
    StepSkipped {
        run_id: &'a str,
        step_id: &'a str,
    },
    /// `number` counts attempted steps only, starting at 1.
    StepStarted {
        run_id: &'a str,
        step_id: &'a str,
        kind: &'static str,
        number: usize,
    },
    AttemptFailed {
        run_id: &'a str,
        step_id: &'a str,
        attempt: u32,
        max_attempts: u32,
        error: &'a StepError,
        /// `None` when no further attempt will be made.
        retry_in: Option<Duration>,
    },
    StepSucceeded {
        run_id: &'a str,
        step_id: &'a str,
        attempts: u32,
    },
    RunFinished {
        run_id: &'a str,
        steps_executed: usize,
        steps_skipped: usize,
    },
    RunFailed {
        run_id: &'a str,
        error: &'a ExecutionError,
    },
}

/// Receives run events. Called inline, so implementations must not block.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent<'_>);
}

pub type SharedObserver = Arc<dyn ExecutionObserver>;

/// Default observer: logs every event with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_event(&self, event: &ExecutionEvent<'_>) {
        match event {
            ExecutionEvent::RunStarted {
                run_id,
                agent_id,
                steps,
            } => info!(run_id, agent_id, steps, "Run started"),
            ExecutionEvent::StepSkipped { run_id, step_id } => {
                debug!(run_id, step_id, "Step skipped: guard is falsy")
            }
            ExecutionEvent::StepStarted {
                run_id,
                step_id,
                kind,
                number,
            } => info!(run_id, step_id, kind, "Step {number} started"),
            ExecutionEvent::AttemptFailed {
                run_id,
                step_id,
                attempt,
                max_attempts,
                error,
                retry_in,
            } => match retry_in {
                Some(delay) => warn!(
                    run_id,
                    step_id,
                    "Attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}"
                ),
                None => warn!(
                    run_id,
                    step_id, "Attempt {attempt}/{max_attempts} failed: {error}"
                ),
            },
            ExecutionEvent::StepSucceeded {
                run_id,
                step_id,
                attempts,
            } => debug!(run_id, step_id, attempts, "Step succeeded"),
            ExecutionEvent::RunFinished {
                run_id,
                steps_executed,
                steps_skipped,
            } => info!(run_id, steps_executed, steps_skipped, "Run finished"),
            ExecutionEvent::RunFailed { run_id, error } => error!(run_id, "Run failed: {error}"),
        }
    }
}
