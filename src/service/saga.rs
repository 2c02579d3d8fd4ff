//! Short-lived sagas: ordered steps with compensations, unwound LIFO.
//!
//! ```text
//! Steps:          [Step 1] → [Step 2] → [Step 3] → [FAIL!]
//! Compensation:                          [Comp 2] → [Comp 1]
//! ```
//!
//! A step that fails is not compensated itself; only the steps completed
//! before it are. A pivot step commits everything before it: once it
//! succeeds, no earlier compensation will run and the remaining steps run to
//! completion. Nothing is retried. The deadline is only checked between
//! forward steps before the pivot, never after it and never while unwinding.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// One forward action and its (optional) undo, run against a shared context.
#[async_trait]
pub trait SagaStep<C, E>: Send + Sync
where
    C: ?Sized + Send,
    E: Send,
{
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<(), E>;

    /// Whether `compensate` undoes anything.
    fn compensable(&self) -> bool {
        false
    }

    async fn compensate(&self, ctx: &mut C) -> Result<(), E> {
        let _ = ctx;
        Ok(())
    }

    fn is_pivot(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub enum FailureCause<E> {
    Step(E),
    /// The deadline passed before the step started.
    Cancelled,
}

#[derive(Debug)]
pub struct CompensationFailure<E> {
    pub step: &'static str,
    pub error: E,
}

/// Outcome of a saga that did not run to completion.
#[derive(Debug)]
pub struct SagaFailure<E> {
    /// The step that failed, or that was about to run when cancelled.
    pub step: &'static str,
    pub cause: FailureCause<E>,
    /// Steps successfully undone, in the order they were undone.
    pub compensated: Vec<&'static str>,
    /// First compensation that failed; later ones were still attempted.
    pub compensation_error: Option<CompensationFailure<E>>,
}

pub struct Saga<C: ?Sized + Send, E: Send> {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep<C, E>>>,
}

impl<C, E> Saga<C, E>
where
    C: ?Sized + Send,
    E: Send + std::fmt::Display,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl SagaStep<C, E> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub async fn run(&self, ctx: &mut C, deadline: Option<Instant>) -> Result<(), SagaFailure<E>> {
        let mut undo: Vec<&dyn SagaStep<C, E>> = Vec::new();
        let mut committed = false;

        for step in &self.steps {
            // once committed, the remaining steps always run
            if !committed && deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(saga = self.name, step = step.name(), "deadline passed; unwinding");
                let (compensated, compensation_error) = self.unwind(ctx, undo).await;
                return Err(SagaFailure {
                    step: step.name(),
                    cause: FailureCause::Cancelled,
                    compensated,
                    compensation_error,
                });
            }

            debug!(saga = self.name, step = step.name(), "executing");
            match step.execute(ctx).await {
                Ok(()) if step.is_pivot() => {
                    undo.clear();
                    committed = true;
                }
                Ok(()) if step.compensable() => undo.push(step.as_ref()),
                Ok(()) => {}
                Err(e) => {
                    warn!(saga = self.name, step = step.name(), error = %e, "step failed");
                    let (compensated, compensation_error) = self.unwind(ctx, undo).await;
                    return Err(SagaFailure {
                        step: step.name(),
                        cause: FailureCause::Step(e),
                        compensated,
                        compensation_error,
                    });
                }
            }
        }
        Ok(())
    }

    async fn unwind(
        &self,
        ctx: &mut C,
        undo: Vec<&dyn SagaStep<C, E>>,
    ) -> (Vec<&'static str>, Option<CompensationFailure<E>>) {
        let mut compensated = Vec::with_capacity(undo.len());
        let mut first_error = None;

        for step in undo.into_iter().rev() {
            match step.compensate(ctx).await {
                Ok(()) => {
                    warn!(saga = self.name, step = step.name(), "compensated");
                    compensated.push(step.name());
                }
                Err(e) => {
                    error!(saga = self.name, step = step.name(), error = %e, "compensation failed");
                    if first_error.is_none() {
                        first_error = Some(CompensationFailure {
                            step: step.name(),
                            error: e,
                        });
                    }
                }
            }
        }
        (compensated, first_error)
    }
}
