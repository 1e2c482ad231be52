// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Named reconcile tasks and the two phase runners.
//!
//! Every subsystem reconciles in two phases:
//!
//! 1. An **independent** phase whose tasks have no ordering dependency on
//!    each other. All tasks run; failures are collected and reported together.
//! 2. A **dependent** phase whose tasks consume what earlier tasks produced
//!    (the Deployment reads the credentials Secret). The first failure aborts
//!    the phase.
//!
//! A failed independent phase blocks the dependent phase of the same
//! subsystem.

use crate::context::Context;
use crate::crd::OLSConfig;
use crate::metrics;
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, error};

/// Signature of a reconcile step.
pub type TaskFn = for<'a> fn(&'a Context, &'a OLSConfig) -> BoxFuture<'a, Result<()>>;

/// A named, ordered unit of reconcile work.
#[derive(Clone, Copy)]
pub struct ReconcileTask {
    /// Name used in logs, metrics and error messages (e.g. `reconcile Postgres Secret`)
    pub name: &'static str,

    /// The step itself
    pub run: TaskFn,
}

impl std::fmt::Debug for ReconcileTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Errors surfaced by the phase runners.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// One or more independent tasks failed; names are in task-list order.
    #[error("failed tasks: [{}]", failed.join(", "))]
    IndependentPhase { failed: Vec<String> },

    /// A dependent task failed and aborted the phase.
    #[error("failed to {task}: {cause}")]
    DependentPhase { task: String, cause: String },
}

/// Run every task, collecting the names of those that fail.
///
/// # Errors
///
/// Returns [`TaskError::IndependentPhase`] listing all failed tasks.
pub async fn run_independent_phase(
    ctx: &Context,
    cr: &OLSConfig,
    subsystem: &str,
    tasks: &[ReconcileTask],
) -> Result<(), TaskError> {
    let mut failed = Vec::new();

    for task in tasks {
        debug!(subsystem = %subsystem, task = %task.name, "Running reconcile task");
        if let Err(e) = (task.run)(ctx, cr).await {
            error!(
                subsystem = %subsystem,
                task = %task.name,
                error = %format!("{e:#}"),
                "Reconcile task failed"
            );
            metrics::record_task_failure(subsystem, task.name);
            failed.push(task.name.to_string());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(TaskError::IndependentPhase { failed })
    }
}

/// Run tasks in order, stopping at the first failure.
///
/// # Errors
///
/// Returns [`TaskError::DependentPhase`] naming the failed task and its cause.
pub async fn run_dependent_phase(
    ctx: &Context,
    cr: &OLSConfig,
    subsystem: &str,
    tasks: &[ReconcileTask],
) -> Result<(), TaskError> {
    for task in tasks {
        debug!(subsystem = %subsystem, task = %task.name, "Running reconcile task");
        if let Err(e) = (task.run)(ctx, cr).await {
            error!(
                subsystem = %subsystem,
                task = %task.name,
                error = %format!("{e:#}"),
                "Reconcile task failed, aborting phase"
            );
            metrics::record_task_failure(subsystem, task.name);
            return Err(TaskError::DependentPhase {
                task: task.name.to_string(),
                cause: format!("{e:#}"),
            });
        }
    }
    Ok(())
}

/// Run the independent phase, then the dependent phase.
///
/// # Errors
///
/// Returns the first phase error; the dependent phase does not run when the
/// independent phase failed.
pub async fn run_phases(
    ctx: &Context,
    cr: &OLSConfig,
    subsystem: &str,
    independent: &[ReconcileTask],
    dependent: &[ReconcileTask],
) -> Result<(), TaskError> {
    run_independent_phase(ctx, cr, subsystem, independent).await?;
    run_dependent_phase(ctx, cr, subsystem, dependent).await
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tasks_tests;
