// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::crd::OLSConfig;
    use crate::reconcilers::tasks::*;
    use crate::testing::{mock_context, test_olsconfig};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static INDEPENDENT_CALLS: AtomicUsize = AtomicUsize::new(0);
    static DEPENDENT_CALLS: AtomicUsize = AtomicUsize::new(0);
    static BLOCKED_CALLS: AtomicUsize = AtomicUsize::new(0);

    async fn succeed(_ctx: &Context, _cr: &OLSConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn fail(_ctx: &Context, _cr: &OLSConfig) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("boom"))
    }

    async fn count_independent(_ctx: &Context, _cr: &OLSConfig) -> anyhow::Result<()> {
        INDEPENDENT_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count_dependent(_ctx: &Context, _cr: &OLSConfig) -> anyhow::Result<()> {
        DEPENDENT_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count_blocked(_ctx: &Context, _cr: &OLSConfig) -> anyhow::Result<()> {
        BLOCKED_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    #[tokio::test]
    async fn test_independent_phase_runs_all_and_lists_failures_in_order() {
        let (ctx, _server) = mock_context();
        let cr = test_olsconfig();
        INDEPENDENT_CALLS.store(0, Ordering::SeqCst);

        let tasks = [
            ReconcileTask { name: "first", run: |c, r| fail(c, r).boxed() },
            ReconcileTask { name: "second", run: |c, r| count_independent(c, r).boxed() },
            ReconcileTask { name: "third", run: |c, r| fail(c, r).boxed() },
            ReconcileTask { name: "fourth", run: |c, r| count_independent(c, r).boxed() },
        ];

        let err = run_independent_phase(&ctx, &cr, "test", &tasks)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TaskError::IndependentPhase {
                failed: vec!["first".to_string(), "third".to_string()]
            }
        );
        assert_eq!(err.to_string(), "failed tasks: [first, third]");
        assert_eq!(INDEPENDENT_CALLS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dependent_phase_stops_at_first_failure() {
        let (ctx, _server) = mock_context();
        let cr = test_olsconfig();
        DEPENDENT_CALLS.store(0, Ordering::SeqCst);

        let tasks = [
            ReconcileTask { name: "reconcile PVC", run: |c, r| count_dependent(c, r).boxed() },
            ReconcileTask { name: "reconcile Deployment", run: |c, r| fail(c, r).boxed() },
            ReconcileTask { name: "reconcile Service", run: |c, r| count_dependent(c, r).boxed() },
        ];

        let err = run_dependent_phase(&ctx, &cr, "test", &tasks)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to reconcile Deployment: boom");
        assert_eq!(DEPENDENT_CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_independent_failure_blocks_dependent_phase() {
        let (ctx, _server) = mock_context();
        let cr = test_olsconfig();
        BLOCKED_CALLS.store(0, Ordering::SeqCst);

        let independent = [ReconcileTask { name: "reconcile Secret", run: |c, r| fail(c, r).boxed() }];
        let dependent = [ReconcileTask { name: "reconcile Deployment", run: |c, r| count_blocked(c, r).boxed() }];

        let err = run_phases(&ctx, &cr, "test", &independent, &dependent)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::IndependentPhase { .. }));
        assert_eq!(BLOCKED_CALLS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_phases_succeed() {
        let (ctx, _server) = mock_context();
        let cr = test_olsconfig();

        let independent = [ReconcileTask { name: "a", run: |c, r| succeed(c, r).boxed() }];
        let dependent = [ReconcileTask { name: "b", run: |c, r| succeed(c, r).boxed() }];

        assert!(run_phases(&ctx, &cr, "test", &independent, &dependent)
            .await
            .is_ok());
    }
}
