#[cfg(test)]
mod tests {
    use crate::error::{EngineError, TaskError};
    use crate::scheduler::Scheduler;
    use crate::task::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    // Walk a task to `Executing` without a scheduler
    fn start(task: &Task) {
        task.will_enqueue().expect("enqueue");
        assert!(task.try_begin_guard_evaluation(0));
        assert!(task.did_evaluate_guards());
        assert!(task.begin_execution(true));
    }

    fn counting_observer(counter: Arc<AtomicUsize>) -> BlockObserver {
        BlockObserver::new().on_finish(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_state_transition_table() {
        use TaskState::*;

        assert!(Initialized.can_transition_to(Pending, false));
        assert!(Pending.can_transition_to(EvaluatingGuards, false));
        assert!(EvaluatingGuards.can_transition_to(Ready, false));
        assert!(Ready.can_transition_to(Executing, false));
        assert!(Executing.can_transition_to(Finishing, false));
        assert!(Finishing.can_transition_to(Finished, false));

        // Shortcuts only for cancelled tasks
        assert!(!Pending.can_transition_to(Finishing, false));
        assert!(Pending.can_transition_to(Finishing, true));
        assert!(Ready.can_transition_to(Finishing, true));
        assert!(!EvaluatingGuards.can_transition_to(Finishing, true));

        // No regressions or skips
        assert!(!Executing.can_transition_to(Pending, false));
        assert!(!Pending.can_transition_to(Ready, false));
        assert!(!Finished.can_transition_to(Finishing, true));

        assert!(Executing.has_started());
        assert!(!Ready.has_started());
        assert!(Finished.is_terminal());
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::noop("noop");

        assert_eq!(task.name(), "noop");
        assert_eq!(task.state(), TaskState::Initialized);
        assert!(!task.is_cancelled());
        assert!(!task.is_ready());
        assert!(task.errors().is_empty());
        assert!(task.outcome().is_none());
        assert!(task.dependencies().is_empty());
        assert_ne!(task.id(), Task::noop("noop").id());
    }

    #[test]
    fn test_cancelled_task_is_ready_before_enqueue() {
        let task = Task::noop("cancel me");
        task.cancel();
        assert!(task.is_ready());
        assert!(task.is_cancelled());
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let a = Task::noop("a");
        let b = Task::noop("b");

        b.add_dependency(&a).unwrap();
        b.add_dependency(&a).unwrap();
        b.add_dependency(&b).unwrap();

        assert_eq!(b.dependencies(), vec![a.clone()]);
        assert_eq!(b.all_dependencies().len(), 1);
        assert_eq!(b.all_dependencies()[0].1, DependencyKind::Direct);
    }

    #[test]
    fn test_internal_dependencies_are_not_direct() {
        let a = Task::noop("a");
        let b = Task::noop("b");
        let task = Task::noop("task");

        task.add_dependency(&a).unwrap();
        task.add_dependency_of_kind(&b, DependencyKind::Exclusive)
            .unwrap();

        assert_eq!(task.dependencies(), vec![a]);
        assert_eq!(task.all_dependencies().len(), 2);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let task = Task::noop("finish twice");
        let finished = Arc::new(AtomicUsize::new(0));
        task.add_observer(counting_observer(finished.clone()))
            .unwrap();

        start(&task);
        task.finish(vec![TaskError::execution("first")]);
        task.finish(vec![TaskError::execution("second")]);

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Finished);
        let errors = task.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "execution failed: first");
        assert!(task.has_failed());
    }

    #[test]
    fn test_illegal_finish_is_ignored() {
        let task = Task::noop("too early");
        let finished = Arc::new(AtomicUsize::new(0));
        task.add_observer(counting_observer(finished.clone()))
            .unwrap();

        task.finish(Vec::new());
        assert_eq!(task.state(), TaskState::Initialized);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // The rejected call did not use up the one-shot finish
        task.cancel();
        task.finish(Vec::new());
        assert_eq!(task.state(), TaskState::Finished);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(matches!(task.outcome(), Some(TaskOutcome::Cancelled)));
    }

    #[test]
    fn test_cancel_accumulates_errors_once_flagged() {
        let task = Task::noop("cancel");
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = cancelled.clone();
        task.add_observer(BlockObserver::new().on_cancel(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        task.cancel_with_error(Some(TaskError::execution("one")));
        task.cancel_with_error(Some(TaskError::execution("two")));
        task.cancel_with_error(None);

        assert!(task.is_cancelled());
        assert_eq!(task.errors().len(), 2);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert!(!task.has_failed());
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let task = Task::noop("done");
        start(&task);
        task.finish(Vec::new());

        task.cancel_with_error(Some(TaskError::execution("late")));
        assert!(!task.is_cancelled());
        assert!(task.errors().is_empty());
        assert!(matches!(task.outcome(), Some(TaskOutcome::Succeeded)));
    }

    #[test]
    fn test_mutation_rejected_once_executing() {
        let task = Task::noop("frozen");
        let other = Task::noop("other");
        start(&task);

        assert!(matches!(
            task.add_dependency(&other),
            Err(EngineError::Immutable {
                state: TaskState::Executing,
                ..
            })
        ));
        assert!(task.add_guard(crate::guard::TrueGuard).is_err());
        assert!(task.add_observer(LoggingObserver).is_err());
    }

    #[test]
    fn test_enqueue_twice_fails() {
        let task = Task::noop("twice");
        task.will_enqueue().unwrap();
        assert!(matches!(
            task.will_enqueue(),
            Err(EngineError::AlreadyEnqueued(_))
        ));
    }

    #[test]
    fn test_produce_requires_enqueued_task() {
        let task = Task::noop("producer");
        let result = task.produce(Task::noop("child"));
        assert!(matches!(result, Err(EngineError::NotEnqueued(_))));
    }

    #[test]
    fn test_produce_notifies_observers() {
        let task = Task::noop("producer");
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        task.add_observer(BlockObserver::new().on_produce(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        start(&task);
        task.produce(Task::noop("child")).unwrap();
        assert_eq!(produced.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outcome_variants() {
        let errors = vec![TaskError::execution("boom")];

        assert!(TaskOutcome::from_parts(false, Vec::new()).is_success());
        assert!(TaskOutcome::from_parts(false, errors.clone()).is_failed());
        assert!(matches!(
            TaskOutcome::from_parts(true, Vec::new()),
            TaskOutcome::Cancelled
        ));
        let cancelled = TaskOutcome::from_parts(true, errors);
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_failed());
        assert_eq!(cancelled.errors().len(), 1);
    }

    #[test]
    fn test_delay_remaining() {
        assert_eq!(
            Delay::By(Duration::from_millis(5)).remaining(),
            Duration::from_millis(5)
        );
        let past = chrono::Utc::now() - chrono::Duration::seconds(5);
        assert_eq!(Delay::Until(past).remaining(), Duration::ZERO);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_from_fn_success_and_failure() {
        let scheduler = Scheduler::default();
        let ok = Task::from_fn("ok", |_ctx| async { Ok(()) });
        let bad = Task::from_fn("bad", |_ctx| async {
            Err(TaskError::execution("nope"))
        });

        scheduler.add_all([ok.clone(), bad.clone()]).unwrap();

        assert!(ok.wait().await.is_success());
        let outcome = bad.wait().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.errors().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_anyhow_errors_convert() {
        let scheduler = Scheduler::default();
        let task = Task::from_fn("anyhow", |_ctx| async {
            let parsed: anyhow::Result<u32> = Err(anyhow::anyhow!("bad number"));
            parsed?;
            Ok(())
        });

        scheduler.add(task.clone()).unwrap();
        let outcome = task.wait().await;
        assert!(matches!(outcome.errors(), [TaskError::Other(_)]));
        assert_eq!(outcome.errors()[0].to_string(), "bad number");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_sequence_is_monotonic() {
        let scheduler = Scheduler::default();
        let task = Task::from_fn("observed", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        });

        let mut rx = task.subscribe();
        let initial = *rx.borrow_and_update();
        let watcher = tokio::spawn(async move {
            let mut seen = vec![initial];
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                seen.push(state);
                if state == TaskState::Finished {
                    break;
                }
            }
            seen
        });

        scheduler.add(task.clone()).unwrap();
        task.wait().await;

        let seen = watcher.await.unwrap();
        assert_eq!(seen.first(), Some(&TaskState::Initialized));
        assert_eq!(seen.last(), Some(&TaskState::Finished));
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_body_is_recorded() {
        let scheduler = Scheduler::default();
        let task = Task::from_fn("panics", |_ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });

        scheduler.add(task.clone()).unwrap();
        let outcome = task.wait().await;
        assert!(outcome.is_failed());
        assert!(outcome.errors()[0].to_string().contains("kaboom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delay_task_waits() {
        let scheduler = Scheduler::default();
        let delay = Task::delay(Duration::from_millis(100));

        let started = Instant::now();
        scheduler.add(delay.clone()).unwrap();
        assert!(delay.wait().await.is_success());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delay_in_the_past_finishes_immediately() {
        let scheduler = Scheduler::default();
        let delay = Task::delay_until(chrono::Utc::now() - chrono::Duration::seconds(1));

        scheduler.add(delay.clone()).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), delay.wait())
            .await
            .expect("delay should finish at once");
        assert!(outcome.is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_cuts_delay_short() {
        let scheduler = Scheduler::default();
        let delay = Task::delay(Duration::from_secs(30));
        let started = Instant::now();
        scheduler.add(delay.clone()).unwrap();

        let mut rx = delay.subscribe();
        rx.wait_for(|state| *state == TaskState::Executing)
            .await
            .unwrap();
        delay.cancel();

        let outcome = delay.wait().await;
        assert!(outcome.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_observer_cancels_slow_task() {
        let scheduler = Scheduler::default();
        let task = Task::from_fn("slow", |ctx| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                _ = ctx.cancelled() => {}
            }
            Ok(())
        });
        task.add_observer(TimeoutObserver::new(Duration::from_millis(50)))
            .unwrap();

        scheduler.add(task.clone()).unwrap();
        let outcome = task.wait().await;

        assert!(outcome.is_cancelled());
        assert!(matches!(outcome.errors(), [TaskError::TimedOut(_)]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_profiling_observer_records_timings() {
        let scheduler = Scheduler::default();
        let profiler = ProfilingObserver::new();
        let task = Task::from_fn("profiled", |ctx| async move {
            ctx.produce(Task::noop("side job"))?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        });
        task.add_observer(profiler.clone()).unwrap();

        scheduler.add(task.clone()).unwrap();
        task.wait().await;

        let profile = profiler.profile().expect("profile recorded");
        assert_eq!(profile.task_id, task.id());
        assert_eq!(profile.produced.len(), 1);
        assert_eq!(profile.error_count, 0);
        assert!(profile.started_at.is_some());
        assert!(profile.execution_time().unwrap() >= chrono::Duration::milliseconds(10));

        let json = profiler.to_json().expect("serialize profile");
        assert!(json.contains("\"name\": \"profiled\""));
    }

    fn producer(name: &str, result: ResultSlot<u32>, value: Option<u32>) -> Task {
        Task::from_fn(name, move |_ctx| {
            let result = result.clone();
            async move {
                match value {
                    Some(value) => result.ready(value),
                    None => result.void(),
                }
                Ok(())
            }
        })
    }

    fn consumer(name: &str, requirement: ResultSlot<String>, seen: Arc<std::sync::Mutex<Vec<String>>>) -> Task {
        Task::from_fn(name, move |_ctx| {
            let requirement = requirement.clone();
            let seen = seen.clone();
            async move {
                let value = requirement
                    .value()
                    .ok_or_else(|| TaskError::execution("requirement missing"))?;
                crate::sync::lock(&seen).push(value);
                Ok(())
            }
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_injected_result_reaches_dependent() {
        let scheduler = Scheduler::default();
        let result = ResultSlot::new();
        let requirement = ResultSlot::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let fetch = producer("fetch", result.clone(), Some(42));
        let render = consumer("render", requirement.clone(), seen.clone());
        render
            .inject_result_via(&fetch, &result, &requirement, |value: u32| {
                Ok(format!("value={}", value))
            })
            .unwrap();

        assert!(requirement.is_pending());
        assert_eq!(render.dependencies(), vec![fetch.clone()]);

        // Dependent first, so only the dependency edge orders them.
        scheduler.add_all([render.clone(), fetch.clone()]).unwrap();
        assert!(render.wait().await.is_success());

        assert_eq!(result.get(), PendingValue::Ready(42));
        assert_eq!(requirement.value(), Some("value=42".to_string()));
        assert_eq!(crate::sync::lock(&seen).clone(), vec!["value=42".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_inject_block_sees_dependency_errors() {
        let scheduler = Scheduler::default();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let failing = Task::from_fn("failing", |_ctx| async {
            Err(TaskError::execution("disk full"))
        });
        let follower = Task::noop("follower");
        {
            let calls = calls.clone();
            follower
                .inject(&failing, move |task, dependency, errors| {
                    crate::sync::lock(&calls).push((
                        task.name().to_string(),
                        dependency.name().to_string(),
                        errors.len(),
                    ));
                })
                .unwrap();
        }

        scheduler.add_all([failing, follower.clone()]).unwrap();
        assert!(follower.wait().await.is_success());
        assert_eq!(
            crate::sync::lock(&calls).clone(),
            vec![("follower".to_string(), "failing".to_string(), 1)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_or_empty_result_cancels_dependent() {
        let scheduler = Scheduler::default();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let failed_result = ResultSlot::<u32>::new();
        let failing = Task::from_fn("failing", |_ctx| async {
            Err(TaskError::execution("upstream broke"))
        });
        let after_failure = consumer("after failure", ResultSlot::new(), seen.clone());
        after_failure
            .inject_result_via(&failing, &failed_result, &ResultSlot::new(), |value: u32| {
                Ok(value.to_string())
            })
            .unwrap();

        let empty_result = ResultSlot::new();
        let empty = producer("empty", empty_result.clone(), None);
        let after_empty = Task::noop("after empty");
        after_empty
            .inject_result(&empty, &empty_result, &ResultSlot::new())
            .unwrap();

        scheduler
            .add_all([failing, after_failure.clone(), empty, after_empty.clone()])
            .unwrap();

        let outcome = after_failure.wait().await;
        assert!(outcome.is_cancelled());
        assert!(matches!(outcome.errors(), [TaskError::FailedDependencies]));

        let outcome = after_empty.wait().await;
        assert!(outcome.is_cancelled());
        assert!(matches!(outcome.errors(), [TaskError::RequirementNotSatisfied]));
        assert_eq!(empty_result.get(), PendingValue::Void);
        assert!(crate::sync::lock(&seen).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_dependency_skips_injection() {
        let scheduler = Scheduler::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream = Task::noop("upstream");
        let downstream = Task::noop("downstream");
        {
            let calls = calls.clone();
            downstream
                .inject(&upstream, move |_, _, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        upstream.cancel();
        scheduler.add_all([upstream, downstream.clone()]).unwrap();

        let outcome = downstream.wait().await;
        assert!(outcome.is_cancelled());
        assert!(matches!(outcome.errors(), [TaskError::CancelledDependencies]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inject_rejected_once_guards_are_evaluating() {
        let upstream = Task::noop("upstream");
        let task = Task::noop("late");
        task.will_enqueue().unwrap();
        assert!(task.try_begin_guard_evaluation(0));

        assert!(matches!(
            task.inject(&upstream, |_, _, _| {}),
            Err(EngineError::Immutable {
                state: TaskState::EvaluatingGuards,
                ..
            })
        ));
        assert!(task.all_dependencies().is_empty());
    }
}
