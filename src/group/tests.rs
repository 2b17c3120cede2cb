#[cfg(test)]
mod tests {
    use crate::error::{EngineError, TaskError};
    use crate::group::*;
    use crate::scheduler::Scheduler;
    use crate::sync::lock;
    use crate::task::{Task, TaskOutcome, TaskState};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn sleeper(name: &str, millis: u64) -> Task {
        Task::from_fn(name, move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        })
    }

    fn failing(name: &str, millis: u64, message: &'static str) -> Task {
        Task::from_fn(name, move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Err(TaskError::execution(message))
        })
    }

    fn messages(errors: &[TaskError]) -> Vec<String> {
        errors.iter().map(ToString::to_string).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_group_finishes_after_children() {
        let scheduler = Scheduler::default();
        let children = vec![sleeper("a", 30), sleeper("b", 10), Task::noop("c")];
        let group = TaskGroup::new("batch", children.clone());

        scheduler.add(group.task().clone()).unwrap();
        let outcome = group.task().wait().await;

        assert!(outcome.is_success());
        for child in &children {
            assert_eq!(child.state(), TaskState::Finished);
        }
        assert_eq!(group.children(), children);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_group_finishes() {
        let scheduler = Scheduler::default();
        let group = TaskGroup::new("empty", Vec::new());

        scheduler.add(group.task().clone()).unwrap();
        assert!(group.task().wait().await.is_success());
        assert!(group.children().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_produced_task_delays_group_completion() {
        let scheduler = Scheduler::default();
        let done = Arc::new(AtomicBool::new(false));
        let produced = {
            let done = done.clone();
            Task::from_fn("produced", move |_ctx| {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    done.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let producer = {
            let produced = produced.clone();
            Task::from_fn("producer", move |ctx| {
                let produced = produced.clone();
                async move {
                    ctx.produce(produced)?;
                    Ok(())
                }
            })
        };
        let group = TaskGroup::new("producing", [producer]);

        scheduler.add(group.task().clone()).unwrap();
        assert!(group.task().wait().await.is_success());

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(produced.state(), TaskState::Finished);
        assert!(group.children().contains(&produced));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_errors_aggregate_in_registration_order() {
        let scheduler = Scheduler::default();
        let group = TaskGroup::new(
            "mixed",
            [
                failing("slow", 60, "slow failure"),
                sleeper("ok", 5),
                failing("fast", 1, "fast failure"),
            ],
        );

        scheduler.add(group.task().clone()).unwrap();
        let outcome = group.task().wait().await;

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert_eq!(
            messages(outcome.errors()),
            vec![
                "execution failed: slow failure".to_string(),
                "execution failed: fast failure".to_string()
            ]
        );
        assert_eq!(group.aggregate_errors().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_child_hooks_run_for_each_child() {
        let scheduler = Scheduler::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let group = TaskGroup::new("hooked", [Task::noop("a"), failing("b", 1, "boom")]);
        {
            let seen = seen.clone();
            group.on_child_finished(move |child, errors| {
                lock(&seen).push((child.name().to_string(), errors.len()));
            });
        }

        scheduler.add(group.task().clone()).unwrap();
        group.task().wait().await;

        let mut seen = lock(&seen).clone();
        seen.sort();
        assert_eq!(seen, vec![("a".to_string(), 0), ("b".to_string(), 1)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_child_while_running() {
        let scheduler = Scheduler::default();
        let group = TaskGroup::new("growing", [sleeper("first", 80)]);
        let late = Task::noop("late");

        scheduler.add(group.task().clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        group.add_child(late.clone()).unwrap();

        assert!(group.task().wait().await.is_success());
        assert_eq!(late.state(), TaskState::Finished);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finished_group_is_sealed() {
        let scheduler = Scheduler::default();
        let group = TaskGroup::new("sealed", [Task::noop("only")]);

        scheduler.add(group.task().clone()).unwrap();
        group.task().wait().await;

        assert!(matches!(
            group.add_child(Task::noop("too late")),
            Err(EngineError::GroupSealed(id)) if id == group.task().id()
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_propagates_to_children() {
        let scheduler = Scheduler::default();
        let children: Vec<Task> = (0..3)
            .map(|i| {
                Task::from_fn(format!("waiter {}", i), |ctx| async move {
                    tokio::select! {
                        _ = ctx.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(10)) => {}
                    }
                    Ok(())
                })
            })
            .collect();
        let group = TaskGroup::new("cancellable", children.clone());

        scheduler.add(group.task().clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        group.task().cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), group.task().wait())
            .await
            .unwrap();
        assert!(matches!(outcome, TaskOutcome::Cancelled));
        for child in &children {
            assert!(child.is_cancelled());
            assert!(child.is_finished());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_before_start_skips_children() {
        let scheduler = Scheduler::default();
        let ran = Arc::new(AtomicUsize::new(0));
        let child = {
            let ran = ran.clone();
            Task::from_fn("child", move |_ctx| {
                let ran = ran.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let group = TaskGroup::new("never", [child.clone()]);
        group.task().cancel();

        scheduler.add(group.task().clone()).unwrap();
        assert!(group.task().wait().await.is_cancelled());
        assert!(child.is_cancelled());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nested_group_propagates_errors() {
        let scheduler = Scheduler::default();
        let inner = TaskGroup::new("inner", [Task::noop("a"), failing("b", 5, "inner failure")]);
        let outer = TaskGroup::new("outer", [inner.task().clone(), sleeper("c", 10)]);

        scheduler.add(outer.task().clone()).unwrap();
        let outcome = outer.task().wait().await;

        assert!(inner.task().has_failed());
        assert_eq!(
            messages(outcome.errors()),
            vec!["execution failed: inner failure".to_string()]
        );
    }

    struct Extra {
        executed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl GroupBehavior for Extra {
        fn will_execute(&self, group: &GroupHandle) {
            self.executed.fetch_add(1, Ordering::SeqCst);
            group.add_child(Task::noop("extra")).unwrap();
        }

        fn child_will_finish(&self, group: &GroupHandle, _child: &Task, errors: &[TaskError]) {
            self.finished.fetch_add(1, Ordering::SeqCst);
            if !errors.is_empty() {
                group.aggregate_error(TaskError::execution("child failed"));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_behavior() {
        let scheduler = Scheduler::default();
        let behavior = Extra {
            executed: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        };
        let group = TaskGroup::with_behavior("custom", [failing("bad", 1, "raw error")], behavior);

        scheduler.add(group.task().clone()).unwrap();
        let outcome = group.task().wait().await;

        let names: Vec<String> = group
            .children()
            .iter()
            .map(|child| child.name().to_string())
            .collect();
        assert_eq!(names, vec!["bad", "extra"]);
        assert_eq!(
            messages(outcome.errors()),
            vec!["execution failed: child failed".to_string()]
        );
    }
}
