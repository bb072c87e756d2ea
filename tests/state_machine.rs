// tests/state_machine.rs

use chrono::Utc;

use flowgraph::dag::{ExecutionLimits, TaskId, TaskNode, TaskStatus};
use flowgraph::errors::FlowgraphError;
use flowgraph::types::OnTaskError;

fn running(max_executions: u32, max_executions_on_failure: u32) -> TaskNode {
    let limits = ExecutionLimits {
        max_executions,
        max_executions_on_failure,
    };
    let mut t = TaskNode::new(TaskId(1), "A", limits).unwrap();
    t.mark_pending().unwrap();
    t.on_dispatch(Utc::now()).unwrap();
    t
}

#[test]
fn executable_errors_retry_until_faulty() {
    let mut t = running(2, 2);
    let mut seen = vec![TaskStatus::Running];

    seen.push(t.on_executable_error(OnTaskError::Continue, Utc::now()).unwrap());
    t.on_dispatch(Utc::now()).unwrap();
    seen.push(t.status());
    seen.push(t.on_executable_error(OnTaskError::Continue, Utc::now()).unwrap());

    assert_eq!(
        seen,
        vec![
            TaskStatus::Running,
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Faulty
        ]
    );
    assert_eq!(t.info().executions_left, 0);
    assert!(t.info().finished_time.is_some());
}

#[test]
fn single_execution_goes_straight_to_faulty() {
    let mut t = running(1, 2);
    let status = t.on_executable_error(OnTaskError::Continue, Utc::now()).unwrap();
    assert_eq!(status, TaskStatus::Faulty);
}

#[test]
fn zero_budget_does_not_underflow() {
    let mut t = running(0, 2);
    let status = t.on_executable_error(OnTaskError::Continue, Utc::now()).unwrap();
    assert_eq!(status, TaskStatus::Faulty);
    assert_eq!(t.info().executions_left, 0);
}

#[test]
fn suspend_parks_task_in_error_until_restarted() {
    let mut t = running(2, 2);

    let status = t.on_executable_error(OnTaskError::Suspend, Utc::now()).unwrap();
    assert_eq!(status, TaskStatus::InError);
    assert!(t.info().in_error_time.is_some());

    t.on_dispatch(Utc::now()).unwrap();
    assert_eq!(t.status(), TaskStatus::Running);
    assert!(t.info().in_error_time.is_none());

    t.on_success(Utc::now()).unwrap();
    assert_eq!(t.status(), TaskStatus::Finished);
    assert_eq!(t.info().progress, 100);
}

#[test]
fn node_failures_use_their_own_budget() {
    let mut t = running(1, 2);

    assert_eq!(t.on_node_failure().unwrap(), TaskStatus::Pending);
    assert_eq!(t.info().executions_left, 1);

    t.on_dispatch(Utc::now()).unwrap();
    assert_eq!(t.on_node_failure().unwrap(), TaskStatus::Failed);
    assert_eq!(t.info().executions_on_failure_left, 0);
}

#[test]
fn invalid_transitions_leave_status_untouched() {
    let mut t = TaskNode::new(TaskId(1), "A", ExecutionLimits::default()).unwrap();

    let err = t.on_success(Utc::now()).unwrap_err();
    assert!(matches!(
        err,
        FlowgraphError::InvalidTransition {
            from: TaskStatus::Submitted,
            ..
        }
    ));
    assert_eq!(t.status(), TaskStatus::Submitted);

    assert!(t.on_dispatch(Utc::now()).is_err());
    assert!(t.on_node_failure().is_err());
    assert_eq!(t.status(), TaskStatus::Submitted);
}

#[test]
fn running_tasks_cannot_be_skipped() {
    let mut t = running(1, 1);
    assert!(t.skip(Utc::now()).is_err());
    assert_eq!(t.status(), TaskStatus::Running);
}

#[test]
fn terminal_tasks_cannot_be_aborted() {
    let mut t = running(1, 1);
    t.on_success(Utc::now()).unwrap();

    assert!(t.abort(Utc::now()).is_err());
    assert_eq!(t.status(), TaskStatus::Finished);
}

#[test]
fn flow_error_makes_task_faulty() {
    let mut t = running(3, 3);
    t.on_flow_error(Utc::now()).unwrap();
    assert_eq!(t.status(), TaskStatus::Faulty);
    assert!(t.status().is_terminal());
}

#[test]
fn status_classification() {
    assert!(TaskStatus::Finished.satisfies_dependents());
    assert!(TaskStatus::Skipped.satisfies_dependents());
    assert!(!TaskStatus::Faulty.satisfies_dependents());
    assert!(TaskStatus::Skipped.is_settled());
    assert!(!TaskStatus::Faulty.is_settled());
    assert!(TaskStatus::Aborted.is_terminal());
    assert!(!TaskStatus::InError.is_terminal());
    assert!(!TaskStatus::Pending.is_terminal());
}
