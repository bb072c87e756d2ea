use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use flowgraph::dag::naming;
use flowgraph::dag::FlowDecision;
use flowgraph::engine::{FlowRequest, LaunchRequest, RuntimeEvent, TaskOutcome};
use flowgraph::errors::Result;
use flowgraph::exec::{Launcher, ScriptResolver};

/// Scripted outcomes, keyed by task name.
///
/// A task's queue is looked up by its exact name first, then by its ambiguous
/// name, so `"C"` also covers `"C#1"` and `"C*2"`. Each launch pops one
/// outcome; an empty queue means plain success.
#[derive(Debug, Clone, Default)]
pub struct OutcomePlan {
    outcomes: Arc<Mutex<HashMap<String, VecDeque<TaskOutcome>>>>,
}

impl OutcomePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: &str, outcome: TaskOutcome) -> &Self {
        self.outcomes
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn decide(&self, task: &str, decision: FlowDecision) -> &Self {
        self.push(
            task,
            TaskOutcome::Success {
                decision: Some(decision),
            },
        )
    }

    pub fn next_for(&self, name: &str) -> TaskOutcome {
        let mut map = self.outcomes.lock().unwrap();
        for key in [name, naming::strip_suffix(name)] {
            if let Some(outcome) = map.get_mut(key).and_then(VecDeque::pop_front) {
                return outcome;
            }
        }
        TaskOutcome::Success { decision: None }
    }
}

/// A fake launcher that:
/// - records which tasks were "run"
/// - immediately reports the next planned outcome for each launched task.
pub struct FakeLauncher {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    launched: Arc<Mutex<Vec<String>>>,
    plan: OutcomePlan,
}

impl FakeLauncher {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        launched: Arc<Mutex<Vec<String>>>,
        plan: OutcomePlan,
    ) -> Self {
        Self {
            runtime_tx,
            launched,
            plan,
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch_tasks(
        &mut self,
        tasks: Vec<LaunchRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let launched = Arc::clone(&self.launched);
        let plan = self.plan.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = launched.lock().unwrap();
                    guard.push(t.name.clone());
                }

                tx.send(RuntimeEvent::TaskFinished {
                    job: t.job,
                    task: t.task,
                    outcome: plan.next_for(&t.name),
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}

/// Resolver that always answers with the action's default decision.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecisionResolver;

impl ScriptResolver for DefaultDecisionResolver {
    fn resolve(
        &mut self,
        request: FlowRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FlowDecision>> + Send + '_>> {
        Box::pin(async move { Ok(request.action.default_decision()) })
    }
}

/// Resolver whose flow scripts always fail, as a crashing script would.
#[derive(Debug, Clone, Default)]
pub struct FailingResolver;

impl ScriptResolver for FailingResolver {
    fn resolve(
        &mut self,
        request: FlowRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FlowDecision>> + Send + '_>> {
        Box::pin(async move {
            Err(anyhow::anyhow!("flow script of '{}' exited with code 1", request.name).into())
        })
    }
}
