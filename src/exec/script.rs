// src/exec/script.rs

//! Flow script evaluation.
//!
//! A flow script is a shell command run after its task succeeded. It states
//! its decision on stdout, one `key=value` line:
//!
//! ```text
//! loop=true          # LOOP: run the body again (anything else stops)
//! branch=else        # IF: "if" / "then" or "else"
//! runs=4             # REPLICATE: number of copies
//! ```
//!
//! The last matching line wins. When nothing usable is printed the action's
//! default decision applies.

use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, anyhow};
use regex::Regex;
use tracing::{debug, warn};

use crate::dag::{BranchChoice, FlowAction, FlowDecision};
use crate::engine::FlowRequest;
use crate::errors::Result;
use crate::exec::task_runner::shell_command;

static DECISION_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(loop|branch|runs)\s*=\s*(\S+)\s*$")
        .map_err(|e| warn!(error = %e, "invalid flow decision pattern"))
        .ok()
});

/// Turns a finished task's flow script into a decision.
pub trait ScriptResolver: Send {
    fn resolve(
        &mut self,
        request: FlowRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FlowDecision>> + Send + '_>>;
}

/// Runs flow scripts as local shell commands.
#[derive(Debug, Clone)]
pub struct CommandScriptResolver {
    timeout: Duration,
}

impl CommandScriptResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CommandScriptResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl ScriptResolver for CommandScriptResolver {
    fn resolve(
        &mut self,
        request: FlowRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FlowDecision>> + Send + '_>> {
        let timeout = self.timeout;

        Box::pin(async move {
            let Some(script) = request.script.as_deref() else {
                return Ok(request.action.default_decision());
            };

            debug!(task = %request.name, script = %script, "evaluating flow script");

            let output = tokio::time::timeout(timeout, shell_command(script).output())
                .await
                .map_err(|_| anyhow!("flow script of '{}' timed out", request.name))?
                .with_context(|| format!("running flow script of '{}'", request.name))?;

            if !output.status.success() {
                return Err(anyhow!(
                    "flow script of '{}' exited with {}",
                    request.name,
                    output.status
                )
                .into());
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(parse_decision(&request.action, &stdout))
        })
    }
}

/// Read a decision for `action` from flow script output.
pub fn parse_decision(action: &FlowAction, output: &str) -> FlowDecision {
    let Some(re) = DECISION_LINE.as_ref() else {
        return action.default_decision();
    };

    let mut decision = action.default_decision();
    for line in output.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let value = caps[2].trim_matches(|c| c == '"' || c == '\'');

        match (action, &caps[1]) {
            (FlowAction::Loop { .. }, "loop") => {
                decision = if value.eq_ignore_ascii_case("true") {
                    FlowDecision::Loop
                } else {
                    FlowDecision::Continue
                };
            }
            (FlowAction::If { .. }, "branch") => {
                let branch = match value.to_ascii_lowercase().as_str() {
                    "if" | "then" => Some(BranchChoice::Then),
                    "else" => Some(BranchChoice::Else),
                    _ => None,
                };
                match branch {
                    Some(branch) => decision = FlowDecision::If { branch },
                    None => warn!(value = %value, "unknown IF branch; ignoring"),
                }
            }
            (FlowAction::Replicate { .. }, "runs") => match value.parse::<u32>() {
                Ok(runs) => decision = FlowDecision::Replicate { runs },
                Err(e) => warn!(value = %value, error = %e, "invalid runs; ignoring"),
            },
            _ => {}
        }
    }

    decision
}
