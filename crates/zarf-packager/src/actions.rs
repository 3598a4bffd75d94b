//! Action runner
//!
//! Executes component action sets: shell commands through `sh -c`
//! (PowerShell on Windows), and wait predicates through the generic
//! wait-for facility. Commands see every active variable as both
//! `ZARF_VAR_<K>` and `TF_VAR_<k>` environment entries, and may capture
//! their trimmed stdout back into variables.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use zarf_core::schema::{Action, ActionDefaults, ActionSet, ActionWait};
use zarf_core::VariableConfig;
use zarf_kube::{wait, Cluster};

use crate::error::{PackagerError, Result};

/// Default time budget for an action with no explicit cap
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Pause between command retries
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runs the action sets of one component lifecycle phase
pub struct ActionRunner<'a> {
    pub variables: &'a mut VariableConfig,
    pub cluster: Option<&'a Cluster>,
    pub base_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl<'a> ActionRunner<'a> {
    pub fn new(
        variables: &'a mut VariableConfig,
        cluster: Option<&'a Cluster>,
        base_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            variables,
            cluster,
            base_dir: base_dir.into(),
            cancel,
        }
    }

    /// Run the `before` list of a set
    pub async fn run_before(&mut self, set: &ActionSet) -> Result<()> {
        self.run_list(&set.defaults, &set.before).await
    }

    /// Run the `after` list of a set
    pub async fn run_after(&mut self, set: &ActionSet) -> Result<()> {
        self.run_list(&set.defaults, &set.after).await
    }

    /// Run the `onSuccess` list; failures here only warn
    pub async fn run_on_success(&mut self, set: &ActionSet) {
        if let Err(e) = self.run_list(&set.defaults, &set.on_success).await {
            tracing::warn!(error = %e, "onSuccess action failed");
        }
    }

    /// Run the `onFailure` list; failures here only warn
    pub async fn run_on_failure(&mut self, set: &ActionSet) {
        if let Err(e) = self.run_list(&set.defaults, &set.on_failure).await {
            tracing::warn!(error = %e, "onFailure action failed");
        }
    }

    async fn run_list(&mut self, defaults: &ActionDefaults, actions: &[Action]) -> Result<()> {
        for action in actions {
            if self.cancel.is_cancelled() {
                return Err(PackagerError::Cancelled("action execution".to_string()));
            }
            self.run_action(defaults, action).await?;
        }
        Ok(())
    }

    /// Run one action to completion, honoring its retry and time budgets
    pub async fn run_action(&mut self, defaults: &ActionDefaults, action: &Action) -> Result<()> {
        let description = action
            .description
            .clone()
            .or_else(|| action.cmd.clone())
            .unwrap_or_else(|| "wait".to_string());

        let max_total = action
            .max_total_seconds
            .or(defaults.max_total_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);

        if let Some(wait) = &action.wait {
            return self.run_wait(&description, wait, max_total).await;
        }

        let Some(cmd) = &action.cmd else {
            return Err(PackagerError::action(
                &description,
                "action defines neither cmd nor wait",
            ));
        };

        let max_retries = action.max_retries.unwrap_or(defaults.max_retries);
        let mute = action.mute.unwrap_or(defaults.mute);
        let deadline = tokio::time::Instant::now() + max_total;

        let mut attempt = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(PackagerError::action(
                    &description,
                    format!("exceeded {}s time budget", max_total.as_secs()),
                ));
            }

            match self
                .run_command_once(defaults, action, cmd, mute, remaining)
                .await
            {
                Ok(stdout) => {
                    for set in &action.set_variables {
                        self.variables.set_variable(set, stdout.trim());
                    }
                    return Ok(());
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        action = %description,
                        attempt,
                        error = %e,
                        "action failed, retrying"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_command_once(
        &self,
        defaults: &ActionDefaults,
        action: &Action,
        cmd: &str,
        mute: bool,
        timeout: Duration,
    ) -> Result<String> {
        let cmd = mutate_command(cmd);
        let description = action.description.as_deref().unwrap_or(&cmd);

        let dir = action
            .dir
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(if defaults.dir.is_empty() {
                None
            } else {
                Some(defaults.dir.as_str())
            })
            .map(|d| self.base_dir.join(d))
            .unwrap_or_else(|| self.base_dir.clone());

        let mut command = shell_command(&cmd);
        command
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(if mute { Stdio::null() } else { Stdio::inherit() });

        for entry in defaults.env.iter().chain(action.env.iter()) {
            if let Some((key, value)) = entry.split_once('=') {
                command.env(key, value);
            }
        }
        for (name, value) in self.variables.all() {
            command.env(format!("ZARF_VAR_{name}"), &value.value);
            command.env(format!("TF_VAR_{}", name.to_lowercase()), &value.value);
        }

        if !mute {
            tracing::info!(action = %description, "running action");
        }

        let output = tokio::select! {
            result = tokio::time::timeout(timeout, command.output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    return Err(PackagerError::action(
                        description,
                        format!("timed out after {}s", timeout.as_secs()),
                    ))
                }
            },
            _ = self.cancel.cancelled() => {
                return Err(PackagerError::Cancelled(description.to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            return Err(PackagerError::action(
                description,
                format!(
                    "exited with {}",
                    output
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string())
                ),
            ));
        }

        if !mute && !stdout.is_empty() {
            tracing::debug!(action = %description, output = %stdout.trim_end());
        }
        Ok(stdout)
    }

    async fn run_wait(
        &self,
        description: &str,
        wait: &ActionWait,
        timeout: Duration,
    ) -> Result<()> {
        match wait {
            ActionWait::Cluster(predicate) => {
                let cluster = self.cluster.ok_or_else(|| {
                    PackagerError::action(description, "cluster wait requires a cluster connection")
                })?;
                wait::wait_for_cluster(cluster.client(), predicate, timeout)
                    .await
                    .map_err(|e| PackagerError::action(description, e.to_string()))
            }
            ActionWait::Network(predicate) => wait::wait_for_network(predicate, timeout)
                .await
                .map_err(|e| PackagerError::action(description, e.to_string())),
        }
    }
}

/// Apply the well-known command mutations before execution
fn mutate_command(cmd: &str) -> String {
    let mut cmd = cmd.to_string();

    // `./zarf ` invokes this executable wherever it actually lives.
    if cmd.contains("./zarf ") {
        if let Ok(exe) = std::env::current_exe() {
            cmd = cmd.replace("./zarf ", &format!("{} ", exe.display()));
        }
    }

    if cfg!(windows) {
        cmd = cmd.replace("touch ", "New-Item ");
        // `${ZARF_VAR_X}` style interpolation becomes PowerShell env access.
        while let Some(start) = cmd.find("${ZARF_VAR_") {
            let Some(end) = cmd[start..].find('}') else {
                break;
            };
            let name = cmd[start + 2..start + end].to_string();
            cmd.replace_range(start..=start + end, &format!("$Env:{name}"));
        }
    }

    cmd
}

#[cfg(not(windows))]
fn shell_command(cmd: &str) -> tokio::process::Command {
    let mut command = tokio::process::Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> tokio::process::Command {
    let mut command = tokio::process::Command::new("powershell");
    command.arg("-Command").arg(cmd);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarf_core::schema::SetVariable;

    fn runner(variables: &mut VariableConfig) -> ActionRunner<'_> {
        ActionRunner::new(variables, None, ".", CancellationToken::new())
    }

    fn cmd_action(cmd: &str) -> Action {
        Action {
            cmd: Some(cmd.to_string()),
            mute: Some(true),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn successful_command_runs() {
        let mut variables = VariableConfig::new();
        let mut runner = runner(&mut variables);
        runner
            .run_action(&ActionDefaults::default(), &cmd_action("true"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failing_command_errors_after_retries() {
        let mut variables = VariableConfig::new();
        let mut runner = runner(&mut variables);

        let mut action = cmd_action("false");
        action.max_retries = Some(2);

        let err = runner
            .run_action(&ActionDefaults::default(), &action)
            .await
            .unwrap_err();
        assert!(matches!(err, PackagerError::Action { .. }));
    }

    #[tokio::test]
    async fn set_variable_captures_trimmed_stdout() {
        let mut variables = VariableConfig::new();
        let mut runner = runner(&mut variables);

        let mut action = cmd_action("echo '  captured-value  '");
        action.set_variables = vec![SetVariable {
            name: "CAPTURED".to_string(),
            ..Default::default()
        }];

        runner
            .run_action(&ActionDefaults::default(), &action)
            .await
            .unwrap();
        assert_eq!(variables.get("CAPTURED").unwrap().value, "captured-value");
    }

    #[tokio::test]
    async fn variables_are_visible_as_env() {
        let mut variables = VariableConfig::new();
        variables.set_variable(
            &SetVariable {
                name: "GREETING".to_string(),
                ..Default::default()
            },
            "hello",
        );
        let mut runner = runner(&mut variables);

        let mut action = cmd_action("test \"$ZARF_VAR_GREETING\" = hello");
        action.max_retries = Some(0);
        runner
            .run_action(&ActionDefaults::default(), &action)
            .await
            .unwrap();

        let tf_action = cmd_action("test \"$TF_VAR_greeting\" = hello");
        runner
            .run_action(&ActionDefaults::default(), &tf_action)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn timeout_bounds_long_commands() {
        let mut variables = VariableConfig::new();
        let mut runner = runner(&mut variables);

        let mut action = cmd_action("sleep 5");
        action.max_total_seconds = Some(1);

        let start = std::time::Instant::now();
        let err = runner
            .run_action(&ActionDefaults::default(), &action)
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(matches!(err, PackagerError::Action { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_execution() {
        let mut variables = VariableConfig::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut runner = ActionRunner::new(&mut variables, None, ".", cancel);

        let set = ActionSet {
            before: vec![cmd_action("true")],
            ..Default::default()
        };
        let err = runner.run_before(&set).await.unwrap_err();
        assert!(matches!(err, PackagerError::Cancelled(_)));
    }

    #[test]
    fn command_mutation_rewrites_self_invocations() {
        let mutated = mutate_command("./zarf tools wait-for pod app");
        assert!(!mutated.starts_with("./zarf"));
        assert!(mutated.contains("tools wait-for pod app"));
    }
}
