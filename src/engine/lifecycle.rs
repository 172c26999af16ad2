// ABOUTME: Lifecycle hook execution for update events.
// ABOUTME: Runs label-defined commands inside containers with timeouts and UID/GID.

use std::time::Duration;

use crate::config::Settings;
use crate::container::{Container, labels};
use crate::runtime::{ExecError, ExecOps};

/// POSIX EX_TEMPFAIL: skip this container this cycle, not an error.
const EX_TEMPFAIL: i64 = 75;

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// Hook execution points in the update lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Before the staleness check. Best-effort.
    PreCheck,
    /// Before the container is stopped. Non-zero exit skips the container.
    PreUpdate,
    /// After an updated successor started. Best-effort.
    PostUpdate,
    /// After a restarted (image-unchanged) successor started. Best-effort.
    PostRestart,
}

impl HookKind {
    /// The label holding this hook's command.
    pub fn label(&self) -> &'static str {
        match self {
            HookKind::PreCheck => labels::PRE_CHECK,
            HookKind::PreUpdate => labels::PRE_UPDATE,
            HookKind::PostUpdate => labels::POST_UPDATE,
            HookKind::PostRestart => labels::POST_RESTART,
        }
    }

    /// Whether a failure of this hook blocks the container's update.
    pub fn is_blocking(&self) -> bool {
        matches!(self, HookKind::PreUpdate)
    }
}

/// Result of running one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Hook ran and exited zero, or there was nothing to run.
    Proceed,
    /// No exec target: the container is not running. The update proceeds.
    NoTarget,
    /// EX_TEMPFAIL: skip this container this cycle, not an error.
    SkipTempFail,
    /// Any other non-zero exit: skip, recording the exit code.
    SkipFailed { exit_code: i64 },
    /// The hook timed out; equivalent to a non-zero exit.
    TimedOut(Duration),
}

impl HookOutcome {
    pub fn allows_update(&self) -> bool {
        matches!(self, HookOutcome::Proceed | HookOutcome::NoTarget)
    }
}

/// Executes lifecycle hooks recorded in container labels.
pub struct HookRunner {
    enabled: bool,
    uid: Option<u32>,
    gid: Option<u32>,
}

impl HookRunner {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.lifecycle_hooks,
            uid: settings.lifecycle_uid,
            gid: settings.lifecycle_gid,
        }
    }

    /// Run `kind` for `container` if hooks are enabled and a command is set.
    pub async fn run<C: ExecOps>(
        &self,
        client: &C,
        container: &Container,
        kind: HookKind,
    ) -> HookOutcome {
        if !self.enabled {
            return HookOutcome::Proceed;
        }

        let Some(command) = container.hook_command(kind.label()) else {
            return HookOutcome::Proceed;
        };

        if !container.is_running() || container.is_restarting() {
            tracing::debug!(
                container = %container.name,
                hook = kind.label(),
                "container is not running, skipping hook"
            );
            return HookOutcome::NoTarget;
        }

        let timeout = container
            .hook_timeout_secs(kind.label())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HOOK_TIMEOUT);

        tracing::info!(
            container = %container.name,
            hook = kind.label(),
            command,
            "running lifecycle hook"
        );

        match client
            .execute(&container.id, command, timeout, self.uid, self.gid)
            .await
        {
            Ok(outcome) if outcome.exit_code == 0 => HookOutcome::Proceed,
            Ok(outcome) if outcome.exit_code == EX_TEMPFAIL => {
                tracing::info!(
                    container = %container.name,
                    hook = kind.label(),
                    "hook requested temporary skip"
                );
                HookOutcome::SkipTempFail
            }
            Ok(outcome) => {
                tracing::warn!(
                    container = %container.name,
                    hook = kind.label(),
                    exit_code = outcome.exit_code,
                    "hook exited non-zero"
                );
                HookOutcome::SkipFailed {
                    exit_code: outcome.exit_code,
                }
            }
            Err(ExecError::Timeout(t)) => {
                tracing::warn!(
                    container = %container.name,
                    hook = kind.label(),
                    timeout = ?t,
                    "hook timed out"
                );
                HookOutcome::TimedOut(t)
            }
            Err(e) => {
                tracing::warn!(
                    container = %container.name,
                    hook = kind.label(),
                    error = %e,
                    "hook execution failed"
                );
                HookOutcome::SkipFailed { exit_code: -1 }
            }
        }
    }

    /// Run a best-effort hook, logging failures without reporting them.
    pub async fn run_best_effort<C: ExecOps>(
        &self,
        client: &C,
        container: &Container,
        kind: HookKind,
    ) {
        debug_assert!(!kind.is_blocking());
        let outcome = self.run(client, container, kind).await;
        if !outcome.allows_update() {
            tracing::warn!(
                container = %container.name,
                hook = kind.label(),
                ?outcome,
                "best-effort hook did not succeed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::{ContainerBuilder, MockClient, Op};

    fn runner() -> HookRunner {
        HookRunner {
            enabled: true,
            uid: None,
            gid: None,
        }
    }

    #[tokio::test]
    async fn disabled_runner_always_proceeds() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .label(labels::PRE_UPDATE, "/bin/prep")
            .build();
        client.add_container(c.clone());
        client.script_exec("/bin/prep", 1);

        let disabled = HookRunner {
            enabled: false,
            uid: None,
            gid: None,
        };
        assert_eq!(
            disabled.run(&client, &c, HookKind::PreUpdate).await,
            HookOutcome::Proceed
        );
        assert!(client.ops().is_empty());
    }

    #[tokio::test]
    async fn missing_command_proceeds_without_exec() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app").build();
        client.add_container(c.clone());

        assert_eq!(
            runner().run(&client, &c, HookKind::PreUpdate).await,
            HookOutcome::Proceed
        );
        assert!(client.ops().is_empty());
    }

    #[tokio::test]
    async fn zero_exit_proceeds() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .label(labels::PRE_UPDATE, "/bin/prep")
            .build();
        client.add_container(c.clone());

        assert_eq!(
            runner().run(&client, &c, HookKind::PreUpdate).await,
            HookOutcome::Proceed
        );
        assert_eq!(
            client.ops(),
            vec![Op::Exec("app".to_string(), "/bin/prep".to_string())]
        );
    }

    #[tokio::test]
    async fn tempfail_exit_skips_quietly() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .label(labels::PRE_UPDATE, "/bin/prep")
            .build();
        client.add_container(c.clone());
        client.script_exec("/bin/prep", 75);

        assert_eq!(
            runner().run(&client, &c, HookKind::PreUpdate).await,
            HookOutcome::SkipTempFail
        );
    }

    #[tokio::test]
    async fn other_exit_codes_record_the_code() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .label(labels::PRE_UPDATE, "/bin/prep")
            .build();
        client.add_container(c.clone());
        client.script_exec("/bin/prep", 3);

        assert_eq!(
            runner().run(&client, &c, HookKind::PreUpdate).await,
            HookOutcome::SkipFailed { exit_code: 3 }
        );
    }

    #[tokio::test]
    async fn stopped_container_has_no_target() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .label(labels::PRE_UPDATE, "/bin/prep")
            .stopped()
            .build();
        client.add_container(c.clone());

        let outcome = runner().run(&client, &c, HookKind::PreUpdate).await;
        assert_eq!(outcome, HookOutcome::NoTarget);
        assert!(outcome.allows_update());
        assert!(client.ops().is_empty());
    }

    #[test]
    fn only_pre_update_blocks() {
        assert!(HookKind::PreUpdate.is_blocking());
        assert!(!HookKind::PreCheck.is_blocking());
        assert!(!HookKind::PostUpdate.is_blocking());
        assert!(!HookKind::PostRestart.is_blocking());
    }
}
