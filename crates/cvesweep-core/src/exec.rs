//! External process invocation.
//!
//! Every tool adapter goes through [`CommandExecutor`] so tests can swap in a
//! scripted executor instead of spawning real processes.

use crate::error::ExecError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args` and return its stdout.
    ///
    /// Implementations must stop waiting (and terminate the child if there is
    /// one) once `cancel` fires.
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn exec(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled(program.to_string()));
        }

        debug!("exec: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on cancellation drops the child, which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ExecError::Cancelled(program.to_string()));
            }
            output = child.wait_with_output() => output.map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Scripted executor keyed by the full command line, for unit tests.
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    pub(crate) struct ScriptedExecutor {
        pub outputs: HashMap<String, String>,
        pub failures: HashSet<String>,
    }

    impl ScriptedExecutor {
        pub fn output(mut self, command: &str, stdout: &str) -> Self {
            self.outputs.insert(command.to_string(), stdout.to_string());
            self
        }

        pub fn fail(mut self, command: &str) -> Self {
            self.failures.insert(command.to_string());
            self
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn exec(
            &self,
            program: &str,
            args: &[String],
            cancel: &CancellationToken,
        ) -> Result<Vec<u8>, ExecError> {
            if cancel.is_cancelled() {
                return Err(ExecError::Cancelled(program.to_string()));
            }
            let full = format!("{} {}", program, args.join(" "));
            if self.failures.contains(&full) {
                return Err(ExecError::Failed {
                    program: program.to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: format!("command failed: {full}"),
                });
            }
            match self.outputs.get(&full) {
                Some(out) => Ok(out.as_bytes().to_vec()),
                None => Err(ExecError::Failed {
                    program: program.to_string(),
                    status: "exit status: 127".to_string(),
                    stderr: format!("unknown command: {full}"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let executor = ProcessExecutor;
        let cancel = CancellationToken::new();
        let err = executor
            .exec("/this/does/not/exist", &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_spawns() {
        let executor = ProcessExecutor;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor
            .exec("/this/does/not/exist", &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout() {
        let executor = ProcessExecutor;
        let cancel = CancellationToken::new();
        let out = executor
            .exec("sh", &["-c".to_string(), "printf hello".to_string()], &cancel)
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let executor = ProcessExecutor;
        let cancel = CancellationToken::new();
        let err = executor
            .exec(
                "sh",
                &["-c".to_string(), "echo boom >&2; exit 3".to_string()],
                &cancel,
            )
            .await
            .unwrap_err();
        match err {
            ExecError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_interrupts_running_process() {
        let executor = ProcessExecutor;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = executor
            .exec("sleep", &["5".to_string()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
    }
}
