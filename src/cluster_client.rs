/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/cluster_client.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Thin wrapper over the cluster CLI binary (§4.1). The only component that
//! talks to the outside world for cluster operations; every other module
//! goes through it, via the `ClusterRunner` trait object rather than the
//! concrete type (§3 Supplemental: every external collaborator is a trait
//! object "specifically so tests can substitute fakes without a live
//! cluster", the same shape as `Renderer`/`SecretsProvisioner`). Mirrors the
//! `tokio::process::Command` + captured stdout/stderr/exit-status pattern
//! used by `k8s_local_dev::sync::run_command` and the provisioners'
//! `execute_command` helper, generalized to return the output instead of
//! streaming it, since callers here need to parse it.

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

/// Per-call toggles for `ClusterClient::run` (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub use_namespace: bool,
    pub use_context: bool,
    pub log_failure: bool,
}

impl RunOptions {
    pub fn new(log_failure: bool) -> Self {
        Self {
            use_namespace: true,
            use_context: true,
            log_failure,
        }
    }

    pub fn without_namespace(mut self) -> Self {
        self.use_namespace = false;
        self
    }

    pub fn without_context(mut self) -> Self {
        self.use_context = false;
        self
    }
}

/// Captured result of a single cluster CLI invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// The CLI-invoking surface every other module depends on (§4.1). A trait,
/// not just `ClusterClient`'s inherent method, so resource `sync`/`apply_json`
/// and the Deployer/Discovery/Watcher/EventExtractor collaborators can be
/// driven in tests by a fake implementation instead of a real subprocess.
#[async_trait]
pub trait ClusterRunner: Send + Sync {
    /// Runs a single cluster CLI invocation and captures stdout/stderr/exit
    /// status. Never retries.
    async fn run(&self, args: &[&str], opts: RunOptions) -> anyhow::Result<CommandOutput>;
}

/// Wraps the `kubectl`-compatible binary used to talk to the cluster. No
/// retries; exit status is surfaced as-is (§4.1).
#[derive(Debug, Clone)]
pub struct ClusterClient {
    binary: String,
    namespace: String,
    context: String,
    log_failure_default: bool,
}

impl ClusterClient {
    pub fn new(binary: impl Into<String>, namespace: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            namespace: namespace.into(),
            context: context.into(),
            log_failure_default: true,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Convenience wrapper using this instance's default `log_failure`.
    pub async fn run_default(&self, args: &[&str]) -> anyhow::Result<CommandOutput> {
        self.run(args, RunOptions::new(self.log_failure_default)).await
    }
}

#[async_trait]
impl ClusterRunner for ClusterClient {
    /// Runs `<binary> [--namespace=ns] [--context=ctx] <args...>` and
    /// captures stdout/stderr/exit status. Never retries.
    async fn run(&self, args: &[&str], opts: RunOptions) -> anyhow::Result<CommandOutput> {
        let mut command = Command::new(&self.binary);

        if opts.use_namespace {
            command.arg(format!("--namespace={}", self.namespace));
        }
        if opts.use_context {
            command.arg(format!("--context={}", self.context));
        }
        command.args(args);

        debug!("running: {} {}", self.binary, args.join(" "));

        let output = command.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let success = output.status.success();

        if !success && opts.log_failure {
            warn!(
                "{} {} exited {:?}: {}",
                self.binary,
                args.join(" "),
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            success,
            code: output.status.code(),
        })
    }
}

/// A scripted `ClusterRunner` for tests (§3 Supplemental). Canned responses
/// are keyed by the space-joined argument list, the same shape every real
/// call site passes to `run`, so a test reads as "when asked to run this
/// kubectl command, answer with this JSON" without spawning a subprocess.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeClusterClient {
        responses: Mutex<HashMap<String, CommandOutput>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClusterClient {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Registers the output to return when `run` is called with exactly
        /// these args.
        pub(crate) fn on(&self, args: &[&str], output: CommandOutput) -> &Self {
            self.responses.lock().unwrap().insert(args.join(" "), output);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterRunner for FakeClusterClient {
        async fn run(&self, args: &[&str], _opts: RunOptions) -> anyhow::Result<CommandOutput> {
            let key = args.join(" ");
            self.calls.lock().unwrap().push(key.clone());
            match self.responses.lock().unwrap().get(&key) {
                Some(output) => Ok(output.clone()),
                None => Ok(fail(format!("fake cluster client has no response scripted for: {key}"))),
            }
        }
    }

    pub(crate) fn ok(stdout: impl Into<String>) -> CommandOutput {
        CommandOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    pub(crate) fn fail(stderr: impl Into<String>) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(1),
        }
    }
}
