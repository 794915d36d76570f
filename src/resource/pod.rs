/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/pod.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Pod (§4.3): the concrete status classifier. Derives success/failure from
//! pod phase, container readiness, restart counts, and the `PodScheduled`
//! condition (unschedulable quota/resource denials). Fed JSON by a parent
//! ReplicaSet (child mode) or fetches its own (standalone mode, for a bare
//! `Pod` manifest discovered directly).

use async_trait::async_trait;
use serde_json::Value;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::{Found, Resource, ResourceBase};

const FAILING_WAIT_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
    "RunContainerError",
];

pub struct PodResource {
    base: ResourceBase,
    standalone: bool,
    phase: String,
    containers_ready: bool,
    restart_count: i64,
    unschedulable: bool,
    failing_wait_reason: Option<String>,
}

impl PodResource {
    pub fn new(base: ResourceBase, standalone: bool) -> Self {
        Self {
            base,
            standalone,
            phase: "Unknown".to_string(),
            containers_ready: false,
            restart_count: 0,
            unschedulable: false,
            failing_wait_reason: None,
        }
    }

    /// Ingests a pod JSON blob fetched by a parent (ReplicaSet) sync.
    pub fn apply_json(&mut self, pod: &Value) {
        self.base.found = Found::Present;
        self.phase = pod
            .get("status")
            .and_then(|s| s.get("phase"))
            .and_then(|p| p.as_str())
            .unwrap_or("Unknown")
            .to_string();

        let statuses = pod
            .get("status")
            .and_then(|s| s.get("containerStatuses"))
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();

        self.containers_ready = !statuses.is_empty() && statuses.iter().all(|s| s.get("ready").and_then(|r| r.as_bool()).unwrap_or(false));

        self.restart_count = statuses
            .iter()
            .filter_map(|s| s.get("restartCount").and_then(|r| r.as_i64()))
            .sum();

        self.failing_wait_reason = statuses.iter().find_map(|s| {
            let reason = s.get("state")?.get("waiting")?.get("reason")?.as_str()?;
            if FAILING_WAIT_REASONS.contains(&reason) {
                Some(reason.to_string())
            } else {
                None
            }
        });

        self.unschedulable = pod
            .get("status")
            .and_then(|s| s.get("conditions"))
            .and_then(|c| c.as_array())
            .map(|conditions| {
                conditions.iter().any(|c| {
                    c.get("type").and_then(|t| t.as_str()) == Some("PodScheduled")
                        && c.get("status").and_then(|s| s.as_str()) == Some("False")
                        && c.get("reason").and_then(|r| r.as_str()) == Some("Unschedulable")
                })
            })
            .unwrap_or(false);

        self.base.status_text = format!(
            "phase={}, ready={}, restarts={}",
            self.phase, self.containers_ready, self.restart_count
        );
    }
}

#[async_trait]
impl Resource for PodResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        if !self.standalone {
            return Ok(());
        }
        let out = client
            .run(&["get", "pod", &self.base.name, "--output=json"], RunOptions::new(false))
            .await?;
        if !out.success {
            self.base.found = Found::Absent;
            self.base.status_text = "not found".to_string();
            return Ok(());
        }
        let pod: Value = serde_json::from_str(&out.stdout).unwrap_or(Value::Null);
        self.apply_json(&pod);
        Ok(())
    }

    fn exists(&self) -> bool {
        self.standalone.then(|| self.base.found.is_present()).unwrap_or(true)
    }

    fn deploy_succeeded(&self) -> bool {
        self.exists() && self.phase == "Running" && self.containers_ready
    }

    fn deploy_failed(&self) -> bool {
        self.phase == "Failed" || self.failing_wait_reason.is_some() || self.unschedulable
    }

    fn debug_message(&self) -> String {
        if let Some(reason) = &self.failing_wait_reason {
            format!("{}: container waiting on {}", self.pretty_status(), reason)
        } else if self.unschedulable {
            format!("{}: pod is unschedulable", self.pretty_status())
        } else {
            self.pretty_status()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn base() -> ResourceBase {
        ResourceBase::new("Pod", "web-abc123-xyz", "default", "ctx", Duration::from_secs(300))
    }

    #[test]
    fn running_and_ready_is_success() {
        let mut resource = PodResource::new(base(), false);
        resource.apply_json(&json!({
            "status": {
                "phase": "Running",
                "containerStatuses": [{"ready": true, "restartCount": 0}]
            }
        }));
        assert!(resource.deploy_succeeded());
        assert!(!resource.deploy_failed());
    }

    #[test]
    fn crash_loop_backoff_is_failure() {
        let mut resource = PodResource::new(base(), false);
        resource.apply_json(&json!({
            "status": {
                "phase": "Pending",
                "containerStatuses": [{
                    "ready": false,
                    "restartCount": 4,
                    "state": {"waiting": {"reason": "CrashLoopBackOff"}}
                }]
            }
        }));
        assert!(resource.deploy_failed());
        assert!(!resource.deploy_succeeded());
    }

    #[test]
    fn unschedulable_condition_is_failure() {
        let mut resource = PodResource::new(base(), false);
        resource.apply_json(&json!({
            "status": {
                "phase": "Pending",
                "conditions": [{"type": "PodScheduled", "status": "False", "reason": "Unschedulable"}]
            }
        }));
        assert!(resource.deploy_failed());
    }
}
