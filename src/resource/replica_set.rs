/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/replica_set.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! ReplicaSet (§4.3): standalone (own `sync`) or child (fed JSON by a parent
//! Deployment). Owns a transient Pod list rebuilt on every `sync` — no
//! shared ownership, no cycles (§9 Design Notes).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::pod::PodResource;
use super::{default_timeout_for_kind, Found, Resource, ResourceBase};

#[derive(Debug, Default, Clone, Copy)]
struct RolloutState {
    replicas: i64,
    available_replicas: i64,
    ready_replicas: i64,
}

pub struct ReplicaSetResource {
    base: ResourceBase,
    standalone: bool,
    uid: Option<String>,
    state: RolloutState,
    pods: Vec<PodResource>,
    container_names: Vec<String>,
}

impl ReplicaSetResource {
    pub fn new(base: ResourceBase, standalone: bool) -> Self {
        Self {
            base,
            standalone,
            uid: None,
            state: RolloutState::default(),
            pods: Vec::new(),
            container_names: Vec::new(),
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Ingests a ReplicaSet JSON blob (own fetch, or handed down by a parent
    /// Deployment) and fetches/derives the pods it owns.
    pub async fn apply_json(&mut self, rs: &Value, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        self.base.found = Found::Present;
        self.uid = rs.get("metadata").and_then(|m| m.get("uid")).and_then(|u| u.as_str()).map(str::to_string);

        let status = rs.get("status");
        self.state = RolloutState {
            replicas: status.and_then(|s| s.get("replicas")).and_then(|v| v.as_i64()).unwrap_or(0),
            available_replicas: status.and_then(|s| s.get("availableReplicas")).and_then(|v| v.as_i64()).unwrap_or(0),
            ready_replicas: status.and_then(|s| s.get("readyReplicas")).and_then(|v| v.as_i64()).unwrap_or(0),
        };

        self.container_names = rs
            .get("spec")
            .and_then(|s| s.get("template"))
            .and_then(|t| t.get("spec"))
            .and_then(|s| s.get("containers"))
            .and_then(|c| c.as_array())
            .map(|containers| {
                containers
                    .iter()
                    .filter_map(|c| c.get("name").and_then(|n| n.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let selector_str = super::selector_to_string(rs.get("spec").and_then(|s| s.get("selector")));
        self.pods = self.fetch_owned_pods(client, selector_str.as_deref()).await?;

        self.base.status_text = format!(
            "{} replicas, {} available, {} ready, {} pod(s) tracked",
            self.state.replicas,
            self.state.available_replicas,
            self.state.ready_replicas,
            self.pods.len()
        );
        Ok(())
    }

    async fn fetch_owned_pods(&self, client: &dyn ClusterRunner, selector: Option<&str>) -> anyhow::Result<Vec<PodResource>> {
        let Some(selector) = selector else { return Ok(Vec::new()) };
        let Some(uid) = &self.uid else { return Ok(Vec::new()) };

        let out = client
            .run(
                &["get", "pods", "-a", &format!("--selector={selector}"), "--output=json"],
                RunOptions::new(false),
            )
            .await?;
        if !out.success {
            return Ok(Vec::new());
        }

        let list: Value = serde_json::from_str(&out.stdout).unwrap_or(Value::Null);
        let items = list.get("items").and_then(|i| i.as_array()).cloned().unwrap_or_default();

        let mut pods = Vec::new();
        for pod in items {
            if !super::owner_refs_contain(pod.get("metadata").and_then(|m| m.get("ownerReferences")), uid) {
                continue;
            }
            let name = pod
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_string();
            let base = ResourceBase::new("Pod", name, self.base.namespace.clone(), self.base.context.clone(), default_timeout_for_kind("Pod"));
            let mut pod_resource = PodResource::new(base, false);
            pod_resource.set_parent(self.base.id());
            if let Some(started) = self.base.deploy_started_at {
                pod_resource.set_deploy_started_at(started);
            }
            pod_resource.apply_json(&pod);
            pods.push(pod_resource);
        }
        Ok(pods)
    }

    pub async fn fetch_logs_for(&self, client: &dyn ClusterRunner) -> anyhow::Result<HashMap<String, String>> {
        let mut logs = HashMap::new();
        let since: Option<DateTime<Utc>> = self.base.deploy_started_at;
        for pod in &self.pods {
            for container in &self.container_names {
                let mut args = vec!["logs".to_string(), pod.name().to_string(), format!("--container={container}")];
                if let Some(since) = since {
                    args.push(format!("--since-time={}", since.to_rfc3339()));
                }
                args.push("--tail=250".to_string());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                let out = client.run(&arg_refs, RunOptions::new(false)).await?;
                if out.success {
                    logs.insert(format!("{}/{}", pod.name(), container), out.stdout);
                }
            }
        }
        Ok(logs)
    }
}

#[async_trait]
impl Resource for ReplicaSetResource {
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
            .run(&["get", "replicaset", &self.base.name, "--output=json"], RunOptions::new(false))
            .await?;
        if !out.success {
            self.base.found = Found::Absent;
            self.base.status_text = "not found".to_string();
            return Ok(());
        }
        let rs: Value = serde_json::from_str(&out.stdout).unwrap_or(Value::Null);
        self.apply_json(&rs, client).await
    }

    fn exists(&self) -> bool {
        if self.standalone {
            self.base.found.is_present()
        } else {
            true
        }
    }

    fn deploy_succeeded(&self) -> bool {
        self.state.replicas == self.state.available_replicas && self.state.replicas == self.state.ready_replicas
    }

    fn deploy_failed(&self) -> bool {
        !self.pods.is_empty() && self.pods.iter().all(|p| p.deploy_failed())
    }

    fn deploy_timed_out(&self) -> bool {
        let own = self.base.timed_out_as_of(Utc::now());
        let pods_timed_out = !self.pods.is_empty() && self.pods.iter().all(|p| p.deploy_timed_out());
        own || pods_timed_out
    }

    async fn fetch_logs(&self, client: &dyn ClusterRunner) -> anyhow::Result<HashMap<String, String>> {
        self.fetch_logs_for(client).await
    }

    fn debug_message(&self) -> String {
        let mut message = self.pretty_status();
        for pod in &self.pods {
            if pod.deploy_failed() {
                message.push('\n');
                message.push_str(&pod.debug_message());
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ResourceBase {
        ResourceBase::new("ReplicaSet", "web-abc123", "default", "ctx", Duration::from_secs(300))
    }

    #[test]
    fn succeeds_when_replica_counts_agree() {
        let mut rs = ReplicaSetResource::new(base(), true);
        rs.state = RolloutState {
            replicas: 2,
            available_replicas: 2,
            ready_replicas: 2,
        };
        assert!(rs.deploy_succeeded());
        rs.state.ready_replicas = 1;
        assert!(!rs.deploy_succeeded());
    }

    #[test]
    fn owned_pods_are_parented_to_the_replica_set() {
        let rs = ReplicaSetResource::new(base(), true);
        let pod_base = ResourceBase::new("Pod", "web-abc123-xyz", "default", "ctx", Duration::from_secs(300));
        let mut pod = PodResource::new(pod_base, false);
        pod.set_parent(rs.base().id());
        assert_eq!(pod.base().parent.as_deref(), Some("ReplicaSet/web-abc123"));
    }

    #[tokio::test]
    async fn apply_json_fetches_and_parents_owned_pods() {
        use crate::cluster_client::fake::{ok, FakeClusterClient};

        let fake = FakeClusterClient::new();
        fake.on(
            &["get", "pods", "-a", "--selector=pod-template-hash=abc", "--output=json"],
            ok(serde_json::json!({"items": [{
                "metadata": {"name": "web-abc123-xyz", "ownerReferences": [{"uid": "rs-uid"}]},
                "status": {"phase": "Running", "containerStatuses": [{"ready": true, "restartCount": 0}]}
            }]})
            .to_string()),
        );

        let mut rs = ReplicaSetResource::new(base(), true);
        let rs_json = serde_json::json!({
            "metadata": {"uid": "rs-uid"},
            "spec": {"selector": {"matchLabels": {"pod-template-hash": "abc"}}, "template": {"spec": {"containers": [{"name": "web"}]}}},
            "status": {"replicas": 1, "availableReplicas": 1, "readyReplicas": 1}
        });

        rs.apply_json(&rs_json, &fake).await.unwrap();

        assert!(rs.deploy_succeeded());
        assert_eq!(rs.pods.len(), 1);
        assert_eq!(rs.pods[0].base().parent.as_deref(), Some("ReplicaSet/web-abc123"));
    }

    #[tokio::test]
    async fn sync_marks_absent_when_replica_set_missing() {
        use crate::cluster_client::fake::FakeClusterClient;

        let fake = FakeClusterClient::new();
        let mut rs = ReplicaSetResource::new(base(), true);
        rs.sync(&fake).await.unwrap();
        assert!(!rs.exists());
    }

    #[test]
    fn fails_only_when_all_pods_failed() {
        let mut rs = ReplicaSetResource::new(base(), true);
        assert!(!rs.deploy_failed());

        let mut failing_pod = PodResource::new(ResourceBase::new("Pod", "p1", "default", "ctx", Duration::from_secs(300)), false);
        failing_pod.apply_json(&serde_json::json!({"status": {"phase": "Failed"}}));
        rs.pods.push(failing_pod);
        assert!(rs.deploy_failed());
    }
}
