/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/deployment.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Deployment (§4.3): finds the latest ReplicaSet by owner UID + revision
//! annotation match, builds it as a child with the deployment's
//! `deploy_started_at` propagated, and derives success/failure/timeout from
//! it plus the deployment's own replica counts.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::replica_set::ReplicaSetResource;
use super::{default_timeout_for_kind, owner_refs_contain, selector_to_string, Found, Resource, ResourceBase};

const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

#[derive(Debug, Default, Clone, Copy)]
struct RolloutState {
    replicas: i64,
    updated_replicas: i64,
    available_replicas: i64,
    unavailable_replicas: i64,
}

pub struct DeploymentResource {
    base: ResourceBase,
    uid: Option<String>,
    state: RolloutState,
    latest_replica_set: Option<ReplicaSetResource>,
}

impl DeploymentResource {
    pub fn new(base: ResourceBase) -> Self {
        Self {
            base,
            uid: None,
            state: RolloutState::default(),
            latest_replica_set: None,
        }
    }

    pub fn latest_replica_set(&self) -> Option<&ReplicaSetResource> {
        self.latest_replica_set.as_ref()
    }

    /// Selects the latest ReplicaSet: owned by this deployment's UID *and*
    /// sharing its revision annotation. First match wins (§4.3, invariant 2
    /// of §8).
    async fn find_latest_replica_set(&self, client: &dyn ClusterRunner, deployment: &Value) -> anyhow::Result<Option<Value>> {
        let Some(uid) = &self.uid else { return Ok(None) };
        let revision = deployment
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(REVISION_ANNOTATION))
            .and_then(|r| r.as_str());

        let selector_str = selector_to_string(deployment.get("spec").and_then(|s| s.get("selector")));
        let Some(selector_str) = selector_str else { return Ok(None) };

        let out = client
            .run(
                &["get", "replicasets", &format!("--selector={selector_str}"), "--output=json"],
                RunOptions::new(false),
            )
            .await?;
        if !out.success {
            return Ok(None);
        }
        let list: Value = serde_json::from_str(&out.stdout).unwrap_or(Value::Null);
        let items = list.get("items").and_then(|i| i.as_array()).cloned().unwrap_or_default();

        Ok(items.into_iter().find(|rs| {
            let owned = owner_refs_contain(rs.get("metadata").and_then(|m| m.get("ownerReferences")), uid);
            let same_revision = rs
                .get("metadata")
                .and_then(|m| m.get("annotations"))
                .and_then(|a| a.get(REVISION_ANNOTATION))
                .and_then(|r| r.as_str())
                == revision;
            owned && same_revision
        }))
    }
}

#[async_trait]
impl Resource for DeploymentResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        let out = client
            .run(&["get", "deployment", &self.base.name, "--output=json"], RunOptions::new(false))
            .await?;

        if !out.success {
            self.base.found = Found::Absent;
            self.base.status_text = "not found".to_string();
            self.uid = None;
            self.state = RolloutState::default();
            self.latest_replica_set = None;
            return Ok(());
        }
        self.base.found = Found::Present;

        let deployment: Value = serde_json::from_str(&out.stdout).unwrap_or(Value::Null);
        self.uid = deployment.get("metadata").and_then(|m| m.get("uid")).and_then(|u| u.as_str()).map(str::to_string);

        let status = deployment.get("status");
        self.state = RolloutState {
            replicas: status.and_then(|s| s.get("replicas")).and_then(|v| v.as_i64()).unwrap_or(0),
            updated_replicas: status.and_then(|s| s.get("updatedReplicas")).and_then(|v| v.as_i64()).unwrap_or(0),
            available_replicas: status.and_then(|s| s.get("availableReplicas")).and_then(|v| v.as_i64()).unwrap_or(0),
            unavailable_replicas: status.and_then(|s| s.get("unavailableReplicas")).and_then(|v| v.as_i64()).unwrap_or(0),
        };

        if let Some(rs_json) = self.find_latest_replica_set(client, &deployment).await? {
            let rs_name = rs_json.get("metadata").and_then(|m| m.get("name")).and_then(|n| n.as_str()).unwrap_or("unknown");
            let rs_base = ResourceBase::new("ReplicaSet", rs_name, self.base.namespace.clone(), self.base.context.clone(), default_timeout_for_kind("ReplicaSet"));
            let mut rs = ReplicaSetResource::new(rs_base, false);
            rs.set_parent(self.base.id());
            if let Some(started) = self.base.deploy_started_at {
                rs.set_deploy_started_at(started);
            }
            rs.apply_json(&rs_json, client).await?;
            self.latest_replica_set = Some(rs);
        } else {
            self.latest_replica_set = None;
        }

        self.base.status_text = format!(
            "{} updated, {} replicas, {} available, {} unavailable",
            self.state.updated_replicas, self.state.replicas, self.state.available_replicas, self.state.unavailable_replicas
        );
        Ok(())
    }

    fn deploy_succeeded(&self) -> bool {
        let Some(rs) = &self.latest_replica_set else { return false };
        rs.deploy_succeeded()
            && self.state.updated_replicas == self.state.replicas
            && self.state.replicas == self.state.available_replicas
    }

    fn deploy_failed(&self) -> bool {
        // Open question (§9): a deployment stuck before producing any pod
        // (e.g. quota denial) is not caught here, by design — retained from
        // the original behavior rather than silently extended.
        self.latest_replica_set.as_ref().map(|rs| rs.deploy_failed()).unwrap_or(false)
    }

    fn deploy_timed_out(&self) -> bool {
        let own = self.base.timed_out_as_of(Utc::now());
        let rs_timed_out = self.latest_replica_set.as_ref().map(|rs| rs.deploy_timed_out()).unwrap_or(false);
        own || rs_timed_out
    }

    async fn fetch_logs(&self, client: &dyn ClusterRunner) -> anyhow::Result<std::collections::HashMap<String, String>> {
        match &self.latest_replica_set {
            Some(rs) => rs.fetch_logs_for(client).await,
            None => Ok(std::collections::HashMap::new()),
        }
    }

    fn debug_message(&self) -> String {
        let mut message = self.pretty_status();
        if let Some(rs) = &self.latest_replica_set {
            message.push('\n');
            message.push_str(&rs.debug_message());
        } else {
            message.push_str("\nno ReplicaSet owned by this deployment has been observed yet");
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn base() -> ResourceBase {
        ResourceBase::new("Deployment", "web", "default", "ctx", Duration::from_secs(300))
    }

    #[test]
    fn fails_without_latest_replica_set() {
        let deployment = DeploymentResource::new(base());
        assert!(!deployment.deploy_succeeded());
        assert!(!deployment.deploy_failed());
    }

    #[tokio::test]
    async fn sync_finds_the_owned_replica_set_matching_uid_and_revision() {
        use crate::cluster_client::fake::{ok, FakeClusterClient};

        let fake = FakeClusterClient::new();
        fake.on(
            &["get", "deployment", "web", "--output=json"],
            ok(serde_json::json!({
                "metadata": {"uid": "dep-uid", "annotations": {(REVISION_ANNOTATION): "3"}},
                "spec": {"selector": {"matchLabels": {"app": "web"}}},
                "status": {"replicas": 2, "updatedReplicas": 2, "availableReplicas": 2, "unavailableReplicas": 0}
            })
            .to_string()),
        );
        fake.on(
            &["get", "replicasets", "--selector=app=web", "--output=json"],
            ok(serde_json::json!({"items": [{
                "metadata": {"name": "web-1", "uid": "rs-uid", "ownerReferences": [{"uid": "dep-uid"}], "annotations": {(REVISION_ANNOTATION): "3"}},
                "spec": {"selector": {"matchLabels": {"pod-template-hash": "abc"}}, "template": {"spec": {"containers": [{"name": "web"}]}}},
                "status": {"replicas": 2, "availableReplicas": 2, "readyReplicas": 2}
            }]})
            .to_string()),
        );
        fake.on(
            &["get", "pods", "-a", "--selector=pod-template-hash=abc", "--output=json"],
            ok(serde_json::json!({"items": []}).to_string()),
        );

        let mut deployment = DeploymentResource::new(base());
        deployment.sync(&fake).await.unwrap();

        assert!(deployment.deploy_succeeded());
        let rs = deployment.latest_replica_set().unwrap();
        assert_eq!(rs.base().parent.as_deref(), Some("Deployment/web"));
    }

    #[tokio::test]
    async fn sync_marks_absent_when_deployment_missing() {
        use crate::cluster_client::fake::FakeClusterClient;

        let fake = FakeClusterClient::new();
        let mut deployment = DeploymentResource::new(base());
        deployment.sync(&fake).await.unwrap();
        assert!(!deployment.exists());
        assert!(deployment.latest_replica_set().is_none());
    }

    #[test]
    fn latest_replica_set_is_parented_to_the_deployment() {
        let rs_base = ResourceBase::new("ReplicaSet", "web-1", "default", "ctx", Duration::from_secs(300));
        let mut rs = ReplicaSetResource::new(rs_base, false);
        rs.set_parent(DeploymentResource::new(base()).id());
        assert_eq!(rs.base().parent.as_deref(), Some("Deployment/web"));
    }

    #[test]
    fn succeeds_only_when_counts_and_rs_agree() {
        let mut deployment = DeploymentResource::new(base());
        deployment.state = RolloutState {
            replicas: 2,
            updated_replicas: 2,
            available_replicas: 2,
            unavailable_replicas: 0,
        };
        let mut rs = ReplicaSetResource::new(ResourceBase::new("ReplicaSet", "web-1", "default", "ctx", Duration::from_secs(300)), true);
        // Force the underlying rollout state via a fresh successful apply_json equivalent:
        rs.set_deploy_started_at(Utc::now());
        deployment.latest_replica_set = Some(rs);
        // latest_replica_set starts with replicas=0 so deploy_succeeded is false
        // until the RS itself reports matching counts.
        assert!(!deployment.deploy_succeeded());
    }
}
