/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/mod.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! The Resource data model and interface (§3, §4.3). Per-kind polymorphism
//! is implemented as per-kind structs behind one `Resource` trait rather
//! than the source's class inheritance (§9 Design Notes) — kind
//! discrimination only happens in `factory`.

pub mod config_map;
pub mod deployment;
pub mod factory;
pub mod generic;
pub mod other_kinds;
pub mod pod;
pub mod replica_set;
pub mod service;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cluster_client::ClusterRunner;

/// Tri-valued existence state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Found {
    #[default]
    Unknown,
    Present,
    Absent,
}

impl Found {
    pub fn is_present(self) -> bool {
        matches!(self, Found::Present)
    }
}

/// The strategy `Deployer` uses to apply a resource's manifest (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMethod {
    Apply,
    Replace,
    ReplaceForce,
}

/// Attributes shared by every resource kind (§3). Embedded in each kind's
/// struct rather than inherited.
#[derive(Debug, Clone)]
pub struct ResourceBase {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub context: String,
    pub manifest_path: Option<PathBuf>,
    pub parent: Option<String>,
    pub deploy_started_at: Option<DateTime<Utc>>,
    pub timeout: Duration,
    pub found: Found,
    pub status_text: String,
}

impl ResourceBase {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>, context: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            context: context.into(),
            manifest_path: None,
            parent: None,
            deploy_started_at: None,
            timeout,
            found: Found::Unknown,
            status_text: String::new(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    /// Invariant 1 (§3): before `deploy_started_at` is set, timing out is
    /// never possible.
    pub fn timed_out_as_of(&self, now: DateTime<Utc>) -> bool {
        match self.deploy_started_at {
            None => false,
            Some(started) => now.signed_duration_since(started).to_std().unwrap_or(Duration::ZERO) > self.timeout,
        }
    }
}

/// The shared per-kind interface (§4.3).
#[async_trait]
pub trait Resource: Send + Sync {
    fn base(&self) -> &ResourceBase;
    fn base_mut(&mut self) -> &mut ResourceBase;

    fn kind(&self) -> &str {
        &self.base().kind
    }
    fn name(&self) -> &str {
        &self.base().name
    }
    fn namespace(&self) -> &str {
        &self.base().namespace
    }
    fn id(&self) -> String {
        self.base().id()
    }
    fn manifest_path(&self) -> Option<&PathBuf> {
        self.base().manifest_path.as_ref()
    }
    fn set_manifest_path(&mut self, path: PathBuf) {
        self.base_mut().manifest_path = Some(path);
    }
    fn set_parent(&mut self, parent: impl Into<String>)
    where
        Self: Sized,
    {
        self.base_mut().parent = Some(parent.into());
    }
    fn timeout(&self) -> Duration {
        self.base().timeout
    }
    fn deploy_started_at(&self) -> Option<DateTime<Utc>> {
        self.base().deploy_started_at
    }
    fn set_deploy_started_at(&mut self, at: DateTime<Utc>) {
        self.base_mut().deploy_started_at = Some(at);
    }

    /// Refreshes this resource's view of cluster state. Never mutates the
    /// cluster (invariant 4, §3).
    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()>;

    fn exists(&self) -> bool {
        self.base().found.is_present()
    }

    fn deploy_succeeded(&self) -> bool;
    fn deploy_failed(&self) -> bool;

    /// Default timeout check; kinds with children (Deployment, ReplicaSet)
    /// override to also account for their children's timeouts.
    fn deploy_timed_out(&self) -> bool {
        self.base().timed_out_as_of(Utc::now())
    }

    /// Invariant 2 (§3): finished iff failed, succeeded, or timed out.
    fn deploy_finished(&self) -> bool {
        self.deploy_failed() || self.deploy_succeeded() || self.deploy_timed_out()
    }

    async fn fetch_events(&self, client: &dyn ClusterRunner) -> anyhow::Result<Vec<String>> {
        crate::events::EventExtractor::fetch(client, self.kind(), self.name(), self.deploy_started_at()).await
    }

    /// Only kinds that own pods (ReplicaSet) fetch logs; default is empty.
    async fn fetch_logs(&self, _client: &dyn ClusterRunner) -> anyhow::Result<std::collections::HashMap<String, String>> {
        Ok(std::collections::HashMap::new())
    }

    fn pretty_status(&self) -> String {
        format!("{}: {}", self.id(), self.base().status_text)
    }

    fn debug_message(&self) -> String {
        self.pretty_status()
    }

    fn deploy_method(&self) -> DeployMethod {
        DeployMethod::Apply
    }
}

pub const PROTECTED_NAMESPACES: &[&str] = &["default", "kube-system", "kube-public"];

pub fn is_protected_namespace(namespace: &str) -> bool {
    PROTECTED_NAMESPACES.contains(&namespace)
}

/// Priority order for the predeploy phase (§4.8 step 6).
pub const PREDEPLOY_KIND_PRIORITY: &[&str] = &["Cloudsql", "Redis", "Bugsnag", "ConfigMap", "PersistentVolumeClaim", "Pod"];

pub fn default_timeout_for_kind(kind: &str) -> Duration {
    match kind {
        "ConfigMap" => Duration::from_secs(30),
        _ => Duration::from_secs(300),
    }
}

/// Flattens a `{matchLabels: {k: v, ...}}` selector into `k=v,k=v` for use
/// with `--selector`. Returns `None` when there is nothing to select on.
pub fn selector_to_string(selector: Option<&serde_json::Value>) -> Option<String> {
    let map = selector?.get("matchLabels")?.as_object()?;
    if map.is_empty() {
        return None;
    }
    Some(
        map.iter()
            .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// True iff `owner_references` (a JSON array) names `uid` as an owner.
pub fn owner_refs_contain(owner_references: Option<&serde_json::Value>, uid: &str) -> bool {
    owner_references
        .and_then(|refs| refs.as_array())
        .map(|refs| refs.iter().any(|r| r.get("uid").and_then(|u| u.as_str()) == Some(uid)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::generic::GenericResource;

    /// Invariant 3 (§3): a child's `base().parent` names its parent's id.
    /// Every parent/child construction site (Deployment->ReplicaSet,
    /// ReplicaSet->Pod) goes through this helper rather than assigning
    /// `base_mut().parent` by hand.
    #[test]
    fn set_parent_records_the_parent_id() {
        let base = ResourceBase::new("ReplicaSet", "web-abc123", "default", "ctx", Duration::from_secs(300));
        let mut resource = GenericResource::new(base);
        resource.set_parent("Deployment/web");
        assert_eq!(resource.base().parent.as_deref(), Some("Deployment/web"));
    }
}
