/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/other_kinds.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Existence-based kinds (§4.3): Ingress, PersistentVolumeClaim,
//! PodDisruptionBudget, PodTemplate, and the custom-resource kinds
//! (Cloudsql, Redis, Bugsnag) that default to `replace` instead of `apply`.

use async_trait::async_trait;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::{DeployMethod, Found, Resource, ResourceBase};

/// `kubectl get <kind-path> <name>` plus the lowercase CLI noun kubectl
/// expects for each kind, since most are not simple lowercasings of the
/// kind tag (PersistentVolumeClaim -> persistentvolumeclaims, etc).
fn cli_noun_for(kind: &str) -> &'static str {
    match kind {
        "Ingress" => "ingress",
        "PersistentVolumeClaim" => "persistentvolumeclaim",
        "PodDisruptionBudget" => "poddisruptionbudget",
        "PodTemplate" => "podtemplate",
        "Cloudsql" => "cloudsql",
        "Redis" => "redis",
        "Bugsnag" => "bugsnag",
        _ => "customresource",
    }
}

fn is_custom_resource(kind: &str) -> bool {
    matches!(kind, "Cloudsql" | "Redis" | "Bugsnag")
}

pub struct ExistenceBasedResource {
    base: ResourceBase,
}

impl ExistenceBasedResource {
    pub fn new(base: ResourceBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl Resource for ExistenceBasedResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        let noun = cli_noun_for(&self.base.kind);
        let out = client.run(&["get", noun, &self.base.name], RunOptions::new(false)).await?;
        self.base.found = if out.success { Found::Present } else { Found::Absent };
        self.base.status_text = if out.success { "exists".to_string() } else { "not found".to_string() };
        Ok(())
    }

    fn deploy_succeeded(&self) -> bool {
        self.exists()
    }

    fn deploy_failed(&self) -> bool {
        false
    }

    fn deploy_method(&self) -> DeployMethod {
        if is_custom_resource(&self.base.kind) {
            DeployMethod::Replace
        } else {
            DeployMethod::Apply
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn custom_resources_default_to_replace() {
        let base = ResourceBase::new("Cloudsql", "primary", "default", "ctx", Duration::from_secs(300));
        let resource = ExistenceBasedResource::new(base);
        assert_eq!(resource.deploy_method(), DeployMethod::Replace);
    }

    #[test]
    fn builtin_kinds_default_to_apply() {
        let base = ResourceBase::new("Ingress", "web", "default", "ctx", Duration::from_secs(300));
        let resource = ExistenceBasedResource::new(base);
        assert_eq!(resource.deploy_method(), DeployMethod::Apply);
    }

    #[tokio::test]
    async fn sync_marks_present_when_get_succeeds() {
        use crate::cluster_client::fake::{ok, FakeClusterClient};

        let fake = FakeClusterClient::new();
        fake.on(&["get", "persistentvolumeclaim", "data"], ok("persistentvolumeclaim/data\n"));
        let base = ResourceBase::new("PersistentVolumeClaim", "data", "default", "ctx", Duration::from_secs(300));
        let mut resource = ExistenceBasedResource::new(base);
        resource.sync(&fake).await.unwrap();
        assert!(resource.exists());
    }

    #[tokio::test]
    async fn sync_marks_absent_when_get_fails() {
        use crate::cluster_client::fake::FakeClusterClient;

        let fake = FakeClusterClient::new();
        let base = ResourceBase::new("Ingress", "missing", "default", "ctx", Duration::from_secs(300));
        let mut resource = ExistenceBasedResource::new(base);
        resource.sync(&fake).await.unwrap();
        assert!(!resource.exists());
    }
}
