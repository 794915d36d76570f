/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/service.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Service (§4.3): 5 minute timeout. Success requires endpoints to show up;
//! if the service's selector matches exactly one Deployment, the endpoint
//! count must match that deployment's desired replica count, otherwise any
//! nonzero endpoint count is enough.

use async_trait::async_trait;
use serde_json::Value;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::{Found, Resource, ResourceBase};

pub struct ServiceResource {
    base: ResourceBase,
    endpoint_count: usize,
    expected_replicas: Option<i64>,
}

impl ServiceResource {
    pub fn new(base: ResourceBase) -> Self {
        Self {
            base,
            endpoint_count: 0,
            expected_replicas: None,
        }
    }

    /// Service selectors are a flat `{k: v}` map (unlike Deployment/ReplicaSet
    /// selectors, which nest under `matchLabels`).
    fn flat_selector_to_string(selector: &Value) -> Option<String> {
        let map = selector.as_object()?;
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
}

#[async_trait]
impl Resource for ServiceResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        let svc_out = client
            .run(&["get", "service", &self.base.name, "--output=json"], RunOptions::new(false))
            .await?;

        if !svc_out.success {
            self.base.found = Found::Absent;
            self.base.status_text = "not found".to_string();
            return Ok(());
        }
        self.base.found = Found::Present;

        let svc: Value = serde_json::from_str(&svc_out.stdout).unwrap_or(Value::Null);
        let selector = svc.get("spec").and_then(|s| s.get("selector"));

        self.endpoint_count = 0;
        self.expected_replicas = None;

        let ep_out = client
            .run(
                &["get", "endpoints", &self.base.name, "--output=jsonpath={.subsets[*].addresses[*].ip}"],
                RunOptions::new(false),
            )
            .await?;
        if ep_out.success {
            self.endpoint_count = ep_out.stdout.split_whitespace().count();
        }

        if let Some(selector_str) = selector.and_then(Self::flat_selector_to_string) {
            let deploy_out = client
                .run(
                    &["get", "deployments", &format!("--selector={selector_str}"), "--output=json"],
                    RunOptions::new(false),
                )
                .await?;
            if deploy_out.success {
                let list: Value = serde_json::from_str(&deploy_out.stdout).unwrap_or(Value::Null);
                if let Some(items) = list.get("items").and_then(|i| i.as_array()) {
                    if items.len() == 1 {
                        self.expected_replicas = items[0].get("spec").and_then(|s| s.get("replicas")).and_then(|r| r.as_i64());
                    }
                }
            }
        }

        self.base.status_text = format!("{} endpoint(s)", self.endpoint_count);
        Ok(())
    }

    fn deploy_succeeded(&self) -> bool {
        if !self.exists() {
            return false;
        }
        match self.expected_replicas {
            Some(expected) => self.endpoint_count as i64 == expected,
            None => self.endpoint_count > 0,
        }
    }

    fn deploy_failed(&self) -> bool {
        false
    }

    fn debug_message(&self) -> String {
        if self.deploy_timed_out() {
            format!(
                "{}\nTimed out waiting for endpoints ({} found). The service's selector is probably wrong.",
                self.pretty_status(),
                self.endpoint_count
            )
        } else {
            self.pretty_status()
        }
    }
}
