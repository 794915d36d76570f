/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/config_map.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! ConfigMap (§4.3): existence-based success, 30s timeout.

use async_trait::async_trait;

use crate::cluster_client::{ClusterRunner, RunOptions};

use super::{Found, Resource, ResourceBase};

pub struct ConfigMapResource {
    base: ResourceBase,
}

impl ConfigMapResource {
    pub fn new(base: ResourceBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl Resource for ConfigMapResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, client: &dyn ClusterRunner) -> anyhow::Result<()> {
        let out = client
            .run(&["get", "configmap", &self.base.name], RunOptions::new(false))
            .await?;
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
}
