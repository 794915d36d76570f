/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/watcher.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! ResourceWatcher (§4.7): polls the in-flight subset of resources until
//! every one reports `deploy_finished`, logging status transitions.
//! Termination is bounded by each resource's own timeout (§8, invariant 4).

use std::time::Duration;

use log::info;

use crate::cluster_client::ClusterRunner;
use crate::resource::Resource;

const POLL_INTERVAL: Duration = Duration::from_secs(4);

pub struct ResourceWatcher<'a> {
    pub client: &'a dyn ClusterRunner,
    pub poll_interval: Duration,
}

impl<'a> ResourceWatcher<'a> {
    pub fn new(client: &'a dyn ClusterRunner) -> Self {
        Self {
            client,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Watches `resources` until all are finished. `resources` may be a
    /// subset of the full deploy (predeploy phases watch only their kind).
    pub async fn watch(&self, resources: &mut [Box<dyn Resource>]) -> anyhow::Result<()> {
        loop {
            let active_indices: Vec<usize> = resources
                .iter()
                .enumerate()
                .filter(|(_, resource)| !resource.deploy_finished())
                .map(|(i, _)| i)
                .collect();

            if active_indices.is_empty() {
                return Ok(());
            }

            tokio::time::sleep(self.poll_interval).await;

            for index in active_indices {
                let resource = &mut resources[index];
                let previous = resource.pretty_status();
                resource.sync(self.client).await?;
                let current = resource.pretty_status();
                if current != previous {
                    info!("{current}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::cluster_client::ClusterClient;
    use crate::resource::{Resource, ResourceBase};

    use super::*;

    struct FlipsAfterNSyncs {
        base: ResourceBase,
        syncs_left: Cell<u32>,
    }

    #[async_trait]
    impl Resource for FlipsAfterNSyncs {
        fn base(&self) -> &ResourceBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ResourceBase {
            &mut self.base
        }
        async fn sync(&mut self, _client: &dyn ClusterRunner) -> anyhow::Result<()> {
            let left = self.syncs_left.get();
            if left > 0 {
                self.syncs_left.set(left - 1);
            }
            self.base.status_text = format!("syncs_left={}", self.syncs_left.get());
            Ok(())
        }
        fn deploy_succeeded(&self) -> bool {
            self.syncs_left.get() == 0
        }
        fn deploy_failed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn watch_returns_once_all_resources_finish() {
        let mut base = ResourceBase::new("ConfigMap", "a", "default", "ctx", StdDuration::from_secs(30));
        base.deploy_started_at = Some(Utc::now());
        let resource = FlipsAfterNSyncs {
            base,
            syncs_left: Cell::new(2),
        };
        let mut resources: Vec<Box<dyn Resource>> = vec![Box::new(resource)];

        let client = ClusterClient::new("echo", "default", "ctx");
        let watcher = ResourceWatcher {
            client: &client,
            poll_interval: StdDuration::from_millis(1),
        };
        watcher.watch(&mut resources).await.unwrap();
        assert!(resources[0].deploy_succeeded());
    }

    #[tokio::test]
    async fn watch_returns_immediately_when_nothing_active() {
        let mut base = ResourceBase::new("ConfigMap", "a", "default", "ctx", StdDuration::from_secs(30));
        base.found = crate::resource::Found::Present;
        let resource = crate::resource::config_map::ConfigMapResource::new(base);
        let mut resources: Vec<Box<dyn Resource>> = vec![Box::new(resource)];

        let client = ClusterClient::new("echo", "default", "ctx");
        let watcher = ResourceWatcher::new(&client);
        watcher.watch(&mut resources).await.unwrap();
    }
}
