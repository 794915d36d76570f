/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/generic.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! The generic/default Resource (§4.3): used for any kind tag
//! `ResourceFactory` doesn't recognize. `sync` is a no-op; success is
//! assumed, with a one-time `UnrecognizedKind` warning (§4.2, §7).

use std::cell::Cell;

use async_trait::async_trait;

use crate::cluster_client::ClusterRunner;

use super::{Resource, ResourceBase};

pub struct GenericResource {
    base: ResourceBase,
    warned: Cell<bool>,
}

impl GenericResource {
    pub fn new(base: ResourceBase) -> Self {
        Self {
            base,
            warned: Cell::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.replace(true) {
            log::warn!(
                "{} is an unrecognized kind; assuming success once it exists. Add a dedicated Resource impl to track its rollout.",
                self.base.id()
            );
        }
    }
}

#[async_trait]
impl Resource for GenericResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    async fn sync(&mut self, _client: &dyn ClusterRunner) -> anyhow::Result<()> {
        Ok(())
    }

    fn deploy_succeeded(&self) -> bool {
        self.warn_once();
        true
    }

    fn deploy_failed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn generic_resource_always_succeeds() {
        let base = ResourceBase::new("Frobnicator", "widget", "default", "ctx", Duration::from_secs(300));
        let resource = GenericResource::new(base);
        assert!(resource.deploy_succeeded());
        assert!(!resource.deploy_failed());
    }
}
