/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/orchestrator.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Orchestrator (§4.8): the top-level state machine. Validate → confirm
//! cluster → discover → initial sync → secrets → predeploy priority kinds →
//! main deploy → watch → verdict. Any failure short-circuits straight to
//! reporting failure; there is no recovery (§1 Non-goals).

use std::collections::HashMap;
use std::path::Path;

use log::info;

use crate::cluster_client::{ClusterRunner, RunOptions};
use crate::deployer::Deployer;
use crate::discovery::{find_template_files, TemplateDiscovery};
use crate::error::{Error, Result};
use crate::renderer::Renderer;
use crate::resource::{is_protected_namespace, Resource, PREDEPLOY_KIND_PRIORITY};
use crate::secrets::SecretsProvisioner;
use crate::watcher::ResourceWatcher;

pub struct OrchestratorConfig {
    pub namespace: String,
    pub context: String,
    pub template_dir: String,
    pub bindings: HashMap<String, String>,
    pub current_sha: String,
    pub kubeconfig_path: String,
    pub skip_wait: bool,
    pub allow_protected_ns: bool,
    pub prune_enabled: bool,
}

pub struct Orchestrator<'a> {
    config: OrchestratorConfig,
    client: &'a dyn ClusterRunner,
    renderer: &'a dyn Renderer,
    secrets: &'a dyn SecretsProvisioner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: OrchestratorConfig, client: &'a dyn ClusterRunner, renderer: &'a dyn Renderer, secrets: &'a dyn SecretsProvisioner) -> Self {
        Self {
            config,
            client,
            renderer,
            secrets,
        }
    }

    /// Step 1: Validating.
    fn validate(&self) -> Result<()> {
        if self.config.prune_enabled && is_protected_namespace(&self.config.namespace) {
            return Err(Error::InvalidConfiguration(format!(
                "namespace '{}' is protected; deploying with prune enabled is always rejected",
                self.config.namespace
            )));
        }
        if !Path::new(&self.config.kubeconfig_path).exists() {
            return Err(Error::InvalidConfiguration(format!("KUBECONFIG path does not exist: {}", self.config.kubeconfig_path)));
        }
        if self.config.current_sha.trim().is_empty() {
            return Err(Error::InvalidConfiguration("REVISION (current_sha) must be non-empty".to_string()));
        }
        if !Path::new(&self.config.template_dir).is_dir() {
            return Err(Error::InvalidConfiguration(format!("template directory does not exist: {}", self.config.template_dir)));
        }
        if find_template_files(Path::new(&self.config.template_dir))?.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "template directory {} contains no .yml/.yml.erb files",
                self.config.template_dir
            )));
        }
        if self.config.namespace.trim().is_empty() {
            return Err(Error::InvalidConfiguration("namespace must be non-empty".to_string()));
        }
        if is_protected_namespace(&self.config.namespace) && !self.config.allow_protected_ns {
            return Err(Error::InvalidConfiguration(format!(
                "namespace '{}' is protected; pass --allow-protected-ns to deploy to it",
                self.config.namespace
            )));
        }
        if self.config.context.trim().is_empty() {
            return Err(Error::InvalidConfiguration("context must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Step 2: Confirming cluster.
    async fn confirm_cluster(&self) -> Result<()> {
        let contexts = self
            .client
            .run(&["config", "get-contexts", "-o", "name"], RunOptions::new(true).without_namespace().without_context())
            .await
            .map_err(Error::Other)?;
        if !contexts.success || !contexts.stdout.lines().any(|line| line.trim() == self.config.context) {
            return Err(Error::ClusterUnreachable(format!("context '{}' not found via config get-contexts", self.config.context)));
        }

        let ns_out = self
            .client
            .run(&["get", "namespace", &self.config.namespace], RunOptions::new(true).without_namespace())
            .await
            .map_err(Error::Other)?;
        if !ns_out.success {
            return Err(Error::ClusterUnreachable(format!("namespace '{}' is not reachable: {}", self.config.namespace, ns_out.stderr.trim())));
        }
        Ok(())
    }

    /// Step 3: Discovering.
    async fn discover(&self) -> Result<crate::discovery::Discovery> {
        let discovery = TemplateDiscovery::new(&self.config.template_dir, &self.config.bindings, &self.config.namespace, &self.config.context);
        discovery.discover(self.client, self.renderer).await
    }

    /// Step 4: Initial sync.
    async fn initial_sync(&self, resources: &mut [Box<dyn Resource>]) -> Result<()> {
        for resource in resources.iter_mut() {
            resource.sync(self.client).await.map_err(Error::Other)?;
            info!("{}", resource.pretty_status());
        }
        Ok(())
    }

    /// Step 5: Provisioning secrets.
    async fn provision_secrets(&self) -> Result<()> {
        if self.secrets.changes_required().await.map_err(Error::Other)? {
            self.secrets.apply().await.map_err(Error::Other)?;
        }
        Ok(())
    }

    /// Step 6: Predeploying. Fully converges each priority kind before the
    /// next starts (§8, invariant 6).
    async fn predeploy(&self, resources: &mut Vec<Box<dyn Resource>>) -> Result<()> {
        for kind in PREDEPLOY_KIND_PRIORITY {
            let mut indices: Vec<usize> = resources.iter().enumerate().filter(|(_, r)| r.kind() == *kind).map(|(i, _)| i).collect();
            if indices.is_empty() {
                continue;
            }

            // `swap_remove` in reverse index order keeps the remaining
            // indices valid; relative order among resources doesn't matter
            // since every later lookup filters by kind, not position.
            let mut subset: Vec<Box<dyn Resource>> = indices.drain(..).rev().map(|i| resources.swap_remove(i)).collect();

            let deployer = Deployer::new(self.client, &self.config.namespace, self.config.prune_enabled);
            deployer.deploy(&mut subset).await?;

            let watcher = ResourceWatcher::new(self.client);
            watcher.watch(&mut subset).await.map_err(Error::Other)?;

            let failures: Vec<String> = subset.iter().filter(|r| !r.deploy_succeeded()).map(|r| r.debug_message()).collect();

            // Re-insert into the full set regardless of outcome: the apply
            // batch in the main deploy phase still needs these resources
            // even if this subset eventually fails and we error out.
            resources.extend(subset);

            if !failures.is_empty() {
                return Err(Error::ResourceFailed { failures });
            }
        }
        Ok(())
    }

    /// Steps 7-8: Deploying, then Watching (unless `--skip-wait`).
    async fn deploy_and_watch(&self, resources: &mut [Box<dyn Resource>]) -> Result<()> {
        let deployer = Deployer::new(self.client, &self.config.namespace, self.config.prune_enabled);
        deployer.deploy(resources).await?;

        if !self.config.skip_wait {
            let watcher = ResourceWatcher::new(self.client);
            watcher.watch(resources).await.map_err(Error::Other)?;
        }
        Ok(())
    }

    /// Step 9: Verdict.
    fn verdict(resources: &[Box<dyn Resource>]) -> Result<()> {
        let failures: Vec<String> = resources.iter().filter(|r| !r.deploy_succeeded()).map(|r| r.debug_message()).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ResourceFailed { failures })
        }
    }

    /// Runs the full 9-state pipeline.
    pub async fn run(&self) -> Result<()> {
        self.validate()?;
        self.confirm_cluster().await?;

        let mut discovery = self.discover().await?;
        self.initial_sync(&mut discovery.resources).await?;
        self.provision_secrets().await?;

        // Predeploy kinds are removed from `discovery.resources`, fully
        // converged, then pushed back so the main deploy sees every resource
        // (§5 ordering: predeploy kinds finish before the main deploy begins).
        self.predeploy(&mut discovery.resources).await?;
        self.deploy_and_watch(&mut discovery.resources).await?;

        if self.config.skip_wait {
            return Ok(());
        }
        Self::verdict(&discovery.resources)
    }
}
