/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/discovery.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! TemplateDiscovery (§4.5): enumerates the template directory, renders
//! each file, splits multi-document YAML streams, dry-run validates every
//! document against the cluster, and materializes resources for the rest
//! of the deploy to drive.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::TempDir;

use crate::cluster_client::{ClusterRunner, RunOptions};
use crate::error::{Error, Result};
use crate::renderer::Renderer;
use crate::resource::factory;
use crate::resource::Resource;

/// The discovered resource set plus the temp directory backing their
/// `manifest_path`s. Keeping the `TempDir` alive for the lifetime of this
/// value is what keeps the materialized documents on disk through the rest
/// of the deploy (§4.5: "survive until the end of the deploy").
pub struct Discovery {
    pub resources: Vec<Box<dyn Resource>>,
    _tempdir: TempDir,
}

pub struct TemplateDiscovery<'a> {
    pub template_dir: PathBuf,
    pub bindings: &'a HashMap<String, String>,
    pub namespace: String,
    pub context: String,
}

impl<'a> TemplateDiscovery<'a> {
    pub fn new(template_dir: impl AsRef<Path>, bindings: &'a HashMap<String, String>, namespace: &str, context: &str) -> Self {
        Self {
            template_dir: template_dir.as_ref().to_path_buf(),
            bindings,
            namespace: namespace.to_string(),
            context: context.to_string(),
        }
    }

    /// Files whose name ends in `.yml` or `.yml.erb` (step 1).
    fn template_files(&self) -> Result<Vec<PathBuf>> {
        find_template_files(&self.template_dir)
    }

    /// Splits a rendered multi-document YAML stream, discarding blank
    /// documents (step 3). Uses `serde_yaml::Deserializer`'s document
    /// iteration the same way `k8s_sync_manager::apply` walks a manifest
    /// file's `---`-separated documents, rather than a manual string split,
    /// so stray leading separators and blank documents are handled for free.
    fn split_documents(raw: &str) -> Vec<String> {
        serde_yaml::Deserializer::from_str(raw)
            .filter_map(|document| serde_yaml::Value::deserialize(document).ok())
            .filter(|value| !matches!(value, serde_yaml::Value::Null))
            .filter_map(|value| serde_yaml::to_string(&value).ok())
            .collect()
    }

    async fn validate_and_build(&self, client: &dyn ClusterRunner, path: &Path, rendered: &str) -> Result<Box<dyn Resource>> {
        let out = client
            .run(&["create", "-f", path.to_str().unwrap_or_default(), "--dry-run", "--output=name"], RunOptions::new(true))
            .await
            .map_err(Error::Other)?;

        if !out.success {
            return Err(Error::InvalidTemplate {
                message: format!("dry-run validation of {} failed", path.display()),
                rendered: rendered.to_string(),
                stderr: out.stderr,
            });
        }

        // Dry-run output is `kind/name` (step 6), e.g. `configmap/app-config`.
        let name_line = out.stdout.lines().next().unwrap_or_default().trim();
        let (kind_path, name) = name_line.split_once('/').ok_or_else(|| Error::InvalidTemplate {
            message: format!("could not parse dry-run output {name_line:?} for {}", path.display()),
            rendered: rendered.to_string(),
            stderr: out.stderr.clone(),
        })?;
        let kind = canonical_kind(kind_path);

        Ok(factory::for_type(&kind, name, &self.namespace, &self.context, Some(path.to_path_buf())))
    }

    /// Runs the full discovery pipeline (steps 1-6).
    pub async fn discover(&self, client: &dyn ClusterRunner, renderer: &dyn Renderer) -> Result<Discovery> {
        let files = self.template_files()?;
        if files.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "template directory {} contains no .yml/.yml.erb files",
                self.template_dir.display()
            )));
        }

        let tempdir = tempfile::Builder::new()
            .prefix("kubernetes-deploy-")
            .tempdir()
            .map_err(|e| Error::Other(e.into()))?;

        let mut resources = Vec::new();
        for file in &files {
            let raw_text = fs::read_to_string(file).map_err(|e| Error::InvalidConfiguration(format!("cannot read {}: {e}", file.display())))?;
            let filename = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let rendered = renderer.render(filename, &raw_text, self.bindings).map_err(|e| Error::InvalidTemplate {
                message: e.to_string(),
                rendered: raw_text.clone(),
                stderr: String::new(),
            })?;

            let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("template");
            for (index, document) in Self::split_documents(&rendered).into_iter().enumerate() {
                let doc_path = tempdir.path().join(format!("{stem}.{index}.yml"));
                fs::write(&doc_path, &document).map_err(|e| Error::Other(e.into()))?;
                resources.push(self.validate_and_build(client, &doc_path, &document).await?);
            }
        }

        Ok(Discovery {
            resources,
            _tempdir: tempdir,
        })
    }
}

/// Files directly under `dir` whose name ends in `.yml` or `.yml.erb` (step
/// 1). A free function, not a `TemplateDiscovery` method, so the Validating
/// state (§4.8 step 1) can check "at least one matching file" before any
/// other collaborator — including `TemplateDiscovery` itself — is
/// constructed.
pub fn find_template_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| Error::InvalidConfiguration(format!("cannot read template dir {}: {e}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        let path = entry.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".yml") || name.ends_with(".yml.erb") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `kubectl create --dry-run --output=name` lowercases and pluralizes the
/// kind in its `kind/name` output (e.g. `configmaps/app-config`); canonicalize
/// back to the singular, PascalCase tags `ResourceFactory` recognizes.
fn canonical_kind(kind_path: &str) -> String {
    let lower = kind_path.to_lowercase();
    // `ingress` pluralizes irregularly (`ingresses`); check known plurals
    // exactly before falling back to a blind trailing-`s` strip.
    match lower.as_str() {
        "configmaps" => return "ConfigMap".to_string(),
        "services" => return "Service".to_string(),
        "deployments" => return "Deployment".to_string(),
        "replicasets" => return "ReplicaSet".to_string(),
        "pods" => return "Pod".to_string(),
        "ingresses" => return "Ingress".to_string(),
        "persistentvolumeclaims" => return "PersistentVolumeClaim".to_string(),
        "poddisruptionbudgets" => return "PodDisruptionBudget".to_string(),
        "podtemplates" => return "PodTemplate".to_string(),
        "cloudsqls" => return "Cloudsql".to_string(),
        "redis" => return "Redis".to_string(),
        "bugsnags" => return "Bugsnag".to_string(),
        _ => {}
    }

    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
