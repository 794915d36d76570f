/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/deployer.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Deployer (§4.6): partitions resources by `deploy_method`, runs individual
//! `replace`s first (falling back to `create`, but only when the replace
//! failed because the resource doesn't exist yet), then the apply batch as
//! a single monolithic CLI call, enforcing the protected-namespace + prune
//! hard stop and deriving the prune whitelist from the server version.

use chrono::Utc;
use regex::Regex;

use crate::cluster_client::{ClusterRunner, RunOptions};
use crate::error::{Error, Result};
use crate::resource::{is_protected_namespace, DeployMethod, Resource};

const STABLE_PRUNE_WHITELIST: &[&str] = &[
    "core/v1/ConfigMap",
    "core/v1/Pod",
    "core/v1/Service",
    "batch/v1/Job",
    "extensions/v1beta1/DaemonSet",
    "extensions/v1beta1/Deployment",
    "extensions/v1beta1/Ingress",
    "apps/v1beta1/StatefulSet",
];

/// Detects the cluster's server minor version via `version --short` and
/// picks the matching HorizontalPodAutoscaler apiVersion (§6, §9 Design
/// Notes: unrecognized/future versions fall into the "everything else"
/// bucket).
pub async fn prune_whitelist(client: &dyn ClusterRunner) -> Vec<String> {
    let hpa = match server_minor_version(client).await {
        Some(5) => "extensions/v1beta1/HorizontalPodAutoscaler",
        _ => "autoscaling/v1/HorizontalPodAutoscaler",
    };
    STABLE_PRUNE_WHITELIST.iter().map(|s| s.to_string()).chain(std::iter::once(hpa.to_string())).collect()
}

async fn server_minor_version(client: &dyn ClusterRunner) -> Option<u32> {
    let out = client.run(&["version", "--short"], RunOptions::new(false)).await.ok()?;
    if !out.success {
        return None;
    }
    let re = Regex::new(r"Server Version:\s*v?\d+\.(\d+)").ok()?;
    re.captures(&out.stdout)?.get(1)?.as_str().parse().ok()
}

/// True if `replace` stderr indicates the resource doesn't exist yet, the
/// only case §4.6 allows a `create` fallback for (a naming clash or a bad
/// manifest should fail the deploy outright, not paper over it with a
/// fallback).
fn indicates_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("notfound") || lower.contains("not found")
}

/// Best-effort extraction of an offending template's contents from apply
/// stderr (§4.6): look for a path ending in `.yml`/`.yml.erb`-like text and
/// read it if it exists.
fn extract_offending_file_contents(stderr: &str) -> Option<String> {
    let re = Regex::new(r#"[^\s"']+\.ya?ml(?:\.erb)?"#).ok()?;
    let path = re.find(stderr)?.as_str();
    std::fs::read_to_string(path).ok()
}

pub struct Deployer<'a> {
    pub client: &'a dyn ClusterRunner,
    pub namespace: String,
    pub prune_enabled: bool,
}

impl<'a> Deployer<'a> {
    pub fn new(client: &'a dyn ClusterRunner, namespace: &str, prune_enabled: bool) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            prune_enabled,
        }
    }

    /// Runs the full deploy for `resources`: individual replaces first, then
    /// the apply batch (§5 ordering decision). Sets `deploy_started_at` on
    /// every resource before its CLI call is issued.
    pub async fn deploy(&self, resources: &mut [Box<dyn Resource>]) -> Result<()> {
        if self.prune_enabled && is_protected_namespace(&self.namespace) {
            return Err(Error::InvalidConfiguration(format!(
                "refusing to deploy to protected namespace '{}' with prune enabled",
                self.namespace
            )));
        }

        self.run_individual_replaces(resources).await?;
        self.run_apply_batch(resources).await?;
        Ok(())
    }

    async fn run_individual_replaces(&self, resources: &mut [Box<dyn Resource>]) -> Result<()> {
        for resource in resources.iter_mut() {
            let method = resource.deploy_method();
            if method == DeployMethod::Apply {
                continue;
            }
            let Some(path) = resource.manifest_path().cloned() else { continue };
            let path_str = path.to_str().unwrap_or_default();

            resource.set_deploy_started_at(Utc::now());

            let mut args = vec!["replace".to_string(), "-f".to_string(), path_str.to_string()];
            if method == DeployMethod::ReplaceForce {
                args.push("--force".to_string());
            }
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let out = self.client.run(&arg_refs, RunOptions::new(false)).await.map_err(Error::Other)?;

            if out.success {
                continue;
            }

            if !indicates_not_found(&out.stderr) {
                return Err(Error::ReplaceFailed {
                    debug_info: format!("{}: replace failed ({})", resource.id(), out.stderr.trim()),
                });
            }

            let create_out = self
                .client
                .run(&["create", "-f", path_str], RunOptions::new(true))
                .await
                .map_err(Error::Other)?;
            if !create_out.success {
                return Err(Error::ReplaceFailed {
                    debug_info: format!("{}: replace failed ({}) and create fallback failed ({})", resource.id(), out.stderr.trim(), create_out.stderr.trim()),
                });
            }
        }
        Ok(())
    }

    async fn run_apply_batch(&self, resources: &mut [Box<dyn Resource>]) -> Result<()> {
        let mut args: Vec<String> = vec!["apply".to_string()];
        let mut any = false;
        for resource in resources.iter_mut() {
            if resource.deploy_method() != DeployMethod::Apply {
                continue;
            }
            let Some(path) = resource.manifest_path() else { continue };
            args.push("-f".to_string());
            args.push(path.to_string_lossy().into_owned());
            resource.set_deploy_started_at(Utc::now());
            any = true;
        }
        if !any {
            return Ok(());
        }

        if self.prune_enabled {
            args.push("--prune".to_string());
            args.push("--all".to_string());
            let whitelist = prune_whitelist(self.client).await;
            for kind in &whitelist {
                args.push(format!("--prune-whitelist={kind}"));
            }
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.client.run(&arg_refs, RunOptions::new(true)).await.map_err(Error::Other)?;

        if !out.success {
            let debug_info = match extract_offending_file_contents(&out.stderr) {
                Some(contents) => format!("apply batch failed:\n{}\n--- offending template ---\n{contents}", out.stderr.trim()),
                None => format!("one of your templates is invalid:\n{}", out.stderr.trim()),
            };
            return Err(Error::ApplyFailed { debug_info });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_offending_file_path_mentioned_in_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        std::fs::write(&path, "kind: Frobnicator\n").unwrap();
        let stderr = format!("error validating data: error parsing {}: invalid syntax", path.display());
        let contents = extract_offending_file_contents(&stderr);
        assert_eq!(contents, Some("kind: Frobnicator\n".to_string()));
    }

    #[test]
    fn no_match_when_stderr_has_no_file_path() {
        assert_eq!(extract_offending_file_contents("some unrelated error"), None);
    }

    #[test]
    fn not_found_stderr_is_recognized_case_insensitively() {
        assert!(indicates_not_found("Error from server (NotFound): configmaps \"app-config\" not found"));
        assert!(indicates_not_found("deployments.apps \"web\" not found"));
    }

    #[test]
    fn other_replace_failures_are_not_treated_as_not_found() {
        assert!(!indicates_not_found("error validating data: invalid syntax"));
        assert!(!indicates_not_found("Error from server (Conflict): the object has been modified"));
    }

    #[test]
    fn parses_server_minor_version_from_version_short_output() {
        let re = Regex::new(r"Server Version:\s*v?\d+\.(\d+)").unwrap();
        let captures = re.captures("Server Version: v1.28.3").unwrap();
        assert_eq!(&captures[1], "28");
    }

    fn replaceable_resource(path: &std::path::Path) -> crate::resource::other_kinds::ExistenceBasedResource {
        let mut base = crate::resource::ResourceBase::new("Cloudsql", "primary", "default", "ctx", std::time::Duration::from_secs(300));
        base.manifest_path = Some(path.to_path_buf());
        crate::resource::other_kinds::ExistenceBasedResource::new(base)
    }

    #[tokio::test]
    async fn replace_falls_back_to_create_only_when_not_found() {
        use crate::cluster_client::fake::{fail, ok, FakeClusterClient};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudsql.yml");
        std::fs::write(&path, "kind: Cloudsql\n").unwrap();
        let path_str = path.to_str().unwrap();

        let fake = FakeClusterClient::new();
        fake.on(&["replace", "-f", path_str], fail("cloudsqls.sql.example.com \"primary\" not found"));
        fake.on(&["create", "-f", path_str], ok("cloudsql.sql.example.com/primary created"));

        let deployer = Deployer::new(&fake, "default", false);
        let mut resources: Vec<Box<dyn Resource>> = vec![Box::new(replaceable_resource(&path))];
        deployer.run_individual_replaces(&mut resources).await.unwrap();

        assert!(fake.calls().contains(&format!("create -f {path_str}")));
    }

    #[tokio::test]
    async fn replace_failure_unrelated_to_existence_skips_the_create_fallback() {
        use crate::cluster_client::fake::{fail, FakeClusterClient};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudsql.yml");
        std::fs::write(&path, "kind: Cloudsql\n").unwrap();
        let path_str = path.to_str().unwrap();

        let fake = FakeClusterClient::new();
        fake.on(&["replace", "-f", path_str], fail("error validating data: invalid syntax"));

        let deployer = Deployer::new(&fake, "default", false);
        let mut resources: Vec<Box<dyn Resource>> = vec![Box::new(replaceable_resource(&path))];
        let result = deployer.run_individual_replaces(&mut resources).await;

        assert!(matches!(result, Err(Error::ReplaceFailed { .. })));
        assert!(!fake.calls().iter().any(|c| c.starts_with("create")));
    }
}
