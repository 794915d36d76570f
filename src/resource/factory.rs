/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/resource/factory.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! ResourceFactory (§4.2): the only place kind discrimination happens
//! (§9 Design Notes). Dispatches `(kind, name)` to the matching kind impl,
//! or to the generic fallback.

use std::path::PathBuf;

use super::config_map::ConfigMapResource;
use super::deployment::DeploymentResource;
use super::generic::GenericResource;
use super::other_kinds::ExistenceBasedResource;
use super::pod::PodResource;
use super::replica_set::ReplicaSetResource;
use super::service::ServiceResource;
use super::{default_timeout_for_kind, Resource, ResourceBase};

/// Builds the Resource impl matching `kind`, with `found`/timer state
/// freshly reset (§4.2). `manifest_path` is present for resources
/// discovered from a manifest document, absent for transiently-discovered
/// children.
pub fn for_type(kind: &str, name: &str, namespace: &str, context: &str, manifest_path: Option<PathBuf>) -> Box<dyn Resource> {
    let timeout = default_timeout_for_kind(kind);
    let mut base = ResourceBase::new(kind, name, namespace, context, timeout);
    base.manifest_path = manifest_path;

    match kind {
        "ConfigMap" => Box::new(ConfigMapResource::new(base)),
        "Service" => Box::new(ServiceResource::new(base)),
        "Deployment" => Box::new(DeploymentResource::new(base)),
        "ReplicaSet" => Box::new(ReplicaSetResource::new(base, true)),
        "Pod" => Box::new(PodResource::new(base, true)),
        "Ingress" | "PersistentVolumeClaim" | "PodDisruptionBudget" | "PodTemplate" | "Cloudsql" | "Redis" | "Bugsnag" => {
            Box::new(ExistenceBasedResource::new(base))
        }
        _ => Box::new(GenericResource::new(base)),
    }
}
