/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/secrets.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! The secrets provisioner (§6): an opaque collaborator with two methods,
//! `changes_required()` and `apply()`. Provisioning secrets from an external
//! encrypted-JSON file is out of scope (§1) — this module only defines the
//! boundary and a default no-op implementation.

use async_trait::async_trait;

#[async_trait]
pub trait SecretsProvisioner: Send + Sync {
    /// Whether the cluster's secrets are out of sync with the source file.
    async fn changes_required(&self) -> anyhow::Result<bool>;

    /// Provisions the required secrets. Only called when `changes_required`
    /// returned true.
    async fn apply(&self) -> anyhow::Result<()>;
}

/// Used when no secrets source is configured for this deploy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSecretsProvisioner;

#[async_trait]
impl SecretsProvisioner for NullSecretsProvisioner {
    async fn changes_required(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn apply(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
