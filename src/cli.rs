/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/cli.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Command-line surface for `kubernetes-deploy` (§6). Positional
//! namespace/context plus the flag set; the four environment variables
//! (`REVISION`, `ENVIRONMENT`, `KUBECONFIG`, `LEVEL`/`DEBUG`) are read
//! separately in `main`, the way `k8s_local_dev::main` keeps env wiring out
//! of the `clap` struct.

use std::collections::HashMap;

use clap::Parser;

/// Deploys a directory of Kubernetes manifests and waits for the rollout
/// to converge.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The target namespace.
    pub namespace: String,

    /// The cluster context to deploy into.
    pub context: String,

    /// Directory containing `.yml`/`.yml.erb` manifest templates. Falls back
    /// to `config/deploy/$ENVIRONMENT` when omitted.
    #[arg(long)]
    pub template_dir: Option<String>,

    /// Comma-separated `key=value` bindings made available to the renderer.
    #[arg(long)]
    pub bindings: Option<String>,

    /// Apply and exit without watching the rollout to completion.
    #[arg(long)]
    pub skip_wait: bool,

    /// Allow deploying to a protected namespace (default/kube-system/kube-public).
    #[arg(long)]
    pub allow_protected_ns: bool,

    /// Disable `--prune` on the apply batch.
    #[arg(long)]
    pub no_prune: bool,

    /// Prefix log lines with the namespace/context, useful when multiple
    /// deploys interleave in one CI log stream.
    #[arg(long)]
    pub verbose_log_prefix: bool,
}

/// Parses `k1=v1,k2=v2` into a bindings map. Empty input yields an empty map.
pub fn parse_bindings(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}
