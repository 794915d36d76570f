/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/main.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! Entry point: parses CLI args and environment, wires up the collaborators,
//! and runs the Orchestrator. Exit code 0 on success, 1 on any failure (§6).

mod cli;
mod cluster_client;
mod deployer;
mod discovery;
mod error;
mod events;
mod orchestrator;
mod renderer;
mod resource;
mod secrets;
mod watcher;

use std::collections::HashMap;
use std::io::Write;

use clap::Parser;
use rand::Rng;

use cli::{parse_bindings, Cli};
use cluster_client::ClusterClient;
use error::{Error, Result};
use orchestrator::{Orchestrator, OrchestratorConfig};
use renderer::TemplateRenderer;
use secrets::NullSecretsProvisioner;

const CLUSTER_CLI_BINARY: &str = "kubectl";

fn init_logging(prefix: Option<String>) {
    let level = std::env::var("LEVEL").or_else(|_| std::env::var("DEBUG").map(|_| "debug".to_string())).unwrap_or_else(|_| "info".to_string());
    let filter = level.parse().unwrap_or(log::LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter);
    if let Some(prefix) = prefix {
        builder.format(move |buf, record| writeln!(buf, "[{prefix}] {}: {}", record.level(), record.args()));
    }
    builder.init();
}

fn deployment_id(current_sha: &str) -> String {
    let sha_prefix: String = current_sha.chars().take(8).collect();
    let suffix: String = (0..8).map(|_| format!("{:x}", rand::thread_rng().gen_range(0..16))).collect();
    format!("{sha_prefix}-{suffix}")
}

fn build_bindings(cli: &Cli, current_sha: &str) -> HashMap<String, String> {
    let mut bindings = cli.bindings.as_deref().map(parse_bindings).unwrap_or_default();
    bindings.insert("current_sha".to_string(), current_sha.to_string());
    bindings.insert("deployment_id".to_string(), deployment_id(current_sha));
    bindings
}

fn resolve_template_dir(cli: &Cli) -> Result<String> {
    if let Some(dir) = &cli.template_dir {
        return Ok(dir.clone());
    }
    let environment = std::env::var("ENVIRONMENT").map_err(|_| Error::InvalidConfiguration("ENVIRONMENT must be set when --template-dir is omitted".to_string()))?;
    Ok(format!("config/deploy/{environment}"))
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let log_prefix = cli.verbose_log_prefix.then(|| format!("{}/{}", cli.namespace, cli.context));
    init_logging(log_prefix);

    let current_sha = std::env::var("REVISION").map_err(|_| Error::InvalidConfiguration("REVISION must be set".to_string()))?;
    let kubeconfig_path = std::env::var("KUBECONFIG").map_err(|_| Error::InvalidConfiguration("KUBECONFIG must be set".to_string()))?;
    let template_dir = resolve_template_dir(&cli)?;
    let bindings = build_bindings(&cli, &current_sha);

    let client = ClusterClient::new(CLUSTER_CLI_BINARY, cli.namespace.as_str(), cli.context.as_str());
    let renderer = TemplateRenderer;
    let secrets = NullSecretsProvisioner;

    let config = OrchestratorConfig {
        namespace: cli.namespace.clone(),
        context: cli.context.clone(),
        template_dir,
        bindings,
        current_sha,
        kubeconfig_path,
        skip_wait: cli.skip_wait,
        allow_protected_ns: cli.allow_protected_ns,
        prune_enabled: !cli.no_prune,
    };

    let orchestrator = Orchestrator::new(config, &client, &renderer, &secrets);
    orchestrator.run().await
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {
            println!("deploy succeeded");
        }
        Err(err) => {
            eprintln!("deploy failed: {err:#}");
            std::process::exit(1);
        }
    }
}
