/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/error.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! The deploy error taxonomy (§7). One variant per external failure mode;
//! everything else collapses into `Other`. `UnrecognizedKind` is
//! deliberately absent here — it is a warning, not an error (§4.2, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("invalid template: {message}\n--- rendered ---\n{rendered}\n--- cluster stderr ---\n{stderr}")]
    InvalidTemplate {
        message: String,
        rendered: String,
        stderr: String,
    },

    #[error("apply failed: {debug_info}")]
    ApplyFailed { debug_info: String },

    #[error("replace failed: {debug_info}")]
    ReplaceFailed { debug_info: String },

    #[error("{} resource(s) did not succeed:\n{}", .failures.len(), .failures.join("\n\n"))]
    ResourceFailed { failures: Vec<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
