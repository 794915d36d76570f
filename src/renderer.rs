/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/renderer.rs
 * SPDX-License-Identifier: Apache-2.0
 */

//! The template renderer (§6, §9 Design Notes): an opaque collaborator that
//! maps filename + raw text + bindings to expanded text. The real templating
//! engine (ERB-style expansion) is explicitly out of scope (§1); this module
//! only defines the trait boundary and a couple of concrete stand-ins good
//! enough to exercise discovery → render → validate end to end.

use std::collections::HashMap;

use anyhow::Result;

/// Expands a template file's raw text using the supplied bindings.
///
/// Implementations may raise on malformed templates; the orchestrator turns
/// that into `Error::InvalidTemplate` (§7).
pub trait Renderer: Send + Sync {
    fn render(&self, filename: &str, raw_text: &str, bindings: &HashMap<String, String>) -> Result<String>;
}

/// Returns `.yml` files unchanged and performs `${VAR}`/`{{VAR}}`
/// substitution on `.yml.erb` files. A stand-in for a real templating
/// engine — swap in a different `Renderer` impl to use mustache, go-template,
/// or the original ERB dialect without touching discovery or the
/// orchestrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

impl Renderer for TemplateRenderer {
    fn render(&self, filename: &str, raw_text: &str, bindings: &HashMap<String, String>) -> Result<String> {
        if !filename.ends_with(".erb") {
            return Ok(raw_text.to_string());
        }

        let mut expanded = raw_text.to_string();
        for (key, value) in bindings {
            expanded = expanded.replace(&format!("${{{key}}}"), value);
            expanded = expanded.replace(&format!("{{{{{key}}}}}"), value);
        }
        Ok(expanded)
    }
}
