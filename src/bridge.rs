//! Node bindings for the bundler plugin.
//!
//! One `NativeCompiler` lives for the whole build (or watch session) so the
//! tag registry and template associations persist across transforms.

use napi_derive::napi;
use std::path::Path;

use crate::compiler::{Compiler, WatchEvent};
use crate::config::CompilerConfig;

fn to_napi(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[napi]
pub struct NativeCompiler {
    inner: Compiler,
}

#[napi]
impl NativeCompiler {
    #[napi(constructor)]
    pub fn new(config_json: Option<String>) -> napi::Result<Self> {
        let config = match config_json {
            Some(json) => CompilerConfig::from_json(&json).map_err(to_napi)?,
            None => CompilerConfig::default(),
        };
        Ok(Self {
            inner: Compiler::new(config).map_err(to_napi)?,
        })
    }

    /// Rewritten source text. Never fails; problems are logged.
    #[napi]
    pub fn analyze(&self, file_path: String, source: String) -> String {
        self.inner.analyze(Path::new(&file_path), &source)
    }

    /// Code, components with their tags, and diagnostics.
    #[napi]
    pub fn analyze_file(&self, file_path: String, source: String) -> napi::Result<serde_json::Value> {
        let analysis = self
            .inner
            .analyze_file(Path::new(&file_path), &source)
            .map_err(to_napi)?;
        serde_json::to_value(analysis).map_err(to_napi)
    }

    /// Returns the component files the host should re-transform.
    #[napi]
    pub fn watch_change(&self, file_path: String, event: String) -> napi::Result<Vec<String>> {
        let event: WatchEvent = event.parse().map_err(to_napi)?;
        let outcome = self.inner.watch_change(Path::new(&file_path), event);
        Ok(outcome
            .invalidated
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect())
    }

    #[napi]
    pub fn assign_tag(&self, class_name: String, file_path: String) -> napi::Result<String> {
        self.inner
            .assign_tag(&class_name, Path::new(&file_path))
            .map_err(to_napi)
    }

    #[napi]
    pub fn scan_project(&self, root: String) -> napi::Result<serde_json::Value> {
        let components = self.inner.scan_project(Path::new(&root));
        serde_json::to_value(components).map_err(to_napi)
    }
}
