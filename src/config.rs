//! Compiler configuration.
//!
//! `CompilerConfig` is the serializable, host-facing form (camelCase JSON,
//! every field defaulted). `CompilerSettings` is the compiled form the
//! passes read: module patterns are turned into regexes once, up front.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::diagnostics::CompileError;

const CORE_REF_MODULE: &str = "typecomposer/core/ref/index";
const TYPES_REF_MODULE: &str = "typecomposer/types/ref.d.ts";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeNames {
    /// Import source of the `computed` helper.
    pub module: String,
    pub computed: String,
    pub track: String,
    pub cache: String,
    pub create_element: String,
    pub create_fragment: String,
    pub capture_prefix: String,
    pub tag_suffix: String,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            module: "typecomposer".to_string(),
            computed: "computed".to_string(),
            track: "put".to_string(),
            cache: "cache".to_string(),
            create_element: "TypeComposer.createElement".to_string(),
            create_fragment: "TypeComposer.createFragment".to_string(),
            capture_prefix: "_c__tc_".to_string(),
            tag_suffix: "tc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Pattern matched against the declaring module of reactive primitives.
    pub reactive_module: String,
    /// Typing-only modules whose declarations also count as reactive.
    pub typing_modules: Vec<String>,
    /// module -> exported name -> module that actually declares it.
    pub reexports: HashMap<String, HashMap<String, String>>,
    /// Modules whose PascalCase exports are component base classes.
    pub framework_modules: Vec<String>,
    /// Extra base class names recognized regardless of where they come from.
    pub component_bases: Vec<String>,
    pub register_decorator: String,
    /// Class method that returns a component's markup.
    pub template_method: String,
    pub template_extension: String,
    pub identity_attribute: String,
    pub max_pass_iterations: usize,
    pub runtime: RuntimeNames,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let mut typecomposer = HashMap::new();
        for name in ["ref", "computed", "refProperty", "refList", "RefList"] {
            typecomposer.insert(name.to_string(), CORE_REF_MODULE.to_string());
        }
        for name in ["Ref", "Computed", "RefProperty"] {
            typecomposer.insert(name.to_string(), TYPES_REF_MODULE.to_string());
        }
        let mut reexports = HashMap::new();
        reexports.insert("typecomposer".to_string(), typecomposer);

        Self {
            reactive_module: r"typecomposer[\\/]+core[\\/]+ref".to_string(),
            typing_modules: vec![r"typecomposer[\\/]+types[\\/]+ref".to_string()],
            reexports,
            framework_modules: vec!["typecomposer".to_string()],
            component_bases: vec![],
            register_decorator: "Register".to_string(),
            template_method: "template".to_string(),
            template_extension: ".template".to_string(),
            identity_attribute: "key".to_string(),
            max_pass_iterations: 16,
            runtime: RuntimeNames::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        serde_json::from_str(json).map_err(|e| CompileError::Config(e.to_string()))
    }

    pub fn compile(self) -> Result<CompilerSettings, CompileError> {
        CompilerSettings::new(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILED SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Recognizes the modules reactive primitives are declared in.
#[derive(Debug, Clone)]
pub struct ModuleMatcher {
    reactive: Regex,
    typing: Vec<Regex>,
}

impl ModuleMatcher {
    pub fn is_reactive_module(&self, module: &str) -> bool {
        self.reactive.is_match(module)
    }

    pub fn is_typing_module(&self, module: &str) -> bool {
        self.typing.iter().any(|re| re.is_match(module))
    }

    pub fn is_recognized(&self, module: &str) -> bool {
        self.is_reactive_module(module) || self.is_typing_module(module)
    }
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub options: CompilerConfig,
    pub modules: ModuleMatcher,
    capture_key: Regex,
}

impl CompilerSettings {
    pub fn new(options: CompilerConfig) -> Result<Self, CompileError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CompileError::Config(format!("{pattern}: {e}")))
        };
        let reactive = compile(&options.reactive_module)?;
        let typing = options
            .typing_modules
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let capture_key = compile(&format!(
            r"^{}(\d+_)?$",
            regex::escape(&options.runtime.capture_prefix)
        ))?;

        Ok(Self {
            options,
            modules: ModuleMatcher { reactive, typing },
            capture_key,
        })
    }

    pub fn runtime(&self) -> &RuntimeNames {
        &self.options.runtime
    }

    /// Whether `name` has the shape of a generated capture key.
    pub fn is_capture_key(&self, name: &str) -> bool {
        self.capture_key.is_match(name)
    }

    /// Resolve the module that declares `export` when imported from `source`.
    pub fn declaring_module(&self, source: &str, export: &str) -> String {
        self.options
            .reexports
            .get(source)
            .and_then(|names| names.get(export))
            .cloned()
            .unwrap_or_else(|| source.to_string())
    }

    pub fn is_framework_module(&self, source: &str) -> bool {
        self.options.framework_modules.iter().any(|m| m == source)
    }
}
