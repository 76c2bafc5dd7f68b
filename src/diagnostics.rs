//! Diagnostics and error types for the reactive template compiler.
//!
//! Nothing in the compiler is fatal to a build. Failures degrade to "leave
//! this file's output unchanged" (or "give this component a derived tag")
//! and are reported as [`Diagnostic`] records, logged through `tracing` at
//! the level their category calls for.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::registry::TagError;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const DIAG_TYPE_UNRESOLVED: &str = "TC-TYPE-001";
pub const DIAG_TEMPLATE_PARSE: &str = "TC-TEMPLATE-001";
pub const DIAG_TEMPLATE_READ: &str = "TC-TEMPLATE-002";
pub const DIAG_UNRESOLVED_COMPONENT: &str = "TC-TEMPLATE-003";
pub const DIAG_TAG_AMBIGUOUS: &str = "TC-TAG-001";
pub const DIAG_TAG_CONFLICT: &str = "TC-TAG-002";
pub const DIAG_DUPLICATE_ARTIFACT: &str = "TC-ARTIFACT-001";
pub const DIAG_RUNTIME_SHADOWED: &str = "TC-RUNTIME-001";
pub const DIAG_PASS_LIMIT: &str = "TC-PASS-001";

fn get_recovery(code: &str) -> &'static str {
    match code {
        DIAG_TYPE_UNRESOLVED => "The expression is treated as non-reactive and is not wrapped.",
        DIAG_TEMPLATE_PARSE => "The file is returned unchanged.",
        DIAG_TEMPLATE_READ => "The component keeps its inline template, if any.",
        DIAG_UNRESOLVED_COMPONENT => "The tag is emitted as a plain identifier reference.",
        DIAG_TAG_AMBIGUOUS => "The tag is resolved with a numeric collision suffix.",
        DIAG_TAG_CONFLICT => "The component falls back to a derived tag.",
        DIAG_DUPLICATE_ARTIFACT => {
            "The stale template method is discarded and regenerated from the template file."
        }
        DIAG_RUNTIME_SHADOWED => "Generated wrappers use the binding already in scope.",
        DIAG_PASS_LIMIT => "Remaining nested regions are left uncompiled.",
        _ => "Unknown diagnostic.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub message: String,
    pub recovery: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, message: &str, file: &str) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity: severity_name(severity).to_string(),
            message: message.to_string(),
            recovery: get_recovery(code).to_string(),
            file: file.to_string(),
            line: 0,
            column: 0,
            hints: vec![],
        }
    }

    /// Attach a 1-based line/column computed from a byte offset into `source`.
    pub fn at(mut self, source: &str, offset: u32) -> Self {
        let (line, column) = line_column(source, offset);
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn severity(&self) -> Severity {
        match self.severity.as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "info" => Severity::Info,
            _ => Severity::Debug,
        }
    }

    /// Log through `tracing` at the diagnostic's level.
    pub fn emit(&self) {
        match self.severity() {
            Severity::Error => tracing::error!(
                code = %self.code, file = %self.file, line = self.line, column = self.column,
                "{}", self.message
            ),
            Severity::Warning => tracing::warn!(
                code = %self.code, file = %self.file, line = self.line, column = self.column,
                "{}", self.message
            ),
            Severity::Info => tracing::info!(code = %self.code, file = %self.file, "{}", self.message),
            Severity::Debug => tracing::debug!(code = %self.code, file = %self.file, "{}", self.message),
        }
    }
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Debug => "debug",
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

pub fn line_column(source: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(source.len());
    let mut line = 1;
    let mut column = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Collected diagnostics for one analysis. Only warnings and errors are kept;
/// everything is logged as it is reported.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        if diagnostic.severity() >= Severity::Warning {
            self.items.push(diagnostic);
        }
    }

    pub fn extend(&mut self, other: Vec<Diagnostic>) {
        for d in other {
            self.report(d);
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to parse {file}: {message}")]
    Parse {
        file: String,
        message: String,
        offset: u32,
    },

    #[error("malformed markup in {file}: {message}")]
    Markup {
        file: String,
        message: String,
        offset: u32,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("analysis of {} was superseded by a newer request", .0.display())]
    Superseded(PathBuf),

    #[error(transparent)]
    Tag(#[from] TagError),
}

impl CompileError {
    /// Convert a per-file failure into the diagnostic reported for it.
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        match self {
            CompileError::Parse { file, message, offset }
            | CompileError::Markup { file, message, offset } => {
                Diagnostic::new(DIAG_TEMPLATE_PARSE, Severity::Error, message, file)
                    .at(source, *offset)
            }
            CompileError::Tag(e) => {
                Diagnostic::new(DIAG_TAG_CONFLICT, Severity::Error, &e.to_string(), "")
            }
            other => Diagnostic::new("TC-INTERNAL", Severity::Error, &other.to_string(), ""),
        }
    }
}
