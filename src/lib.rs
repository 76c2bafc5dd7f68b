//! # Reactive Template Compiler
//!
//! Source-to-source compiler for component classes with declarative markup.
//! Markup that depends on reactive containers is wrapped so only the
//! dependent subtree recomputes, then lowered to explicit node-construction
//! calls. Every component also gets a project-unique custom-element tag.
//!
//! ## Pipeline per file
//!
//! 1. Parse with oxc and discover component classes.
//! 2. Install sibling `.template` files as `template()` methods.
//! 3. Initialize `ref<T>()` / `refProperty()` containers.
//! 4. Capture reactive reads inside `computed(fn)`.
//! 5. Wrap reactive conditions and loops in template content.
//! 6. Lower markup to `createElement` calls.
//! 7. Commit: assign tags, record template associations, cache.
//!
//! Each step is a text-to-text pass over span edits; untouched source is
//! reproduced byte for byte. No failure aborts a build: the affected file is
//! returned unchanged with a [`Diagnostic`].
//!
//! ## Classification
//!
//! A value is a reactive container when its type is declared in the reactive
//! primitives module. Names alone never decide, and names bound inside a
//! closure are never dependencies of it.

#[cfg(feature = "napi")]
mod bridge;
mod cache;
mod capture;
mod compiler;
mod component;
mod condition;
mod config;
mod diagnostics;
mod discovery;
mod filesystem;
mod jsx_lowerer;
mod loops;
mod parse;
mod ref_init;
mod registry;
mod rewrite;
mod scope;
mod template;
mod types;

#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod safety_tests;

#[cfg(feature = "napi")]
pub use bridge::NativeCompiler;

pub use compiler::{Compiler, FileAnalysis, WatchEvent, WatchOutcome};
pub use component::ComponentDeclaration;
pub use config::{CompilerConfig, CompilerSettings, RuntimeNames};
pub use diagnostics::{CompileError, Diagnostic, Severity};
pub use filesystem::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use registry::{derive_tag, TagError, TagKind, TagOwner, TagRecord, TagRegistry, TagState};
pub use types::{SemanticTypeProvider, StaticType, TypeClassifier, TypeProvider, TypeShape};
