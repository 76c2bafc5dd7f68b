//! The compiler instance a build host talks to.
//!
//! One [`Compiler`] owns the project-wide state: the tag registry, the
//! template associations, the component index and the analysis cache. Files
//! are analyzed independently and in parallel; shared state is only touched
//! when a finished analysis is committed.
//!
//! Each analysis of a file takes a generation number. A result whose
//! generation is no longer the newest for that file when it is committed is
//! discarded, so the latest source text always wins.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::AnalysisCache;
use crate::capture::compile_computed_calls;
use crate::component::{discover_components, import_table, ComponentDeclaration, ComponentIndex};
use crate::condition::compile_conditions;
use crate::config::{CompilerConfig, CompilerSettings};
use crate::diagnostics::{
    CompileError, Diagnostic, Diagnostics, Severity, DIAG_RUNTIME_SHADOWED, DIAG_TAG_CONFLICT,
    DIAG_TEMPLATE_READ,
};
use crate::discovery::{find_script_files, index_components};
use crate::filesystem::{FileSystem, OsFileSystem};
use crate::jsx_lowerer::lower_templates;
use crate::loops::compile_loops;
use crate::parse::{is_script_path, run_pass, run_until_stable, with_program, PassContext};
use crate::ref_init::compile_reactive_init;
use crate::registry::{TagError, TagRegistry};
use crate::rewrite::Edit;
use crate::scope::{import_insertion_point, module_bindings};
use crate::template::{
    inject_templates, load_templates, template_module_stub, template_path, TemplateIndex, TemplateSource,
};

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEvent {
    Created,
    Updated,
    Deleted,
}

impl std::str::FromStr for WatchEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" | "create" => Ok(WatchEvent::Created),
            "updated" | "update" => Ok(WatchEvent::Updated),
            "deleted" | "delete" => Ok(WatchEvent::Deleted),
            other => Err(format!("unknown watch event `{other}`")),
        }
    }
}

/// What a file-system change means for previously compiled output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutcome {
    /// Component files whose output must be regenerated.
    pub invalidated: Vec<PathBuf>,
    pub released_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub code: String,
    pub components: Vec<ComponentDeclaration>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileAnalysis {
    fn unchanged(source: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            code: source.to_string(),
            components: vec![],
            diagnostics,
        }
    }
}

/// A finished analysis waiting to be committed.
struct Compiled {
    code: String,
    components: Vec<ComponentDeclaration>,
    templates: Vec<PathBuf>,
    cache_key: String,
    cached: bool,
    diagnostics: Diagnostics,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

// Lock order: generations, registry, templates, components, cache.
pub struct Compiler {
    settings: CompilerSettings,
    fs: Arc<dyn FileSystem>,
    registry: Mutex<TagRegistry>,
    templates: RwLock<TemplateIndex>,
    components: RwLock<ComponentIndex>,
    cache: Mutex<AnalysisCache>,
    generations: Mutex<HashMap<PathBuf, u64>>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self, CompileError> {
        Self::with_file_system(config, Arc::new(OsFileSystem))
    }

    pub fn with_file_system(config: CompilerConfig, fs: Arc<dyn FileSystem>) -> Result<Self, CompileError> {
        let settings = config.compile()?;
        let registry = TagRegistry::new(fs.clone()).with_suffix(settings.runtime().tag_suffix.clone());
        Ok(Self {
            settings,
            fs,
            registry: Mutex::new(registry),
            templates: RwLock::new(TemplateIndex::new()),
            components: RwLock::new(ComponentIndex::new()),
            cache: Mutex::new(AnalysisCache::new()),
            generations: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Rewritten source for `path`. Any failure leaves the source unchanged.
    pub fn analyze(&self, path: &Path, source: &str) -> String {
        match self.analyze_file(path, source) {
            Ok(analysis) => analysis.code,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "analysis discarded");
                source.to_string()
            }
        }
    }

    /// Full analysis result. The only error is a superseded analysis; every
    /// other failure degrades to unchanged output plus a diagnostic.
    pub fn analyze_file(&self, path: &Path, source: &str) -> Result<FileAnalysis, CompileError> {
        let generation = self.begin(path);

        if self.is_template_file(path) {
            return Ok(FileAnalysis::unchanged(&template_module_stub(path), vec![]));
        }
        if !is_script_path(path) {
            return Ok(FileAnalysis::unchanged(source, vec![]));
        }

        match self.compile(path, source) {
            Ok(compiled) => self.commit(path, source, generation, compiled),
            Err(e) => {
                let mut diagnostics = Diagnostics::new();
                diagnostics.report(e.to_diagnostic(source));
                Ok(FileAnalysis::unchanged(source, diagnostics.into_vec()))
            }
        }
    }

    /// Analyze many files in parallel. Components are indexed across the
    /// whole batch first so cross-file base classes resolve.
    pub fn analyze_batch(&self, files: &[(PathBuf, String)]) -> Vec<(PathBuf, String)> {
        {
            let mut index = write(&self.components);
            index_components(files, &self.settings, &mut index);
        }
        files
            .par_iter()
            .map(|(path, source)| (path.clone(), self.analyze(path, source)))
            .collect()
    }

    /// Index every component under `root` and assign their tags.
    pub fn scan_project(&self, root: &Path) -> Vec<ComponentDeclaration> {
        let files: Vec<(PathBuf, String)> = find_script_files(root)
            .into_iter()
            .filter_map(|path| match self.fs.read_to_string(&path) {
                Ok(source) => Some((path, source)),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "cannot read module");
                    None
                }
            })
            .collect();

        let mut found = {
            let mut index = write(&self.components);
            index_components(&files, &self.settings, &mut index)
        };

        let mut diagnostics = Diagnostics::new();
        let mut registry = lock(&self.registry);
        let mut templates = write(&self.templates);
        let mut by_file: HashMap<PathBuf, Vec<&mut ComponentDeclaration>> = HashMap::new();
        for component in found.iter_mut() {
            by_file.entry(component.file.clone()).or_default().push(component);
        }
        for (file, mut components) in by_file {
            let mut links = vec![];
            for component in components.iter_mut() {
                let template = template_path(&file, &component.name, &self.settings.options.template_extension);
                if self.fs.exists(&template) {
                    component.template_file = Some(template.clone());
                    links.push((template, component.name.clone()));
                }
                component.tag = self.tag_for(&mut registry, component, &mut diagnostics);
            }
            templates.replace(&file, links);
        }
        tracing::info!(root = %root.display(), modules = files.len(), components = found.len(), "scanned project");
        found
    }

    /// Inform the compiler of a file-system change.
    pub fn watch_change(&self, path: &Path, event: WatchEvent) -> WatchOutcome {
        let mut generations = lock(&self.generations);
        // Any analysis of `path` still in flight is now stale.
        *generations.entry(path.to_path_buf()).or_insert(0) += 1;

        let mut registry = lock(&self.registry);
        let mut templates = write(&self.templates);
        let mut components = write(&self.components);
        let mut cache = lock(&self.cache);
        let mut outcome = WatchOutcome::default();

        if self.is_template_file(path) {
            let owner = match event {
                WatchEvent::Deleted => templates.remove_template(path).map(|link| link.component_file),
                WatchEvent::Created | WatchEvent::Updated => templates
                    .owner(path)
                    .map(|link| link.component_file.clone())
                    .or_else(|| {
                        let class = self.template_class(path)?;
                        components.file_declaring(path.parent()?, &class)
                    }),
            };
            if let Some(file) = owner {
                cache.invalidate(&file);
                outcome.invalidated.push(file);
            }
        } else {
            cache.invalidate(path);
            if event == WatchEvent::Deleted {
                outcome.released_tags = registry.release_file(path);
                templates.remove_component(path);
                components.remove(path);
            }
        }

        tracing::debug!(
            file = %path.display(),
            event = ?event,
            invalidated = ?outcome.invalidated,
            released = ?outcome.released_tags,
            "processed watch event"
        );
        outcome
    }

    /// Tag of `class_name` declared in `path`, assigning one if needed.
    pub fn assign_tag(&self, class_name: &str, path: &Path) -> Result<String, TagError> {
        let mut registry = lock(&self.registry);
        let (tag, diagnostic) = registry.assign(class_name, path)?;
        if let Some(d) = diagnostic {
            d.emit();
        }
        Ok(tag)
    }

    pub fn tags_for(&self, path: &Path) -> Vec<String> {
        lock(&self.registry).tags_for(path)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ───────────────────────────────────────────────────────────────────────────

    fn begin(&self, path: &Path) -> u64 {
        let mut generations = lock(&self.generations);
        let generation = generations.entry(path.to_path_buf()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_template_file(&self, path: &Path) -> bool {
        path.to_string_lossy()
            .ends_with(self.settings.options.template_extension.as_str())
    }

    fn template_class(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy();
        name.strip_suffix(self.settings.options.template_extension.as_str())
            .map(str::to_string)
    }

    fn compile(&self, path: &Path, source: &str) -> Result<Compiled, CompileError> {
        let settings = &self.settings;
        let mut diagnostics = Diagnostics::new();

        let (mut components, _) = {
            let index = read(&self.components);
            with_program(path, source, settings, |ctx| {
                Ok(discover_components(ctx.program, ctx.source, path, settings, &index))
            })?
        };

        let mut templates: Vec<TemplateSource> = vec![];
        for loaded in load_templates(self.fs.as_ref(), path, &components, &settings.options.template_extension) {
            match loaded {
                Ok(template) => templates.push(template),
                Err((template_file, e)) => diagnostics.report(Diagnostic::new(
                    DIAG_TEMPLATE_READ,
                    Severity::Warning,
                    &format!("cannot read {}: {e}", template_file.display()),
                    &path.to_string_lossy(),
                )),
            }
        }
        for component in components.iter_mut() {
            component.template_file = templates
                .iter()
                .find(|t| t.class_name == component.name)
                .map(|t| t.path.clone());
        }
        let template_files: Vec<PathBuf> = templates.iter().map(|t| t.path.clone()).collect();

        let cache_key = {
            let mut parts: Vec<&str> = vec![source];
            parts.extend(components.iter().map(|c| c.name.as_str()));
            parts.extend(templates.iter().map(|t| t.hash.as_str()));
            AnalysisCache::compute_key(parts)
        };
        if let Some(hit) = lock(&self.cache).get(path, &cache_key) {
            tracing::debug!(file = %path.display(), "analysis cache hit");
            let mut cached = Diagnostics::new();
            cached.extend(hit.diagnostics);
            return Ok(Compiled {
                code: hit.code,
                components,
                templates: template_files,
                cache_key,
                cached: true,
                diagnostics: cached,
            });
        }

        let mut code = source.to_string();
        if !templates.is_empty() {
            code = run_pass(path, &code, settings, &mut diagnostics, |ctx| inject_templates(ctx, &templates))?.0;
        }

        let names: HashSet<String> = components.iter().map(|c| c.name.clone()).collect();
        code = run_pass(path, &code, settings, &mut diagnostics, |ctx| compile_reactive_init(ctx, &names))?.0;
        code = run_until_stable("computed", path, code, settings, &mut diagnostics, compile_computed_calls)?;

        if !components.is_empty() {
            let before = code.clone();
            code = run_until_stable("conditions", path, code, settings, &mut diagnostics, compile_conditions)?;
            code = run_until_stable("loops", path, code, settings, &mut diagnostics, compile_loops)?;
            if code != before {
                code = run_pass(path, &code, settings, &mut diagnostics, runtime_import)?.0;
            }
            code = run_pass(path, &code, settings, &mut diagnostics, lower_templates)?.0;
        }

        tracing::debug!(
            file = %path.display(),
            components = components.len(),
            templates = templates.len(),
            changed = code != source,
            "compiled file"
        );
        Ok(Compiled {
            code,
            components,
            templates: template_files,
            cache_key,
            cached: false,
            diagnostics,
        })
    }

    fn commit(
        &self,
        path: &Path,
        source: &str,
        generation: u64,
        compiled: Compiled,
    ) -> Result<FileAnalysis, CompileError> {
        let Compiled {
            code,
            mut components,
            templates: template_files,
            cache_key,
            cached,
            mut diagnostics,
        } = compiled;

        let generations = lock(&self.generations);
        if generations.get(path) != Some(&generation) {
            tracing::debug!(file = %path.display(), generation, "superseded, discarding result");
            return Err(CompileError::Superseded(path.to_path_buf()));
        }

        let mut registry = lock(&self.registry);
        let names: HashSet<String> = components.iter().map(|c| c.name.clone()).collect();
        registry.retain_classes(path, &names);
        for component in components.iter_mut() {
            component.tag = self.tag_for(&mut registry, component, &mut diagnostics);
        }
        drop(registry);

        let links = components
            .iter()
            .filter_map(|c| c.template_file.clone().map(|t| (t, c.name.clone())))
            .collect();
        write(&self.templates).replace(path, links);
        write(&self.components).update(path, names);

        let analysis = FileAnalysis {
            code,
            components,
            diagnostics: diagnostics.into_vec(),
        };
        if !cached {
            lock(&self.cache).set(path, cache_key, analysis.clone());
        }
        drop(generations);

        tracing::debug!(
            file = %path.display(),
            templates = template_files.len(),
            unchanged = analysis.code == source,
            "committed analysis"
        );
        Ok(analysis)
    }

    /// Tag for one discovered component. A declared tag that cannot be
    /// reserved falls back to a derived one.
    fn tag_for(
        &self,
        registry: &mut TagRegistry,
        component: &ComponentDeclaration,
        diagnostics: &mut Diagnostics,
    ) -> Option<String> {
        let file = component.file.as_path();
        match &component.static_tag {
            Some(tag) => match registry.reserve_static(tag, &component.name, file) {
                Ok(()) => return Some(tag.clone()),
                Err(e) => diagnostics.report(Diagnostic::new(
                    DIAG_TAG_CONFLICT,
                    Severity::Warning,
                    &e.to_string(),
                    &file.to_string_lossy(),
                )),
            },
            None => registry.release_static(&component.name, file),
        }
        match registry.assign(&component.name, file) {
            Ok((tag, diagnostic)) => {
                if let Some(d) = diagnostic {
                    diagnostics.report(d);
                }
                Some(tag)
            }
            Err(e) => {
                diagnostics.report(Diagnostic::new(
                    DIAG_TAG_CONFLICT,
                    Severity::Error,
                    &e.to_string(),
                    &file.to_string_lossy(),
                ));
                None
            }
        }
    }
}

/// Import the runtime `computed` helper that generated wrappers call.
fn runtime_import(ctx: &PassContext<'_, '_>) -> Result<Vec<Edit>, CompileError> {
    let runtime = ctx.settings.runtime();
    if !module_bindings(ctx.program).contains(&runtime.computed) {
        let line = format!("import {{ {} }} from \"{}\";", runtime.computed, runtime.module);
        let at = import_insertion_point(ctx.program);
        let text = if at == 0 { format!("{line}\n") } else { format!("\n{line}") };
        return Ok(vec![Edit::insert(at, text)]);
    }

    let from_runtime = import_table(ctx.program).get(&runtime.computed).is_some_and(|binding| {
        let declaring = ctx.settings.declaring_module(&binding.source, &binding.imported);
        binding.imported == runtime.computed
            && (binding.source == runtime.module || ctx.settings.modules.is_reactive_module(&declaring))
    });
    if !from_runtime {
        ctx.report(
            DIAG_RUNTIME_SHADOWED,
            Severity::Warning,
            &format!(
                "`{}` in this module is not the runtime helper; generated wrappers will call it",
                runtime.computed
            ),
            0,
        );
    }
    Ok(vec![])
}
