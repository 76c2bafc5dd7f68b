//! Safety gate tests for compiler invariants:
//! - output is a fixed point of the compiler
//! - no two live components share a tag
//! - tags of deleted files are reclaimed, tags of live files never move
//! - a newer analysis of a file discards an older one

#[cfg(test)]
mod tests {
    use crate::compiler::{Compiler, WatchEvent};
    use crate::config::CompilerConfig;
    use crate::diagnostics::{CompileError, DIAG_TAG_AMBIGUOUS};
    use crate::filesystem::{FileSystem, MemoryFileSystem};
    use std::collections::HashSet;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock, Weak};

    fn setup() -> (Compiler, Arc<MemoryFileSystem>) {
        let fs = Arc::new(MemoryFileSystem::new());
        let compiler = Compiler::with_file_system(CompilerConfig::default(), fs.clone()).unwrap();
        (compiler, fs)
    }

    fn component_source(class_name: &str) -> String {
        format!("import {{ Component }} from \"typecomposer\";\nexport class {class_name} extends Component {{}}\n")
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // IDEMPOTENCE
    // ═══════════════════════════════════════════════════════════════════════════════

    const TODO_LIST: &str = r#"import { Component, computed, ref, refProperty } from "typecomposer";

interface Todo { id: number; title: string; done: boolean }

export class TodoList extends Component {
  todos = ref<Todo[]>();
  filter = ref<string>();
  title = refProperty("Todos");
  remaining = computed(() => this.todos.value.filter((t) => !t.done).length);

  clear() {
    this.todos.value = [];
  }

  template() {
    return (
      <section class="todos">
        <h1>{this.title}</h1>
        {this.filter.value === "" ? <p>All</p> : <p>Filtered</p>}
        <ul>
          {this.todos.map((todo, i) => (
            <li key={todo.id}>
              {i}: {todo.title}
              {todo.done && <span>done</span>}
            </li>
          ))}
        </ul>
        <>
          <button onClick={this.clear}>Clear</button>
        </>
      </section>
    );
  }
}
"#;

    #[test]
    fn test_output_is_a_fixed_point() {
        let (compiler, fs) = setup();
        let path = Path::new("src/TodoList.tsx");
        fs.write(path, TODO_LIST);
        let once = compiler.analyze(path, TODO_LIST);
        assert_ne!(once, TODO_LIST);
        let twice = compiler.analyze(path, &once);
        assert_eq!(twice, once);
        let thrice = compiler.analyze(path, &twice);
        assert_eq!(thrice, once);
    }

    #[test]
    fn test_fixed_point_output_is_fully_compiled() {
        let (compiler, _fs) = setup();
        let out = compiler.analyze(Path::new("src/TodoList.tsx"), TODO_LIST);
        assert!(out.contains("todos = ref<Todo[]>([])"), "{out}");
        assert!(out.contains("filter = ref<string>(\"\")"), "{out}");
        assert!(out.contains("title = refProperty(\"Todos\", \"title\", this)"), "{out}");
        assert!(out.contains("computed((_c__tc_) => _c__tc_.put(this.todos).value.filter((t) => !t.done).length)"), "{out}");
        assert!(out.contains(".put(this.filter).value === \"\""), "{out}");
        assert!(out.contains(".put(this.todos).map((todo, i) =>"), "{out}");
        assert!(out.contains(".cache(todo.id)"), "{out}");
        assert!(out.contains("onClick: this.clear.bind(this)"), "{out}");
        assert!(!out.contains("<li"), "{out}");
        assert_eq!(out.matches(".put(this.filter)").count(), 1, "{out}");
    }

    #[test]
    fn test_unchanged_input_gives_identical_output() {
        let (compiler, _fs) = setup();
        let path = Path::new("src/TodoList.tsx");
        let first = compiler.analyze(path, TODO_LIST);
        let second = compiler.analyze(path, TODO_LIST);
        assert_eq!(first, second);
    }

    #[test]
    fn test_file_without_components_or_computed_is_untouched() {
        let (compiler, _fs) = setup();
        let source = "import { ref } from \"typecomposer\";\n// keep   spacing\nexport const count = ref(0);\n";
        assert_eq!(compiler.analyze(Path::new("src/state.ts"), source), source);
        assert_eq!(compiler.analyze(Path::new("styles/site.css"), "a { }"), "a { }");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TAG UNIQUENESS AND RECLAMATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_colliding_classes_get_suffixed_tags() {
        let (compiler, fs) = setup();
        let a = PathBuf::from("src/a/MyButton.ts");
        let b = PathBuf::from("src/b/MyButton.ts");
        fs.write(&a, component_source("MyButton"));
        fs.write(&b, component_source("MyButton"));

        let first = compiler.analyze_file(&a, &component_source("MyButton")).unwrap();
        let second = compiler.analyze_file(&b, &component_source("MyButton")).unwrap();
        assert_eq!(first.components[0].tag.as_deref(), Some("my-button"));
        assert_eq!(second.components[0].tag.as_deref(), Some("my-button-tc2"));
        assert!(second.diagnostics.iter().any(|d| d.code == DIAG_TAG_AMBIGUOUS));

        // Reanalysis keeps both owners where they are.
        compiler.analyze(&a, &component_source("MyButton"));
        assert_eq!(compiler.tags_for(&a), vec!["my-button".to_string()]);
        assert_eq!(compiler.tags_for(&b), vec!["my-button-tc2".to_string()]);
    }

    #[test]
    fn test_assign_tag_is_stable_per_class_and_file() {
        let (compiler, fs) = setup();
        fs.write("a.ts", "");
        fs.write("b.ts", "");
        assert_eq!(compiler.assign_tag("MyButton", Path::new("a.ts")).unwrap(), "my-button");
        assert_eq!(compiler.assign_tag("MyButton", Path::new("b.ts")).unwrap(), "my-button-tc2");
        assert_eq!(compiler.assign_tag("MyButton", Path::new("a.ts")).unwrap(), "my-button");
    }

    #[test]
    fn test_deleted_file_tag_is_reclaimed() {
        let (compiler, fs) = setup();
        let old = PathBuf::from("src/old/FooBar.ts");
        let new = PathBuf::from("src/new/FooBar.ts");
        fs.write(&old, component_source("FooBar"));
        compiler.analyze(&old, &component_source("FooBar"));

        fs.remove(&old);
        let outcome = compiler.watch_change(&old, WatchEvent::Deleted);
        assert_eq!(outcome.released_tags, vec!["foo-bar".to_string()]);

        fs.write(&new, component_source("FooBar"));
        let analysis = compiler.analyze_file(&new, &component_source("FooBar")).unwrap();
        assert_eq!(analysis.components[0].tag.as_deref(), Some("foo-bar"));
    }

    #[test]
    fn test_tag_of_vanished_file_is_reclaimed_without_event() {
        let (compiler, fs) = setup();
        fs.write("src/old/FooBar.ts", "");
        fs.write("src/new/FooBar.ts", "");
        assert_eq!(compiler.assign_tag("FooBar", Path::new("src/old/FooBar.ts")).unwrap(), "foo-bar");
        fs.remove(Path::new("src/old/FooBar.ts"));
        assert_eq!(compiler.assign_tag("FooBar", Path::new("src/new/FooBar.ts")).unwrap(), "foo-bar");
        assert!(compiler.tags_for(Path::new("src/old/FooBar.ts")).is_empty());
    }

    #[test]
    fn test_removed_class_frees_its_tag() {
        let (compiler, fs) = setup();
        let path = PathBuf::from("src/widgets.ts");
        let both = "import { Component } from \"typecomposer\";\nexport class FooBar extends Component {}\nexport class BazQux extends Component {}\n";
        fs.write(&path, both);
        compiler.analyze(&path, both);
        assert_eq!(compiler.tags_for(&path), vec!["baz-qux".to_string(), "foo-bar".to_string()]);

        compiler.analyze(&path, &component_source("BazQux"));
        assert_eq!(compiler.tags_for(&path), vec!["baz-qux".to_string()]);

        fs.write("src/other.ts", "");
        assert_eq!(compiler.assign_tag("FooBar", Path::new("src/other.ts")).unwrap(), "foo-bar");
    }

    #[test]
    fn test_concurrent_analyses_never_share_a_tag() {
        let (compiler, fs) = setup();
        let files: Vec<PathBuf> = (0..8).map(|i| PathBuf::from(format!("src/m{i}/MyButton.ts"))).collect();
        for f in &files {
            fs.write(f, component_source("MyButton"));
        }

        let tags: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = files
                .iter()
                .map(|f| {
                    let compiler = &compiler;
                    scope.spawn(move || {
                        let analysis = compiler.analyze_file(f, &component_source("MyButton")).unwrap();
                        analysis.components[0].tag.clone().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<&String> = tags.iter().collect();
        assert_eq!(unique.len(), files.len());
        assert!(tags.contains(&"my-button".to_string()));
        assert!(tags.contains(&"my-button-tc8".to_string()));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SUPERSEDED ANALYSES
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Reports a change to `target` the first time a template is probed,
    /// which lands while an analysis of `target` is in flight.
    struct InterruptingFs {
        inner: MemoryFileSystem,
        target: PathBuf,
        compiler: OnceLock<Weak<Compiler>>,
        fired: AtomicBool,
    }

    impl FileSystem for InterruptingFs {
        fn exists(&self, path: &Path) -> bool {
            if path.extension().is_some_and(|e| e == "template") && !self.fired.swap(true, Ordering::SeqCst) {
                if let Some(compiler) = self.compiler.get().and_then(Weak::upgrade) {
                    compiler.watch_change(&self.target, WatchEvent::Updated);
                }
            }
            self.inner.exists(path)
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.inner.read_to_string(path)
        }
    }

    #[test]
    fn test_superseded_analysis_is_discarded() {
        let target = PathBuf::from("src/Card.tsx");
        let fs = Arc::new(InterruptingFs {
            inner: MemoryFileSystem::new(),
            target: target.clone(),
            compiler: OnceLock::new(),
            fired: AtomicBool::new(false),
        });
        let compiler = Arc::new(Compiler::with_file_system(CompilerConfig::default(), fs.clone()).unwrap());
        let _ = fs.compiler.set(Arc::downgrade(&compiler));

        let source = "import { Component } from \"typecomposer\";\nexport class Card extends Component {\n  template() { return <div />; }\n}\n";
        let result = compiler.analyze_file(&target, source);
        assert!(matches!(result, Err(CompileError::Superseded(ref p)) if p == &target));
        assert!(compiler.tags_for(&target).is_empty());

        // The newer request goes through.
        let analysis = compiler.analyze_file(&target, source).unwrap();
        assert_eq!(analysis.components[0].tag.as_deref(), Some("card-tc2"));
        assert!(analysis.code.contains("TypeComposer.createElement(\"div\", {})"));
    }

    #[test]
    fn test_analyze_returns_source_when_superseded() {
        let target = PathBuf::from("src/Card.tsx");
        let fs = Arc::new(InterruptingFs {
            inner: MemoryFileSystem::new(),
            target: target.clone(),
            compiler: OnceLock::new(),
            fired: AtomicBool::new(false),
        });
        let compiler = Arc::new(Compiler::with_file_system(CompilerConfig::default(), fs.clone()).unwrap());
        let _ = fs.compiler.set(Arc::downgrade(&compiler));

        let source = "import { Component } from \"typecomposer\";\nexport class Card extends Component {\n  template() { return <div />; }\n}\n";
        assert_eq!(compiler.analyze(&target, source), source);
    }

    #[test]
    fn test_watch_event_names() {
        assert_eq!("created".parse::<WatchEvent>(), Ok(WatchEvent::Created));
        assert_eq!("update".parse::<WatchEvent>(), Ok(WatchEvent::Updated));
        assert_eq!("deleted".parse::<WatchEvent>(), Ok(WatchEvent::Deleted));
        assert!("renamed".parse::<WatchEvent>().is_err());
    }
}
