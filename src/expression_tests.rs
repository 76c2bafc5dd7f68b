//! Dependency capture, condition and loop compilation, end to end through
//! `Compiler::analyze`.

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::config::CompilerConfig;
    use crate::filesystem::MemoryFileSystem;
    use std::path::Path;
    use std::sync::Arc;

    const HEADER: &str = "import { Component, computed, ref } from \"typecomposer\";\n";

    fn analyze(source: &str) -> String {
        let compiler =
            Compiler::with_file_system(CompilerConfig::default(), Arc::new(MemoryFileSystem::new())).unwrap();
        compiler.analyze(Path::new("src/Panel.tsx"), source)
    }

    fn component(fields: &str, markup: &str) -> String {
        format!(
            "{HEADER}export class Panel extends Component {{\n{fields}\n  template() {{\n    return {markup};\n  }}\n}}\n"
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPUTED CAPTURE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_computed_routes_outermost_container_read() {
        let out = analyze(&format!(
            "{HEADER}const count = ref(0);\nconst double = computed(() => count.value * 2);\n"
        ));
        assert!(out.contains("computed((_c__tc_) => _c__tc_.put(count).value * 2)"), "{out}");
    }

    #[test]
    fn test_unused_parameter_is_reused_as_capture() {
        let out = analyze(&format!(
            "{HEADER}const count = ref(0);\nconst next = computed((k) => count.value + 1);\n"
        ));
        assert!(out.contains("computed((k) => k.put(count).value + 1)"), "{out}");
    }

    #[test]
    fn test_same_chain_is_tracked_at_every_read() {
        let out = analyze(&format!(
            "{HEADER}const a = ref(1);\nconst b = computed(() => a.value + a.value);\n"
        ));
        assert_eq!(out.matches("_c__tc_.put(a)").count(), 2, "{out}");
    }

    #[test]
    fn test_parameter_shadowing_container_is_not_a_dependency() {
        let source = format!("{HEADER}const count = ref(0);\nconst f = computed((count) => count + 1);\n");
        assert_eq!(analyze(&source), source);
    }

    #[test]
    fn test_local_shadowing_container_is_not_a_dependency() {
        let source = format!(
            "{HEADER}const count = ref(0);\nconst f = computed(() => {{ const count = 2; return count * 2; }});\n"
        );
        assert_eq!(analyze(&source), source);
    }

    #[test]
    fn test_non_function_argument_is_left_alone() {
        let source = format!("{HEADER}const count = ref(0);\nconst read = () => count.value;\nconst f = computed(read);\n");
        assert_eq!(analyze(&source), source);
    }

    #[test]
    fn test_local_function_named_ref_is_not_reactive() {
        let source = format!(
            "import {{ computed }} from \"typecomposer\";\nfunction ref(v: number) {{ return {{ value: v }}; }}\nconst x = ref(1);\nconst f = computed(() => x.value);\n"
        );
        assert_eq!(analyze(&source), source);
    }

    #[test]
    fn test_computed_from_other_module_is_not_compiled() {
        let source = "import { computed } from \"./local\";\nimport { ref } from \"typecomposer\";\nconst a = ref(1);\nconst f = computed(() => a.value);\n";
        assert_eq!(analyze(source), source);
    }

    #[test]
    fn test_container_held_by_object_binding_is_tracked() {
        let out = analyze(&format!(
            "{HEADER}const s = {{ n: ref(1), label: \"x\" }};\nconst b = computed(() => s.n.value + s.label.length);\n"
        ));
        assert!(out.contains("computed((_c__tc_) => _c__tc_.put(s.n).value + s.label.length)"), "{out}");
        assert!(!out.contains("put(s)"), "{out}");
    }

    #[test]
    fn test_container_on_local_class_instance_is_tracked() {
        let out = analyze(&format!(
            "{HEADER}class Store {{\n  n = ref(1);\n  inner = new Store();\n}}\nconst s: Store = new Store();\nconst t = new Store();\nconst b = computed(() => s.n.value + t.inner.n.value);\n"
        ));
        assert!(
            out.contains("computed((_c__tc_) => _c__tc_.put(s.n).value + _c__tc_.put(t.inner.n).value)"),
            "{out}"
        );
    }

    #[test]
    fn test_fresh_key_avoids_existing_identifiers() {
        let out = analyze(&format!(
            "{HEADER}const _c__tc_ = 1;\nconst a = ref(1);\nconst f = computed(() => a.value + _c__tc_);\n"
        ));
        assert!(out.contains("computed((_c__tc_1_) => _c__tc_1_.put(a).value + _c__tc_)"), "{out}");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CONDITIONS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_reactive_ternary_gets_exactly_one_put() {
        let out = analyze(&format!(
            "{HEADER}const a = ref(true);\nexport class Panel extends Component {{\n  template() {{\n    return <div>{{a ? <x /> : <y />}}</div>;\n  }}\n}}\n"
        ));
        assert_eq!(out.matches(".put(a)").count(), 1, "{out}");
        assert!(out.contains("computed((_c__tc_) => (_c__tc_.put(a) ? TypeComposer.createElement(\"x\", {}) : TypeComposer.createElement(\"y\", {})))"), "{out}");
    }

    #[test]
    fn test_logical_and_keeps_its_operator() {
        let out = analyze(&component("  count = ref(0);", "<div>{this.count.value > 0 && <span>many</span>}</div>"));
        assert!(
            out.contains("_c__tc_.put(this.count).value > 0 && TypeComposer.createElement(\"span\", {}, \"many\")"),
            "{out}"
        );
    }

    #[test]
    fn test_non_reactive_condition_is_not_wrapped() {
        let out = analyze(&format!(
            "{HEADER}const flag = true;\nexport class Panel extends Component {{\n  template() {{\n    return <div>{{flag ? <x /> : <y />}}</div>;\n  }}\n}}\n"
        ));
        assert!(!out.contains("computed("), "{out}");
        assert!(out.contains("flag ? TypeComposer.createElement(\"x\", {}) : TypeComposer.createElement(\"y\", {})"));
    }

    #[test]
    fn test_runtime_import_added_once() {
        let source = "import { Component, ref } from \"typecomposer\";\nconst a = ref(true);\nexport class Panel extends Component {\n  template() {\n    return <div>{a ? <x /> : <y />}{a && <z />}</div>;\n  }\n}\n";
        let out = analyze(source);
        assert_eq!(out.matches("import { computed } from \"typecomposer\";").count(), 1, "{out}");
    }

    #[test]
    fn test_event_handler_condition_is_not_wrapped() {
        let out = analyze(&component(
            "  open = ref(false);",
            "<button onClick={this.open.value ? close : show}>go</button>",
        ));
        assert!(!out.contains("computed("), "{out}");
        assert!(out.contains("onClick: this.open.value ? close : show"), "{out}");
    }

    #[test]
    fn test_key_inside_condition_goes_through_cache() {
        let out = analyze(&component(
            "  open = ref(false);",
            "<div>{this.open.value ? <p key=\"on\">on</p> : <p key=\"off\">off</p>}</div>",
        ));
        assert!(out.contains("key: _c__tc_.cache(\"on\")"), "{out}");
        assert!(out.contains("key: _c__tc_.cache(\"off\")"), "{out}");
    }

    #[test]
    fn test_nested_loop_in_condition_gets_its_own_key() {
        let out = analyze(&component(
            "  show = ref(true);\n  items = ref([1, 2]);",
            "<div>{this.show.value ? <ul>{this.items.map((n) => <li>{n}</li>)}</ul> : <p>none</p>}</div>",
        ));
        assert_eq!(out.matches(".put(this.show)").count(), 1, "{out}");
        assert!(out.contains("_c__tc_.put(this.show)"), "{out}");
        assert!(out.contains("_c__tc_1_.put(this.items).map((n) =>"), "{out}");
        assert!(!out.contains("_c__tc_.put(this.items)"), "{out}");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // LOOPS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_loop_key_goes_through_cache_and_item_is_untouched() {
        let out = analyze(&format!(
            "{HEADER}const items = ref([{{ id: 1, label: \"a\" }}]);\nexport class Panel extends Component {{\n  template() {{\n    return <ul>{{items.map((i) => <li key={{i.id}}>{{i.label}}</li>)}}</ul>;\n  }}\n}}\n"
        ));
        assert!(out.contains("computed((_c__tc_) => (_c__tc_.put(items).map((i) =>"), "{out}");
        assert!(out.contains("key: _c__tc_.cache(i.id)"), "{out}");
        assert!(out.contains("}, i.label)"), "{out}");
        assert!(!out.contains("put(i)"), "{out}");
        assert!(!out.contains("put(i."), "{out}");
    }

    #[test]
    fn test_loop_tracks_only_first_reference() {
        let out = analyze(&component(
            "  items = ref([1, 2]);\n  selected = ref(1);",
            "<ul>{this.items.map((n) => <li title={this.selected.value}>{n}</li>)}</ul>",
        ));
        assert_eq!(out.matches(".put(this.items)").count(), 1, "{out}");
        assert!(!out.contains("put(this.selected)"), "{out}");
    }

    #[test]
    fn test_chained_map_is_not_wrapped() {
        let out = analyze(&component(
            "  items = ref([1, 2, 3]);",
            "<ul>{this.items.map((n) => <li>{n}</li>).slice(0, 2)}</ul>",
        ));
        assert!(!out.contains("computed("), "{out}");
    }

    #[test]
    fn test_map_over_plain_array_is_not_wrapped() {
        let out = analyze(&component("", "<ul>{[1, 2].map((n) => <li key={n}>{n}</li>)}</ul>"));
        assert!(!out.contains("computed("), "{out}");
        assert!(out.contains("key: n"), "{out}");
    }

    #[test]
    fn test_loop_outside_markup_is_not_wrapped() {
        let source = format!("{HEADER}const items = ref([1]);\nconst doubled = items.map((n) => n * 2);\n");
        assert_eq!(analyze(&source), source);
    }
}
