//! Span-based source rewriting.
//!
//! Passes never mutate the AST. They collect [`Edit`]s against the text the
//! AST was parsed from and render a new text. Regions without edits are
//! copied byte-for-byte.
//!
//! Edits nest: a `Wrap` renders every edit that lies entirely inside its span
//! between its prefix and suffix. A `Replace` swallows the edits inside it.
//! An edit that starts inside an earlier edit but ends outside it is dropped.

use oxc_span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    Replace(String),
    Wrap { prefix: String, suffix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub kind: EditKind,
}

impl Edit {
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Edit {
            start: span.start,
            end: span.end,
            kind: EditKind::Replace(text.into()),
        }
    }

    pub fn wrap(span: Span, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Edit {
            start: span.start,
            end: span.end,
            kind: EditKind::Wrap {
                prefix: prefix.into(),
                suffix: suffix.into(),
            },
        }
    }

    pub fn insert(at: u32, text: impl Into<String>) -> Self {
        Edit {
            start: at,
            end: at,
            kind: EditKind::Replace(text.into()),
        }
    }

    fn contains(&self, other: &Edit) -> bool {
        other.start >= self.start && other.end <= self.end && other != self
    }
}

/// Render the whole of `source` with `edits` applied.
pub fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    sort_edits(&mut edits);
    render(source, 0, source.len() as u32, &edits)
}

/// Render the `span` slice of `source` with the edits that fall inside it.
pub fn apply_within(source: &str, span: Span, edits: &[Edit]) -> String {
    let mut inner: Vec<Edit> = edits
        .iter()
        .filter(|e| e.start >= span.start && e.end <= span.end)
        .cloned()
        .collect();
    sort_edits(&mut inner);
    render(source, span.start, span.end, &inner)
}

fn sort_edits(edits: &mut [Edit]) {
    // Outer edits first when two start at the same offset; inserts before both.
    edits.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut i = 0;
    while i < edits.len() {
        let mut j = i + 1;
        while j < edits.len() && edits[j].start == edits[i].start {
            j += 1;
        }
        // Zero-width inserts at an offset go before edits that cover it.
        edits[i..j].sort_by_key(|e| if e.start == e.end { 0 } else { 1 });
        i = j;
    }
}

fn render(source: &str, start: u32, end: u32, edits: &[Edit]) -> String {
    let mut out = String::with_capacity((end - start) as usize);
    let mut pos = start;
    let mut i = 0;

    while i < edits.len() {
        let edit = &edits[i];
        if edit.start < pos || edit.end > end {
            i += 1;
            continue;
        }
        out.push_str(slice(source, pos, edit.start));

        let mut j = i + 1;
        while j < edits.len() && edit.contains(&edits[j]) && edit.start != edit.end {
            j += 1;
        }

        match &edit.kind {
            EditKind::Replace(text) => out.push_str(text),
            EditKind::Wrap { prefix, suffix } => {
                out.push_str(prefix);
                out.push_str(&render(source, edit.start, edit.end, &edits[i + 1..j]));
                out.push_str(suffix);
            }
        }

        pos = edit.end;
        i = j;
    }

    out.push_str(slice(source, pos, end));
    out
}

fn slice(source: &str, start: u32, end: u32) -> &str {
    source.get(start as usize..end as usize).unwrap_or("")
}

/// Source text covered by `span`.
pub fn text_of(source: &str, span: Span) -> &str {
    slice(source, span.start, span.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacements_apply_in_order() {
        let src = "a + b + c";
        let out = apply(
            src,
            vec![Edit::replace(Span::new(8, 9), "z"), Edit::replace(Span::new(0, 1), "x")],
        );
        assert_eq!(out, "x + b + z");
    }

    #[test]
    fn test_wrap_renders_nested_edits() {
        let src = "a ? b : c";
        let out = apply(
            src,
            vec![
                Edit::wrap(Span::new(0, 9), "f((", "))"),
                Edit::replace(Span::new(0, 1), "k.put(a)"),
            ],
        );
        assert_eq!(out, "f((k.put(a) ? b : c))");
    }

    #[test]
    fn test_replace_swallows_inner_edits() {
        let src = "<div>{a}</div>";
        let out = apply(
            src,
            vec![
                Edit::replace(Span::new(0, 14), "h(\"div\")"),
                Edit::replace(Span::new(6, 7), "k.put(a)"),
            ],
        );
        assert_eq!(out, "h(\"div\")");
    }

    #[test]
    fn test_overlapping_edit_is_dropped() {
        let src = "abcdef";
        let out = apply(
            src,
            vec![Edit::replace(Span::new(0, 3), "X"), Edit::replace(Span::new(2, 5), "Y")],
        );
        assert_eq!(out, "Xdef");
    }

    #[test]
    fn test_insert_at_wrap_start_goes_outside() {
        let src = "value";
        let out = apply(
            src,
            vec![Edit::wrap(Span::new(0, 5), "(", ")"), Edit::insert(0, "x = ")],
        );
        assert_eq!(out, "x = (value)");
    }

    #[test]
    fn test_apply_within_renders_slice_only() {
        let src = "foo(a.b, c)";
        let edits = vec![Edit::replace(Span::new(4, 7), "K.put(a.b)"), Edit::replace(Span::new(9, 10), "d")];
        assert_eq!(apply_within(src, Span::new(4, 7), &edits), "K.put(a.b)");
        assert_eq!(apply_within(src, Span::new(0, 11), &edits), "foo(K.put(a.b), d)");
    }
}
