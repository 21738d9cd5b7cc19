//! Rust extractor: top-level functions, structs, enums, and impl blocks
//! with their methods, located through syn's span positions.
//!
//! Item spans include outer attributes, so a doc comment belongs to the
//! extent of the item it documents. Methods hang off their impl block;
//! `meta["qualname"]` carries the `Type::method` form for display and id
//! disambiguation.

use crate::extract::{Extract, ExtractError};
use crate::node::Node;
use syn::spanned::Spanned;

pub struct RustExtractor;

impl Extract for RustExtractor {
    fn extract(&self, path: &str, content: &str) -> Result<Vec<Node>, ExtractError> {
        let file = syn::parse_file(content).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let mut nodes = Vec::new();
        for item in &file.items {
            match item {
                syn::Item::Fn(f) => {
                    let name = f.sig.ident.to_string();
                    let signature = slice(content, f.sig.span());
                    nodes.push(
                        item_node("rs_fn", &name, path, content, item.span())
                            .with_signature(signature),
                    );
                }
                syn::Item::Struct(s) => {
                    nodes.push(item_node(
                        "rs_struct",
                        &s.ident.to_string(),
                        path,
                        content,
                        item.span(),
                    ));
                }
                syn::Item::Enum(e) => {
                    nodes.push(item_node(
                        "rs_enum",
                        &e.ident.to_string(),
                        path,
                        content,
                        item.span(),
                    ));
                }
                syn::Item::Impl(imp) => {
                    let Some(type_name) = self_type_name(&imp.self_ty) else {
                        continue;
                    };
                    let mut impl_node =
                        item_node("rs_impl", &type_name, path, content, item.span());

                    let mut methods = Vec::new();
                    for member in &imp.items {
                        if let syn::ImplItem::Fn(m) = member {
                            let name = m.sig.ident.to_string();
                            let qualname = format!("{type_name}::{name}");
                            let mut method =
                                item_node("rs_method", &name, path, content, m.span())
                                    .with_signature(slice(content, m.sig.span()))
                                    .with_meta("qualname", &qualname);
                            method.parent_id = Some(impl_node.id.clone());
                            impl_node.children_ids.push(method.id.clone());
                            methods.push(method);
                        }
                    }

                    nodes.push(impl_node);
                    nodes.extend(methods);
                }
                _ => {}
            }
        }

        Ok(nodes)
    }
}

fn item_node(
    kind: &str,
    name: &str,
    path: &str,
    content: &str,
    span: proc_macro2::Span,
) -> Node {
    let range = span.byte_range();
    let (start, end) = (range.start.min(content.len()), range.end.min(content.len()));
    Node::new(kind, name, path, span.start().line, span.end().line).with_bytes(start, end)
}

fn slice(content: &str, span: proc_macro2::Span) -> &str {
    let range = span.byte_range();
    content
        .get(range.start..range.end.min(content.len()))
        .unwrap_or("")
}

/// The nominal type an impl block is for; `None` for impls on types with
/// no trailing path segment (tuples, pointers), which are skipped.
fn self_type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        syn::Type::Reference(r) => self_type_name(&r.elem),
        syn::Type::Group(g) => self_type_name(&g.elem),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
/// Adds.
fn add(a: i32, b: i32) -> i32 {
    a + b
}

struct Point {
    x: i32,
    y: i32,
}

impl Point {
    fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    fn norm(&self) -> f64 {
        0.0
    }
}

enum Shape {
    Circle,
    Square,
}
";

    fn extract() -> Vec<Node> {
        RustExtractor.extract("src/geo.rs", SOURCE).unwrap()
    }

    fn find<'a>(nodes: &'a [Node], kind: &str, name: &str) -> &'a Node {
        nodes
            .iter()
            .find(|n| n.kind == kind && n.name == name)
            .unwrap()
    }

    #[test]
    fn function_extent_includes_doc_comment() {
        let nodes = extract();
        let add = find(&nodes, "rs_fn", "add");
        assert_eq!((add.start_line, add.end_line), (1, 4));
        assert!(add.start_byte.is_some());
    }

    #[test]
    fn struct_and_enum_extents() {
        let nodes = extract();
        let point = find(&nodes, "rs_struct", "Point");
        assert_eq!((point.start_line, point.end_line), (6, 9));
        let shape = find(&nodes, "rs_enum", "Shape");
        assert_eq!((shape.start_line, shape.end_line), (21, 24));
    }

    #[test]
    fn methods_hang_off_their_impl() {
        let nodes = extract();
        let imp = find(&nodes, "rs_impl", "Point");
        assert_eq!((imp.start_line, imp.end_line), (11, 19));

        let new = find(&nodes, "rs_method", "new");
        assert_eq!((new.start_line, new.end_line), (12, 14));
        assert_eq!(new.parent_id.as_ref(), Some(&imp.id));
        assert_eq!(new.meta["qualname"], "Point::new");

        let norm = find(&nodes, "rs_method", "norm");
        assert_eq!(imp.children_ids, vec![new.id.clone(), norm.id.clone()]);
    }

    #[test]
    fn method_and_free_function_ids_differ() {
        let source = "fn run() {}\nstruct R;\nimpl R {\n    fn run(&self) {}\n}\n";
        let nodes = RustExtractor.extract("src/r.rs", source).unwrap();
        let free = find(&nodes, "rs_fn", "run");
        let method = find(&nodes, "rs_method", "run");
        assert_ne!(free.id, method.id);
    }

    #[test]
    fn trait_impl_is_named_for_the_type() {
        let source = "struct S;\nimpl Clone for S {\n    fn clone(&self) -> S { S }\n}\n";
        let nodes = RustExtractor.extract("src/s.rs", source).unwrap();
        let imp = find(&nodes, "rs_impl", "S");
        assert_eq!(imp.start_line, 2);
        assert_eq!(find(&nodes, "rs_method", "clone").meta["qualname"], "S::clone");
    }

    #[test]
    fn unparseable_source_is_an_error() {
        let result = RustExtractor.extract("bad.rs", "fn broken( {");
        assert!(matches!(result, Err(ExtractError::Parse(_))));
    }

    #[test]
    fn extents_satisfy_index_invariants() {
        use crate::index::{FileFingerprint, FileIndex};
        let nodes = extract();
        let fingerprint = FileFingerprint::of_content(SOURCE, 0);
        assert!(FileIndex::new("src/geo.rs", fingerprint, nodes).is_ok());
    }
}
