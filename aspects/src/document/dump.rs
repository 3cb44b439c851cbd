use std::fmt::Write;

use super::NodeRef;

/// Keys at least this long push a map onto several lines.
const SHORT_KEY: usize = 16;

/// Whether a collection reads best on one line: every child is a scalar and,
/// for maps, every key is short. Scalars and empty collections are inline.
pub(crate) fn is_inline(node: NodeRef<'_>) -> bool {
    if node.is_array() {
        return node.items().all(NodeRef::is_scalar);
    }
    if node.is_map() {
        return node
            .entries()
            .all(|(key, value)| key.len() < SHORT_KEY && value.is_scalar());
    }
    true
}

pub(super) fn dump(node: NodeRef<'_>) -> String {
    let mut out = String::new();
    write_node(&mut out, node, 0);
    out
}

fn write_scalar(out: &mut String, node: NodeRef<'_>) {
    if let Some(value) = node.as_int() {
        let _ = write!(out, "{value}");
    } else if let Some(value) = node.as_float() {
        let _ = write!(out, "{value:?}");
    } else if let Some(value) = node.as_str() {
        let _ = write!(out, "{value:?}");
    } else {
        out.push('~');
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_node(out: &mut String, node: NodeRef<'_>, depth: usize) {
    if node.is_scalar() {
        write_scalar(out, node);
        return;
    }

    let (open, close) = if node.is_array() { ('[', ']') } else { ('{', '}') };
    out.push(open);

    if is_inline(node) {
        if node.is_array() {
            for (i, item) in node.items().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_scalar(out, item);
            }
        } else {
            for (i, (key, value)) in node.entries().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_scalar(out, value);
            }
        }
        out.push(close);
        return;
    }

    out.push('\n');
    if node.is_array() {
        for item in node.items() {
            indent(out, depth + 1);
            write_node(out, item, depth + 1);
            out.push('\n');
        }
    } else {
        for (key, value) in node.entries() {
            indent(out, depth + 1);
            out.push_str(key);
            out.push_str(": ");
            write_node(out, value, depth + 1);
            out.push('\n');
        }
    }
    indent(out, depth);
    out.push(close);
}

#[cfg(test)]
mod tests {
    use crate::document::Document;

    #[test]
    fn scalar_collections_stay_inline() {
        let mut doc = Document::new();
        let mut root = doc.root_mut();
        root.entry("hp").set_int(10);
        root.entry("name").set_str("Ann");
        assert_eq!(doc.root().dump(), r#"{hp: 10, name: "Ann"}"#);
    }

    #[test]
    fn nested_collections_break_lines() {
        let mut doc = Document::new();
        let mut root = doc.root_mut();
        root.entry("pos").push().set_float(1.0);
        root.entry("pos").push().set_float(2.5);
        root.entry("tag").set_empty();
        assert_eq!(doc.root().dump(), "{\n  pos: [1.0, 2.5]\n  tag: ~\n}");
    }

    #[test]
    fn long_keys_break_lines() {
        let mut doc = Document::new();
        doc.root_mut().entry("a_rather_long_key_name").set_int(1);
        assert_eq!(doc.root().dump(), "{\n  a_rather_long_key_name: 1\n}");
    }
}
