//! Writes trees back out as cfgx text.
//!
//! The output is one `dotted.path = value` line per leaf, in traversal
//! order, so `ConfigTree::parse(render(&tree))` yields a tree with the same
//! leaves in the same order.  Empty branches have no textual form and are
//! dropped.

use std::fmt::Write as _;

use crate::domain::{ConfigTree, KeyPath, Value};
use crate::grammar::cfgx::is_bare_char;

/// Renders every leaf of `tree` as a cfgx assignment line.
pub fn render(tree: &ConfigTree) -> String {
    let mut out = String::new();
    for (path, value) in tree.leaves() {
        out.push_str(&render_path(&path));
        out.push_str(" = ");
        out.push_str(&render_value(value));
        out.push('\n');
    }
    out
}

fn render_path(path: &KeyPath) -> String {
    path.segments()
        .iter()
        .map(|s| render_segment(s))
        .collect::<Vec<_>>()
        .join(".")
}

/// Renders one key segment, quoting it unless it is made of bare characters
/// only.
pub fn render_segment(segment: &str) -> String {
    if !segment.is_empty() && segment.chars().all(is_bare_char) {
        segment.to_string()
    } else {
        quote(segment)
    }
}

/// Renders a scalar in the form the cfgx grammar reads back to the same
/// value.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Str(s) => quote(s),
        Value::Int(i) => i.to_string(),
        // Text keeps a NaN's sign but not its payload.
        Value::Float(f) if f.is_nan() => {
            if f.is_sign_negative() { "-nan" } else { "nan" }.to_string()
        }
        Value::Float(f) if f.is_infinite() => {
            if *f > 0.0 { "inf" } else { "-inf" }.to_string()
        }
        // Debug always keeps a fractional part or an exponent.
        Value::Float(f) => format!("{f:?}"),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_one_line_per_leaf() {
        let mut tree = ConfigTree::new("t");
        tree.insert("server.port", 8080).unwrap();
        tree.insert("server.name", "edge \"01\"").unwrap();
        tree.insert("debug", false).unwrap();
        tree.insert("ratio", 0.5).unwrap();
        tree.insert("none", Value::Null).unwrap();

        let text = render(&tree);

        assert_eq!(
            text,
            "server.port = 8080\n\
             server.name = \"edge \\\"01\\\"\"\n\
             debug = false\n\
             ratio = 0.5\n\
             none = null\n"
        );
    }

    #[test]
    fn test_segments_with_dots_are_quoted() {
        assert_eq!(render_segment("plain_key-1"), "plain_key-1");
        assert_eq!(render_segment("db.internal"), "\"db.internal\"");
        assert_eq!(render_segment("with space"), "\"with space\"");
    }

    #[test]
    fn test_float_rendering_keeps_float_kind() {
        assert_eq!(render_value(&Value::Float(1.0)), "1.0");
        assert_eq!(render_value(&Value::Float(f64::NAN)), "nan");
        assert_eq!(render_value(&Value::Float(f64::NEG_INFINITY)), "-inf");
    }

    #[test]
    fn test_negative_nan_keeps_its_sign_through_text() {
        // Arrange
        let mut tree = ConfigTree::new("t");
        tree.insert("down", -f64::NAN).unwrap();
        tree.insert("up", f64::NAN).unwrap();
        tree.insert("zero", -0.0).unwrap();

        // Act
        let text = render(&tree);
        let reparsed = ConfigTree::parse("t", &text).unwrap();

        // Assert
        assert_eq!(text, "down = -nan\nup = nan\nzero = -0.0\n");
        assert!(reparsed.same_content(&tree));
    }

    #[test]
    fn test_control_characters_are_escaped() {
        assert_eq!(render_value(&Value::from("a\nb\u{1}")), "\"a\\nb\\u{1}\"");
    }

    #[test]
    fn test_rendered_text_parses_back_to_same_leaves() {
        // Arrange
        let mut tree = ConfigTree::new("t");
        tree.insert(KeyPath::from_segments(["hosts", "db.internal"]).unwrap(), "10.0.0.5").unwrap();
        tree.insert("limits.burst", -3).unwrap();
        tree.insert("limits.scale", 1e-7).unwrap();
        tree.insert("tab", "a\tb").unwrap();

        // Act
        let reparsed = ConfigTree::parse("t", &render(&tree)).unwrap();

        // Assert
        assert!(reparsed.same_content(&tree));
    }
}
