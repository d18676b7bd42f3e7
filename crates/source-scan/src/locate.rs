use regex::Regex;
use tree_sitter::{Node, Parser};

use crate::error::{Result, ScanError};

/// Location of one function in a source file, 1-based inclusive lines.
/// For a decorated function the span starts at its first decorator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Indent (in spaces) of the function body.
    pub body_indent: usize,
}

/// Locate every function in `source` via the syntax tree.
///
/// This is the authoritative locator; a file the grammar cannot parse
/// cleanly is fatal, because guessing spans in broken source could splice a
/// replacement into the wrong place.
pub fn syntax_spans(source: &str) -> Result<Vec<FunctionSpan>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ScanError::ParserInit(e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ScanError::ParseSyntax("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(ScanError::ParseSyntax(
            "source contains syntax errors".to_string(),
        ));
    }

    let mut spans = Vec::new();
    collect_spans(root, source, &mut spans);
    spans.sort_by_key(|span| span.start_line);
    Ok(spans)
}

fn collect_spans(node: Node, source: &str, spans: &mut Vec<FunctionSpan>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_definition" {
            // A decorated function spans from its decorated_definition
            // parent so decorators travel with the body on rewrite.
            let outer = child
                .parent()
                .filter(|p| p.kind() == "decorated_definition")
                .unwrap_or(child);
            if let Some(span) = function_span(child, outer, source) {
                spans.push(span);
            }
        }
        collect_spans(child, source, spans);
    }
}

fn function_span(def: Node, outer: Node, source: &str) -> Option<FunctionSpan> {
    let name_node = def.child_by_field_name("name")?;
    let name = source.get(name_node.byte_range())?.to_string();
    let body_indent = def
        .child_by_field_name("body")
        .map_or_else(|| def.start_position().column + 4, |b| b.start_position().column);

    Some(FunctionSpan {
        name,
        start_line: outer.start_position().row + 1,
        end_line: def.end_position().row + 1,
        body_indent,
    })
}

/// Text-only fallback locator, tolerant of files the grammar rejects.
///
/// Tabs count as four spaces. The body extends through every line indented
/// at least as deep as its first statement; blank lines extend the span but
/// never terminate it.
#[must_use]
pub fn indent_span(source: &str, function: &str) -> Option<FunctionSpan> {
    let def_pattern =
        Regex::new(&format!(r"^\s*def\s+{}\s*\(", regex::escape(function))).ok()?;
    let lines: Vec<String> = source
        .lines()
        .map(|line| line.replace('\t', "    "))
        .collect();

    let start = lines.iter().position(|line| def_pattern.is_match(line))?;
    let mut end = start;
    let mut body_indent: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            end = idx;
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        match body_indent {
            None => {
                body_indent = Some(indent);
                end = idx;
            }
            Some(body) if indent < body => break,
            Some(_) => end = idx,
        }
    }

    Some(FunctionSpan {
        name: function.to_string(),
        start_line: start + 1,
        end_line: end + 1,
        body_indent: body_indent.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = "\
import os

class TestClass:
    @classmethod
    def setup(cls):
        gl.DUT1.send('system-view')

    def test_step_1_vlan(self):
        gl.DUT1.send('vlan 10')

        gl.DUT1.send('quit')

    def teardown(cls):
        pass
";

    #[test]
    fn syntax_spans_cover_decorators() {
        let spans = syntax_spans(SCRIPT).unwrap();
        let setup = spans.iter().find(|s| s.name == "setup").unwrap();
        assert_eq!((setup.start_line, setup.end_line), (4, 6));
        assert_eq!(setup.body_indent, 8);

        let step = spans.iter().find(|s| s.name == "test_step_1_vlan").unwrap();
        assert_eq!((step.start_line, step.end_line), (8, 11));
    }

    #[test]
    fn broken_source_is_fatal_for_syntax_locator() {
        let err = syntax_spans("def broken(:\n    pass\n").unwrap_err();
        assert!(matches!(err, ScanError::ParseSyntax(_)));
    }

    #[test]
    fn indent_span_extends_over_blank_lines() {
        // Trailing blank lines belong to the span, so a replacement swallows
        // them; the next function's def line terminates it.
        let span = indent_span(SCRIPT, "test_step_1_vlan").unwrap();
        assert_eq!((span.start_line, span.end_line), (8, 12));
        assert_eq!(span.body_indent, 8);
    }

    #[test]
    fn indent_span_normalizes_tabs() {
        let source = "def f():\n\tgl.DUT1.send('a')\n\tgl.DUT1.send('b')\nx = 1\n";
        let span = indent_span(source, "f").unwrap();
        assert_eq!((span.start_line, span.end_line), (1, 3));
        assert_eq!(span.body_indent, 4);
    }

    #[test]
    fn indent_span_missing_function_is_none() {
        assert!(indent_span(SCRIPT, "no_such_function").is_none());
    }
}
