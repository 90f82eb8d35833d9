use tree_sitter::{InputEdit, Node, Parser, Point, Tree};

use crate::error::{GraftError, Result};

/// Node kinds that can host members, properties and attributes
pub const MEMBER_HOST_KINDS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "record_declaration",
    "interface_declaration",
];

/// Node kinds whose `body` block can receive statement fragments
pub const METHOD_KINDS: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "local_function_statement",
];

/// C#-specific parser using Tree-sitter
pub struct CSharpParser {
    parser: Parser,
}

impl CSharpParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
            .map_err(|e| GraftError::Parser(format!("Failed to set C# language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Parse a full source text from scratch
    pub fn parse(&mut self, content: &str) -> Result<Tree> {
        self.parser
            .parse(content, None)
            .ok_or_else(|| GraftError::Parser("Failed to parse C# code".to_string()))
    }

    /// Reparse after an insertion of `inserted` bytes at `at`, reusing the old tree.
    ///
    /// `old_content` and `new_content` are the texts before and after the edit.
    pub fn reparse_insertion(
        &mut self,
        tree: &mut Tree,
        old_content: &str,
        new_content: &str,
        at: usize,
        removed: usize,
        inserted: usize,
    ) -> Result<Tree> {
        let edit = InputEdit {
            start_byte: at,
            old_end_byte: at + removed,
            new_end_byte: at + inserted,
            start_position: point_at(old_content, at),
            old_end_position: point_at(old_content, at + removed),
            new_end_position: point_at(new_content, at + inserted),
        };
        tree.edit(&edit);

        self.parser
            .parse(new_content, Some(tree))
            .ok_or_else(|| GraftError::Parser("Failed to reparse C# code".to_string()))
    }
}

/// Row/column (in bytes) of a byte offset
fn point_at(content: &str, byte: usize) -> Point {
    let prefix = &content.as_bytes()[..byte.min(content.len())];
    let row = prefix.iter().filter(|b| **b == b'\n').count();
    let column = match prefix.iter().rposition(|b| *b == b'\n') {
        Some(newline) => prefix.len() - newline - 1,
        None => prefix.len(),
    };
    Point { row, column }
}

/// Extract text content of a node
pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// All nodes below `node` (excluding itself) in document order
pub fn descendants<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let mut found = Vec::new();
    let mut stack = vec![node];

    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        let children: Vec<Node<'tree>> = current.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
        if current.id() != node.id() {
            found.push(current);
        }
    }

    found
}

/// Byte offset of the start of the line containing `byte`
pub fn line_start(source: &str, byte: usize) -> usize {
    source[..byte.min(source.len())]
        .rfind('\n')
        .map(|newline| newline + 1)
        .unwrap_or(0)
}

/// Leading whitespace of the line containing `byte`
pub fn indent_of_line(source: &str, byte: usize) -> String {
    let start = line_start(source, byte);
    source[start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}
