//! Language-specific parsing for patch targets
//!
//! Each language gets its own module wrapping a tree-sitter grammar plus the
//! node helpers the patch engine needs to read that grammar's trees.

mod csharp;

pub use csharp::{
    descendants, indent_of_line, line_start, node_text, CSharpParser, MEMBER_HOST_KINDS,
    METHOD_KINDS,
};
