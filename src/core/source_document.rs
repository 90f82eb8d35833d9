use std::ops::Range;
use std::path::{Path, PathBuf};

use tree_sitter::{Node, Tree};

use crate::config::ParsingConfig;
use crate::error::{GraftError, Result};
use super::differ::content_hash;
use super::languages::{
    descendants, indent_of_line, line_start, node_text, CSharpParser, MEMBER_HOST_KINDS,
    METHOD_KINDS,
};

/// One direct child of a container (a member, a statement, a using, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxItem {
    pub text: String,
    pub range: Range<usize>,
    /// Leading whitespace of the item's first line
    pub indent: String,
    /// Only whitespace precedes the item on its first line
    pub starts_line: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Type body holding members
    Members,
    /// Method body block holding statements
    Statements,
    /// Top-level statements of a minimal program
    TopLevel,
}

/// Owned snapshot of a container, valid until the next mutation of its document
#[derive(Debug, Clone)]
pub struct ContainerView {
    pub kind: ContainerKind,
    pub range: Range<usize>,
    pub items: Vec<SyntaxItem>,
    /// Text of every statement anywhere below the container
    pub nested: Vec<String>,
    /// Leading calls of expression-statement chains (`a.B()` for `a.B().C();`)
    pub chain_links: Vec<String>,
    /// Byte range between the braces (end of file for top-level containers)
    pub interior: Range<usize>,
    pub child_indent: String,
    pub closing_indent: String,
}

/// A type declaration able to receive members and attributes
#[derive(Debug, Clone)]
pub struct TypeView {
    pub name: String,
    pub range: Range<usize>,
    pub indent: String,
    pub attribute_lists: Vec<SyntaxItem>,
    /// Individual attributes across every attribute list
    pub attributes: Vec<String>,
    pub body: ContainerView,
}

/// Where a group of fragments is inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
    TypeBody { class: Option<String> },
    Method { name: String, class: Option<String> },
    Global,
}

/// A local, field or assignment binding a name to an initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub declared_type: Option<String>,
    pub initializer: Option<String>,
}

/// One parsed C# file plus its mutable text
pub struct SourceDocument {
    path: PathBuf,
    text: String,
    tree: Tree,
    parser: CSharpParser,
    original_hash: String,
}

impl SourceDocument {
    /// Read and parse a file; missing or unparsable files are `Unavailable`
    pub fn load<P: AsRef<Path>>(path: P, config: &ParsingConfig) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GraftError::Unavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_source(path, text, config)
    }

    /// Parse already-read source text
    pub fn from_source<P: AsRef<Path>>(path: P, text: String, config: &ParsingConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if text.len() > config.max_file_size {
            return Err(GraftError::Unavailable {
                path,
                reason: format!("exceeds maximum size of {} bytes", config.max_file_size),
            });
        }

        let mut parser = CSharpParser::new()?;
        let tree = parser.parse(&text)?;

        if config.reject_syntax_errors && tree.root_node().has_error() {
            return Err(GraftError::Unavailable {
                path,
                reason: "source contains syntax errors".to_string(),
            });
        }

        let original_hash = content_hash(&text);
        Ok(Self {
            path,
            text,
            tree,
            parser,
            original_hash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.root().has_error()
    }

    /// Whether the text differs from what was loaded
    pub fn is_modified(&self) -> bool {
        content_hash(&self.text) != self.original_hash
    }

    /// Replace the whole text and reparse from scratch
    pub fn replace_root(&mut self, text: String) -> Result<()> {
        self.tree = self.parser.parse(&text)?;
        self.text = text;
        Ok(())
    }

    /// Replace `range` with `replacement` and incrementally reparse
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) -> Result<()> {
        if range.start > range.end || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(GraftError::Parser(format!(
                "Invalid splice range {:?} in {}",
                range,
                self.path.display()
            )));
        }

        let mut new_text = String::with_capacity(self.text.len() + replacement.len());
        new_text.push_str(&self.text[..range.start]);
        new_text.push_str(replacement);
        new_text.push_str(&self.text[range.end..]);

        let tree = self.parser.reparse_insertion(
            &mut self.tree,
            &self.text,
            &new_text,
            range.start,
            range.len(),
            replacement.len(),
        )?;

        self.tree = tree;
        self.text = new_text;
        Ok(())
    }

    // Semantic query surface

    /// Does a class, struct, record, interface or enum with this name exist
    pub fn type_exists(&self, name: &str) -> bool {
        descendants(self.root()).into_iter().any(|node| {
            (MEMBER_HOST_KINDS.contains(&node.kind()) || node.kind() == "enum_declaration")
                && self.name_of(node).as_deref() == Some(name)
        })
    }

    /// Is `method` invoked on `type_name`, either statically or through a
    /// local, field or parameter declared with that type
    pub fn invocation_exists(&self, type_name: &str, method: &str) -> bool {
        let typed_names: Vec<String> = self
            .declarations()
            .into_iter()
            .chain(self.all_parameters())
            .filter(|decl| {
                decl.declared_type.as_deref().map(strip_generics) == Some(type_name)
                    || decl.initializer.as_deref().map_or(false, |init| {
                        init.trim_start()
                            .strip_prefix("new")
                            .map_or(false, |rest| strip_generics(rest.trim_start()).starts_with(type_name))
                    })
            })
            .map(|decl| decl.name)
            .collect();

        descendants(self.root()).into_iter().any(|node| {
            if node.kind() != "invocation_expression" {
                return false;
            }
            let Some(function) = node.child_by_field_name("function") else {
                return false;
            };
            if function.kind() != "member_access_expression" {
                return false;
            }
            let (Some(receiver), Some(name)) = (
                function.child_by_field_name("expression"),
                function.child_by_field_name("name"),
            ) else {
                return false;
            };

            let called = strip_generics(node_text(name, &self.text));
            let receiver: String = node_text(receiver, &self.text)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();

            called == method
                && (receiver == type_name
                    || receiver.ends_with(&format!(".{}", type_name))
                    || typed_names.iter().any(|n| *n == receiver))
        })
    }

    /// Plain textual containment
    pub fn contains_text(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    // Structural views

    /// Every using directive in the file, in order
    pub fn usings(&self) -> Vec<SyntaxItem> {
        descendants(self.root())
            .into_iter()
            .filter(|node| node.kind() == "using_directive")
            .map(|node| self.item(node))
            .collect()
    }

    /// Using directives that are direct children of the compilation unit
    pub fn top_level_usings(&self) -> Vec<SyntaxItem> {
        let root = self.root();
        let mut cursor = root.walk();
        let usings: Vec<SyntaxItem> = root
            .children(&mut cursor)
            .filter(|node| node.kind() == "using_directive")
            .map(|node| self.item(node))
            .collect();
        usings
    }

    pub fn container(&self, target: &ContainerRef) -> Option<ContainerView> {
        match target {
            ContainerRef::TypeBody { class } => self.find_type(class.as_deref()).map(|t| t.body),
            ContainerRef::Method { name, class } => self.method_body(name, class.as_deref()),
            ContainerRef::Global => Some(self.global_statements()),
        }
    }

    /// Resolve the type a file's properties and attributes attach to.
    ///
    /// Without an explicit name, the type named after the file stem wins,
    /// then the first type in the file.
    pub fn find_type(&self, class: Option<&str>) -> Option<TypeView> {
        let types: Vec<Node> = descendants(self.root())
            .into_iter()
            .filter(|node| MEMBER_HOST_KINDS.contains(&node.kind()))
            .collect();

        let stem = self.path.file_stem().and_then(|s| s.to_str());
        let chosen = match class {
            Some(name) => types.iter().find(|node| self.name_of(**node).as_deref() == Some(name)),
            None => types
                .iter()
                .find(|node| stem.is_some() && self.name_of(**node).as_deref() == stem)
                .or_else(|| types.first()),
        }?;

        self.type_view(*chosen)
    }

    /// Body of the named method, constructor or local function
    pub fn method_body(&self, name: &str, class: Option<&str>) -> Option<ContainerView> {
        let method = self.find_method(name, class)?;
        let body = method
            .child_by_field_name("body")
            .filter(|body| body.kind() == "block")?;

        Some(self.block_view(body, ContainerKind::Statements))
    }

    /// Parameters of the named method as declarations (type, name)
    pub fn method_parameters(&self, name: &str, class: Option<&str>) -> Vec<Declaration> {
        self.find_method(name, class)
            .and_then(|method| method.child_by_field_name("parameters"))
            .map(|list| self.parameters_in(list))
            .unwrap_or_default()
    }

    /// Top-level statements of the compilation unit
    pub fn global_statements(&self) -> ContainerView {
        let root = self.root();
        let mut cursor = root.walk();
        let globals: Vec<Node> = root
            .children(&mut cursor)
            .filter(|node| node.kind() == "global_statement")
            .collect();

        let items: Vec<SyntaxItem> = globals.iter().map(|node| self.item(*node)).collect();
        let nested = globals
            .iter()
            .flat_map(|node| self.statements_below(*node))
            .collect();
        let chain_links = globals
            .iter()
            .filter_map(|node| node.named_child(0))
            .flat_map(|statement| self.chain_links(statement))
            .collect();
        let end = self.text.len();

        ContainerView {
            kind: ContainerKind::TopLevel,
            range: 0..end,
            child_indent: items.first().map(|i| i.indent.clone()).unwrap_or_default(),
            items,
            nested,
            chain_links,
            interior: end..end,
            closing_indent: String::new(),
        }
    }

    /// Locals, fields and simple assignments in document order
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut found = Vec::new();

        for node in descendants(self.root()) {
            match node.kind() {
                "variable_declarator" => {
                    let text = node_text(node, &self.text);
                    let (left, initializer) = match text.split_once('=') {
                        Some((left, right)) => (left, Some(right.trim().to_string())),
                        None => (text, None),
                    };
                    let name = node
                        .child_by_field_name("name")
                        .map(|n| node_text(n, &self.text).to_string())
                        .unwrap_or_else(|| left.trim().to_string());
                    let declared_type = node
                        .parent()
                        .filter(|p| p.kind() == "variable_declaration")
                        .and_then(|p| p.child_by_field_name("type"))
                        .map(|t| node_text(t, &self.text).to_string())
                        .filter(|t| t != "var");

                    found.push(Declaration { name, declared_type, initializer });
                }
                "assignment_expression" => {
                    if let (Some(left), Some(right)) =
                        (node.child_by_field_name("left"), node.child_by_field_name("right"))
                    {
                        if left.kind() == "identifier" {
                            found.push(Declaration {
                                name: node_text(left, &self.text).to_string(),
                                declared_type: None,
                                initializer: Some(node_text(right, &self.text).to_string()),
                            });
                        }
                    }
                }
                "property_declaration" => {
                    if let (Some(name), Some(ty)) =
                        (node.child_by_field_name("name"), node.child_by_field_name("type"))
                    {
                        found.push(Declaration {
                            name: node_text(name, &self.text).to_string(),
                            declared_type: Some(node_text(ty, &self.text).to_string()),
                            initializer: None,
                        });
                    }
                }
                _ => {}
            }
        }

        found
    }

    // Private helpers

    fn all_parameters(&self) -> Vec<Declaration> {
        descendants(self.root())
            .into_iter()
            .filter(|node| node.kind() == "parameter_list")
            .flat_map(|list| self.parameters_in(list))
            .collect()
    }

    fn parameters_in(&self, list: Node) -> Vec<Declaration> {
        let mut cursor = list.walk();
        let params: Vec<Declaration> = list
            .named_children(&mut cursor)
            .filter(|node| node.kind() == "parameter")
            .filter_map(|param| {
                let name = param.child_by_field_name("name")?;
                Some(Declaration {
                    name: node_text(name, &self.text).to_string(),
                    declared_type: param
                        .child_by_field_name("type")
                        .map(|t| node_text(t, &self.text).to_string()),
                    initializer: None,
                })
            })
            .collect();
        params
    }

    fn find_method(&self, name: &str, class: Option<&str>) -> Option<Node<'_>> {
        let scope = match class {
            Some(class) => descendants(self.root())
                .into_iter()
                .find(|node| {
                    MEMBER_HOST_KINDS.contains(&node.kind())
                        && self.name_of(*node).as_deref() == Some(class)
                })?,
            None => self.root(),
        };

        descendants(scope).into_iter().find(|node| {
            METHOD_KINDS.contains(&node.kind()) && self.name_of(*node).as_deref() == Some(name)
        })
    }

    fn type_view(&self, node: Node) -> Option<TypeView> {
        let name = self.name_of(node)?;
        let body = node.child_by_field_name("body").or_else(|| {
            let mut cursor = node.walk();
            let list = node
                .children(&mut cursor)
                .find(|child| child.kind() == "declaration_list");
            list
        })?;

        let mut cursor = node.walk();
        let attribute_lists: Vec<Node> = node
            .children(&mut cursor)
            .filter(|child| child.kind() == "attribute_list")
            .collect();

        let attributes = attribute_lists
            .iter()
            .flat_map(|list| {
                let mut cursor = list.walk();
                let attrs: Vec<String> = list
                    .named_children(&mut cursor)
                    .filter(|child| child.kind() == "attribute")
                    .map(|child| node_text(child, &self.text).to_string())
                    .collect();
                attrs
            })
            .collect();

        Some(TypeView {
            name,
            range: node.byte_range(),
            indent: indent_of_line(&self.text, node.start_byte()),
            attribute_lists: attribute_lists.iter().map(|list| self.item(*list)).collect(),
            attributes,
            body: self.block_view(body, ContainerKind::Members),
        })
    }

    fn block_view(&self, block: Node, kind: ContainerKind) -> ContainerView {
        let mut cursor = block.walk();
        let children: Vec<Node> = block
            .named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect();

        let items: Vec<SyntaxItem> = children.iter().map(|child| self.item(*child)).collect();
        let (nested, chain_links) = match kind {
            ContainerKind::Members => (Vec::new(), Vec::new()),
            _ => (
                self.statements_below(block),
                descendants(block)
                    .into_iter()
                    .flat_map(|statement| self.chain_links(statement))
                    .collect(),
            ),
        };

        let closing_indent = indent_of_line(&self.text, block.start_byte());
        let child_indent = items
            .iter()
            .find(|item| item.starts_line)
            .map(|item| item.indent.clone())
            .unwrap_or_else(|| format!("{}    ", closing_indent));

        let range = block.byte_range();
        let open = self.text[range.clone()].find('{').map(|i| range.start + i + 1);
        let close = self.text[range.clone()].rfind('}').map(|i| range.start + i);
        let interior = match (open, close) {
            (Some(open), Some(close)) if open <= close => open..close,
            _ => range.end..range.end,
        };

        ContainerView {
            kind,
            range,
            items,
            nested,
            chain_links,
            interior,
            child_indent,
            closing_indent,
        }
    }

    fn statements_below(&self, node: Node) -> Vec<String> {
        descendants(node)
            .into_iter()
            .filter(|n| n.kind().ends_with("_statement") && n.kind() != "global_statement")
            .map(|n| node_text(n, &self.text).to_string())
            .collect()
    }

    /// Every call along an expression statement's chain, outermost first
    fn chain_links(&self, statement: Node) -> Vec<String> {
        if statement.kind() != "expression_statement" {
            return Vec::new();
        }

        let mut links = Vec::new();
        let mut current = statement.named_child(0);
        while let Some(node) = current {
            current = match node.kind() {
                "invocation_expression" => {
                    links.push(node_text(node, &self.text).to_string());
                    node.child_by_field_name("function")
                }
                "member_access_expression" => node.child_by_field_name("expression"),
                _ => None,
            };
        }
        links
    }

    fn item(&self, node: Node) -> SyntaxItem {
        let start = node.start_byte();
        let line = line_start(&self.text, start);
        SyntaxItem {
            text: node_text(node, &self.text).to_string(),
            range: node.byte_range(),
            indent: indent_of_line(&self.text, start),
            starts_line: self.text[line..start].chars().all(char::is_whitespace),
        }
    }

    fn name_of(&self, node: Node) -> Option<String> {
        node.child_by_field_name("name")
            .map(|name| node_text(name, &self.text).to_string())
    }
}

fn strip_generics(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}
