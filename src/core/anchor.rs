//! Insertion point resolution and the exact text spliced at that point.

use std::ops::Range;

use tree_sitter::Node;

use super::change_set::LeadingTrivia;
use super::languages::{descendants, indent_of_line, line_start, node_text};
use super::normalize::{attribute_text, normalize_compact, using_name};
use super::source_document::{ContainerKind, ContainerView, SourceDocument, SyntaxItem, TypeView};

/// Where a sibling fragment goes relative to the container's items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Before(usize),
    After(usize),
    End,
}

/// A text replacement; insertions use an empty range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub range: Range<usize>,
    pub text: String,
}

impl Placement {
    fn insert(at: usize, text: String) -> Self {
        Self { range: at..at, text }
    }
}

/// End of the call chain a member-access fragment extends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTarget {
    pub end: usize,
    pub text: String,
    pub indent: String,
    /// Calls and member names along the chain spine, outermost first:
    /// `a.B(x => x.C()).D()` yields `D()`, `B(x => x.C())`. Calls inside
    /// arguments are not links.
    pub links: Vec<String>,
}

/// Pick the first matching anchor, trying `insert_before` then `insert_after`,
/// each in list order. No match means append at the end.
pub fn resolve_anchor(container: &ContainerView, insert_before: &[String], insert_after: &[String]) -> Anchor {
    let find = |anchor: &String| {
        let wanted = normalize_compact(anchor);
        container
            .items
            .iter()
            .position(|item| normalize_compact(&item.text) == wanted)
    };

    if let Some(index) = insert_before.iter().find_map(find) {
        return Anchor::Before(index);
    }
    if let Some(index) = insert_after.iter().find_map(find) {
        return Anchor::After(index);
    }
    Anchor::End
}

/// Text and position for a statement or member placed at `anchor`
pub fn sibling_placement(
    container: &ContainerView,
    anchor: Anchor,
    block: &str,
    trivia: &LeadingTrivia,
    source: &str,
) -> Placement {
    let blank = if trivia.newline { "\n" } else { "" };
    let indent_for = |reference: Option<&SyntaxItem>| match trivia.number_of_spaces {
        Some(spaces) => " ".repeat(spaces),
        None => reference
            .filter(|item| item.starts_line)
            .map(|item| item.indent.clone())
            .unwrap_or_else(|| container.child_indent.clone()),
    };

    let anchor = match anchor {
        Anchor::End if !container.items.is_empty() => Anchor::After(container.items.len() - 1),
        other => other,
    };

    match anchor {
        Anchor::Before(index) => {
            let item = &container.items[index];
            let indent = indent_for(Some(item));
            if item.starts_line {
                let at = item.range.start - item.indent.len();
                Placement::insert(at, format!("{}{}\n", blank, indent_block(block, &indent)))
            } else {
                let text = indent_block(block, &indent);
                Placement::insert(item.range.start, format!("{}\n{}", text.trim_start(), indent))
            }
        }
        Anchor::After(index) => {
            let item = &container.items[index];
            let indent = indent_for(Some(item));
            Placement::insert(item.range.end, format!("\n{}{}", blank, indent_block(block, &indent)))
        }
        Anchor::End => empty_container_placement(container, block, blank, &indent_for(None), source),
    }
}

fn empty_container_placement(
    container: &ContainerView,
    block: &str,
    blank: &str,
    indent: &str,
    source: &str,
) -> Placement {
    let body = indent_block(block, indent);

    if container.kind == ContainerKind::TopLevel {
        let separator = if source.is_empty() || source.ends_with('\n') { "" } else { "\n" };
        return Placement::insert(source.len(), format!("{}{}{}\n", separator, blank, body));
    }

    let interior = container.interior.clone();
    if source[interior.clone()].trim().is_empty() {
        return Placement {
            range: interior,
            text: format!("\n{}{}\n{}", blank, body, container.closing_indent),
        };
    }

    // Only comments inside: keep them and add the fragment before the closing brace.
    let close_line = line_start(source, interior.end);
    if close_line > interior.start && source[close_line..interior.end].trim().is_empty() {
        Placement::insert(close_line, format!("{}{}\n", blank, body))
    } else {
        Placement::insert(interior.end, format!("\n{}{}\n{}", blank, body, container.closing_indent))
    }
}

/// Locate the call chain whose link matches `parent`, within the container
pub fn resolve_chain(doc: &SourceDocument, container: &ContainerView, parent: &str) -> Option<ChainTarget> {
    let wanted = normalize_compact(parent);
    let source = doc.text();

    let start = descendants(doc.root()).into_iter().find(|node| {
        matches!(node.kind(), "invocation_expression" | "member_access_expression")
            && node.start_byte() >= container.range.start
            && node.end_byte() <= container.range.end
            && normalize_compact(node_text(*node, source)) == wanted
    })?;

    let mut current = start;
    while let Some(up) = current.parent() {
        let extends_current = match up.kind() {
            "member_access_expression" => {
                up.child_by_field_name("expression").map(|n| n.id()) == Some(current.id())
            }
            "invocation_expression" => {
                up.child_by_field_name("function").map(|n| n.id()) == Some(current.id())
            }
            _ => false,
        };
        if !extends_current {
            break;
        }
        current = up;
    }

    Some(ChainTarget {
        end: current.end_byte(),
        text: node_text(current, source).to_string(),
        indent: indent_of_line(source, current.start_byte()),
        links: spine_links(current, source),
    })
}

fn spine_links(outermost: Node, source: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut current = Some(outermost);

    while let Some(node) = current {
        current = match node.kind() {
            "invocation_expression" => {
                let access = node
                    .child_by_field_name("function")
                    .filter(|f| f.kind() == "member_access_expression");
                match access.and_then(|a| Some((a.child_by_field_name("name")?, a))) {
                    Some((name, access)) => {
                        links.push(source[name.start_byte()..node.end_byte()].to_string());
                        access.child_by_field_name("expression")
                    }
                    None => None,
                }
            }
            "member_access_expression" => match node.child_by_field_name("name") {
                Some(name) => {
                    links.push(node_text(name, source).to_string());
                    node.child_by_field_name("expression")
                }
                None => None,
            },
            _ => None,
        };
    }

    links
}

/// Append `.block` to the chain, optionally on its own line
pub fn chain_placement(target: &ChainTarget, block: &str, trivia: &LeadingTrivia) -> Placement {
    let call = block.trim().trim_start_matches('.').trim_end_matches(';');
    let text = if trivia.newline {
        let indent = match trivia.number_of_spaces {
            Some(spaces) => " ".repeat(spaces),
            None => format!("{}    ", target.indent),
        };
        format!("\n{}.{}", indent, call)
    } else {
        format!(".{}", call)
    };
    Placement::insert(target.end, text)
}

/// New using directive after the last top-level one, or at the top of the file
pub fn using_placement(top_level: &[SyntaxItem], using: &str) -> Placement {
    let directive = format!("using {};", using_name(using));
    match top_level.last() {
        Some(last) => Placement::insert(last.range.end, format!("\n{}", directive)),
        None => Placement::insert(0, format!("{}\n\n", directive)),
    }
}

/// New attribute list after the type's existing ones, or directly above it
pub fn attribute_placement(ty: &TypeView, attribute: &str) -> Placement {
    let list = format!("[{}]", attribute_text(attribute));
    match ty.attribute_lists.last() {
        Some(last) => Placement::insert(last.range.end, format!("\n{}{}", ty.indent, list)),
        None => Placement::insert(ty.range.start, format!("{}\n{}", list, ty.indent)),
    }
}

/// Indent every line of a fragment, keeping relative indentation of continuation lines
fn indent_block(block: &str, indent: &str) -> String {
    block
        .trim()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let line = if i == 0 { line.trim_start() } else { line.trim_end() };
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn doc(name: &str, source: &str) -> SourceDocument {
        SourceDocument::from_source(name, source.to_string(), &Config::default().parsing).unwrap()
    }

    fn apply(doc: &mut SourceDocument, placement: Placement) {
        doc.splice(placement.range, &placement.text).unwrap();
    }

    const PROGRAM: &str = "var builder = WebApplication.CreateBuilder(args);\nvar app = builder.Build();\napp.MapGet(\"/\", () => \"Hi\");\napp.Run();\n";

    #[test]
    fn test_first_anchor_in_list_order_wins() {
        let doc = doc("Program.cs", PROGRAM);
        let globals = doc.global_statements();

        let anchors = vec!["app.Run()".to_string(), "var app = builder.Build()".to_string()];
        assert_eq!(resolve_anchor(&globals, &anchors, &[]), Anchor::Before(3));

        let missing = vec!["X.Run()".to_string()];
        assert_eq!(resolve_anchor(&globals, &missing, &missing), Anchor::End);
        assert_eq!(resolve_anchor(&globals, &missing, &anchors), Anchor::After(3));
    }

    #[test]
    fn test_insert_before_top_level_statement() {
        let mut doc = doc("Program.cs", PROGRAM);
        let globals = doc.global_statements();
        let placement = sibling_placement(
            &globals,
            Anchor::Before(3),
            "app.UseAuthentication();",
            &LeadingTrivia::default(),
            doc.text(),
        );
        apply(&mut doc, placement);

        assert!(doc.text().ends_with("app.UseAuthentication();\napp.Run();\n"));
        assert!(!doc.has_syntax_errors());
    }

    #[test]
    fn test_insert_after_with_blank_line_and_fallback_append() {
        let mut doc = doc("Program.cs", PROGRAM);
        let globals = doc.global_statements();
        let trivia = LeadingTrivia { newline: true, number_of_spaces: Some(0) };
        let placement = sibling_placement(&globals, Anchor::After(0), "builder.Services.AddAuthorization();", &trivia, doc.text());
        apply(&mut doc, placement);

        assert!(doc.text().starts_with(
            "var builder = WebApplication.CreateBuilder(args);\n\nbuilder.Services.AddAuthorization();\nvar app"
        ));

        let globals = doc.global_statements();
        let placement = sibling_placement(&globals, Anchor::End, "app.Logger.LogInformation(\"done\");", &LeadingTrivia::default(), doc.text());
        apply(&mut doc, placement);
        assert!(doc.text().ends_with("app.Run();\napp.Logger.LogInformation(\"done\");\n"));
    }

    #[test]
    fn test_empty_method_body_gets_indented_statement() {
        let mut doc = doc("Startup.cs", "class Startup\n{\n    void Configure()\n    {\n    }\n}\n");
        let body = doc.method_body("Configure", None).unwrap();
        let placement = sibling_placement(&body, Anchor::End, "app.UseRouting();", &LeadingTrivia::default(), doc.text());
        apply(&mut doc, placement);

        assert_eq!(
            doc.text(),
            "class Startup\n{\n    void Configure()\n    {\n        app.UseRouting();\n    }\n}\n"
        );
    }

    #[test]
    fn test_chain_extends_outermost_call() {
        let source = "class Startup\n{\n    void ConfigureServices(IServiceCollection services)\n    {\n        services.AddAuthentication(\"Bearer\").AddJwtBearer();\n    }\n}\n";
        let mut doc = doc("Startup.cs", source);
        let body = doc.method_body("ConfigureServices", None).unwrap();

        let target = resolve_chain(&doc, &body, "services.AddAuthentication(\"Bearer\")").unwrap();
        assert_eq!(target.text, "services.AddAuthentication(\"Bearer\").AddJwtBearer()");
        assert_eq!(target.links, vec!["AddJwtBearer()", "AddAuthentication(\"Bearer\")"]);

        apply(&mut doc, chain_placement(&target, "EnableTokenAcquisition()", &LeadingTrivia::default()));
        assert!(doc
            .text()
            .contains("services.AddAuthentication(\"Bearer\").AddJwtBearer().EnableTokenAcquisition();"));
        assert!(resolve_chain(&doc, &body, "services.AddMvc()").is_none());
    }

    #[test]
    fn test_chain_links_skip_calls_inside_arguments() {
        let source = "var builder = WebApplication.CreateBuilder(args);\nbuilder.Services.AddAuthentication(o => o.AddScheme());\n";
        let doc = doc("Program.cs", source);
        let globals = doc.global_statements();

        let target = resolve_chain(&doc, &globals, "builder.Services.AddAuthentication(o => o.AddScheme())").unwrap();

        assert_eq!(target.links, vec!["AddAuthentication(o => o.AddScheme())", "Services"]);
    }

    #[test]
    fn test_using_and_attribute_placement() {
        let mut doc = doc("Api.cs", "using System;\n\n[ApiController]\npublic class Api\n{\n}\n");
        let placement = using_placement(&doc.top_level_usings(), "Microsoft.Identity.Web");
        apply(&mut doc, placement);
        let ty = doc.find_type(None).unwrap();
        apply(&mut doc, attribute_placement(&ty, "Authorize"));

        assert_eq!(
            doc.text(),
            "using System;\nusing Microsoft.Identity.Web;\n\n[ApiController]\n[Authorize]\npublic class Api\n{\n}\n"
        );
    }

    #[test]
    fn test_indent_block_keeps_relative_indentation() {
        let block = "services.AddX(o =>\n{\n    o.Y = 1;\n});";
        assert_eq!(
            indent_block(block, "    "),
            "    services.AddX(o =>\n    {\n        o.Y = 1;\n    });"
        );
    }
}
