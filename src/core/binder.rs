//! Placeholder binding: maps the canonical identifiers used in change-sets to
//! the names a project actually declares.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::BindingConfig;
use crate::error::{GraftError, Result};
use super::change_set::{ChangeKind, CodeChange};
use super::normalize::normalize_compact;
use super::source_document::SourceDocument;

/// Known factory call shape bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryShape {
    pub shape: String,
    pub placeholder: String,
}

/// Binding rules built once per run and shared by reference
#[derive(Debug, Clone)]
pub struct BindingRegistry {
    factories: Vec<FactoryShape>,
    parameters: BTreeMap<String, String>,
    identifier_regex: Regex,
}

impl BindingRegistry {
    pub fn new(config: &BindingConfig) -> Result<Self> {
        let factories = config
            .factories
            .iter()
            .map(|f| FactoryShape {
                shape: f.shape.clone(),
                placeholder: f.placeholder.clone(),
            })
            .collect();

        Ok(Self {
            factories,
            parameters: config.parameters.clone(),
            identifier_regex: Regex::new(r"[A-Za-z_][A-Za-z0-9_]*")
                .map_err(|e| GraftError::Config(e.to_string()))?,
        })
    }

    pub fn factories(&self) -> &[FactoryShape] {
        &self.factories
    }

    pub fn parameter_placeholder(&self, parameter_type: &str) -> Option<&str> {
        self.parameters.get(parameter_type).map(String::as_str)
    }
}

/// Placeholder -> actual identifier for one file (or one method within it)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableBindingTable {
    bindings: BTreeMap<String, String>,
}

impl VariableBindingTable {
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.bindings.get(placeholder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copy of this table with `other`'s bindings taking precedence
    pub fn overlaid(&self, other: &VariableBindingTable) -> VariableBindingTable {
        let mut bindings = self.bindings.clone();
        bindings.extend(other.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        VariableBindingTable { bindings }
    }

    fn bind(&mut self, placeholder: &str, actual: &str) {
        self.bindings
            .entry(placeholder.to_string())
            .or_insert_with(|| actual.to_string());
    }
}

/// Discovers bindings and rewrites fragment text
pub struct VariableBinder<'a> {
    registry: &'a BindingRegistry,
}

impl<'a> VariableBinder<'a> {
    pub fn new(registry: &'a BindingRegistry) -> Self {
        Self { registry }
    }

    /// Scan the file's declarations for known factory shapes.
    ///
    /// Shapes are tried in registry order and may themselves mention earlier
    /// placeholders (`builder.Build` finds `cfg.Build()` once `builder` is
    /// bound to `cfg`). The first declaration matching a placeholder wins.
    pub fn bind_file(&self, doc: &SourceDocument) -> VariableBindingTable {
        let declarations = doc.declarations();
        let mut table = VariableBindingTable::default();

        for factory in self.registry.factories() {
            if table.get(&factory.placeholder).is_some() {
                continue;
            }
            let shape = normalize_compact(&self.substitute(&table, &factory.shape));

            let found = declarations.iter().find(|decl| {
                decl.initializer
                    .as_deref()
                    .map_or(false, |init| calls_shape(&normalize_compact(init), &shape))
            });

            if let Some(decl) = found {
                tracing::debug!("Bound {} -> {} via {}", factory.placeholder, decl.name, factory.shape);
                table.bind(&factory.placeholder, &decl.name);
            }
        }

        table
    }

    /// Bind placeholders for the listed parameter types of one method
    pub fn bind_parameters(
        &self,
        doc: &SourceDocument,
        method: &str,
        class: Option<&str>,
        parameter_types: &[String],
    ) -> VariableBindingTable {
        let mut table = VariableBindingTable::default();
        if parameter_types.is_empty() {
            return table;
        }

        let parameters = doc.method_parameters(method, class);
        for parameter_type in parameter_types {
            let Some(placeholder) = self.registry.parameter_placeholder(parameter_type) else {
                tracing::warn!("No placeholder registered for parameter type {}", parameter_type);
                continue;
            };
            let declared = parameters
                .iter()
                .find(|p| p.declared_type.as_deref().map(str::trim) == Some(parameter_type.as_str()));
            if let Some(param) = declared {
                table.bind(placeholder, &param.name);
            }
        }

        table
    }

    /// Replace placeholder identifiers in every text field of a fragment
    pub fn apply(&self, table: &VariableBindingTable, change: &CodeChange) -> CodeChange {
        if table.is_empty() {
            return change.clone();
        }

        let sub = |text: &String| self.substitute(table, text);
        let kind = match &change.kind {
            ChangeKind::Default { insert_before, insert_after } => ChangeKind::Default {
                insert_before: insert_before.iter().map(sub).collect(),
                insert_after: insert_after.iter().map(sub).collect(),
            },
            ChangeKind::MemberAccess { parent } => ChangeKind::MemberAccess { parent: sub(parent) },
        };

        CodeChange {
            block: sub(&change.block),
            check_block: change.check_block.as_ref().map(sub),
            kind,
            leading_trivia: change.leading_trivia.clone(),
            options: change.options.clone(),
        }
    }

    /// Identifier-aware substitution: whole identifiers only, never a member
    /// name after `.` and never inside string or char literals.
    pub fn substitute(&self, table: &VariableBindingTable, text: &str) -> String {
        if table.is_empty() {
            return text.to_string();
        }

        let literals = literal_ranges(text);
        let mut result = String::with_capacity(text.len());
        let mut last = 0;

        for m in self.registry.identifier_regex.find_iter(text) {
            let Some(actual) = table.get(m.as_str()) else {
                continue;
            };
            let preceded_by = text[..m.start()].chars().rev().find(|c| !c.is_whitespace());
            let after_ident = text[..m.start()]
                .chars()
                .next_back()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_' || c == '@');
            let in_literal = literals.iter().any(|r| r.contains(&m.start()));

            if preceded_by == Some('.') || after_ident || in_literal {
                continue;
            }

            result.push_str(&text[last..m.start()]);
            result.push_str(actual);
            last = m.end();
        }

        result.push_str(&text[last..]);
        result
    }
}

/// True when `init` calls `shape` as a complete dotted name
fn calls_shape(init: &str, shape: &str) -> bool {
    if shape.is_empty() {
        return false;
    }
    init.match_indices(shape).any(|(start, _)| {
        let before_ok = init[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'));
        let after_ok = init[start + shape.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
        before_ok && after_ok
    })
}

/// Byte ranges covered by string and char literals
fn literal_ranges(text: &str) -> Vec<std::ops::Range<usize>> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let quote = bytes[i];
        if quote != b'"' && quote != b'\'' {
            i += 1;
            continue;
        }
        let verbatim = quote == b'"' && i > 0 && bytes[i - 1] == b'@';
        let start = i;
        i += 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if !verbatim => i += 2,
                b'"' if verbatim && bytes.get(i + 1) == Some(&b'"') => i += 2,
                c if c == quote => break,
                _ => i += 1,
            }
        }
        let end = (i + 1).min(bytes.len());
        ranges.push(start..end);
        i = end;
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry() -> BindingRegistry {
        BindingRegistry::new(&Config::default().binding).unwrap()
    }

    fn doc(name: &str, source: &str) -> SourceDocument {
        SourceDocument::from_source(name, source.to_string(), &Config::default().parsing).unwrap()
    }

    #[test]
    fn test_binds_renamed_builder_and_chained_factory() {
        let registry = registry();
        let binder = VariableBinder::new(&registry);
        let doc = doc(
            "Program.cs",
            "var cfg = WebApplication.CreateBuilder(args);\nvar host = cfg.Build();\nhost.Run();\n",
        );

        let table = binder.bind_file(&doc);

        assert_eq!(table.get("builder"), Some("cfg"));
        assert_eq!(table.get("app"), Some("host"));
    }

    #[test]
    fn test_unbound_placeholder_passes_through() {
        let registry = registry();
        let binder = VariableBinder::new(&registry);
        let doc = doc("Program.cs", "Console.WriteLine(1);\n");

        let table = binder.bind_file(&doc);
        assert!(table.is_empty());

        let change = CodeChange::new("builder.Services.AddAuthorization()");
        assert_eq!(binder.apply(&table, &change), change);
    }

    #[test]
    fn test_substitution_is_identifier_aware() {
        let registry = registry();
        let binder = VariableBinder::new(&registry);
        let doc = doc("Program.cs", "var cfg = WebApplication.CreateBuilder(args);\n");
        let table = binder.bind_file(&doc);

        assert_eq!(
            binder.substitute(&table, "builder.Services.AddX(builder.Configuration, x.builder, \"builder\", mybuilder)"),
            "cfg.Services.AddX(cfg.Configuration, x.builder, \"builder\", mybuilder)"
        );
    }

    #[test]
    fn test_apply_rewrites_every_text_field() {
        let registry = registry();
        let binder = VariableBinder::new(&registry);
        let doc = doc("Program.cs", "var cfg = WebApplication.CreateBuilder(args);\n");
        let table = binder.bind_file(&doc);

        let change = CodeChange::new("builder.Services.AddAuthorization()")
            .with_check_block("builder.Services.AddAuthorization")
            .insert_before("builder.Build()");
        let bound = binder.apply(&table, &change);

        assert_eq!(bound.block, "cfg.Services.AddAuthorization()");
        assert_eq!(bound.check_block.as_deref(), Some("cfg.Services.AddAuthorization"));
        assert_eq!(
            bound.kind,
            ChangeKind::Default { insert_before: vec!["cfg.Build()".to_string()], insert_after: vec![] }
        );

        let chained = binder.apply(&table, &CodeChange::member_access("builder.Services.AddAuthentication()", "AddJwtBearer()"));
        assert_eq!(
            chained.kind,
            ChangeKind::MemberAccess { parent: "cfg.Services.AddAuthentication()".to_string() }
        );
    }

    #[test]
    fn test_parameter_bindings_overlay_file_bindings() {
        let registry = registry();
        let binder = VariableBinder::new(&registry);
        let doc = doc(
            "Startup.cs",
            "class Startup\n{\n    public void ConfigureServices(IServiceCollection svc)\n    {\n    }\n}\n",
        );

        let params = binder.bind_parameters(&doc, "ConfigureServices", None, &["IServiceCollection".to_string()]);
        let table = binder.bind_file(&doc).overlaid(&params);

        assert_eq!(table.get("services"), Some("svc"));
        assert_eq!(binder.substitute(&table, "services.AddControllers()"), "svc.AddControllers()");
    }

    #[test]
    fn test_calls_shape_requires_whole_name() {
        assert!(calls_shape("WebApplication.CreateBuilder(args)", "WebApplication.CreateBuilder"));
        assert!(!calls_shape("WebApplication.CreateBuilderFast(args)", "WebApplication.CreateBuilder"));
        assert!(!calls_shape("MyWebApplication.CreateBuilder(args)", "WebApplication.CreateBuilder"));
    }
}
