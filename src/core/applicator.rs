use tracing::{debug, warn};

use crate::error::Result;
use super::anchor::{
    attribute_placement, chain_placement, resolve_anchor, resolve_chain, sibling_placement,
    using_placement, Anchor, Placement,
};
use super::binder::{BindingRegistry, VariableBinder, VariableBindingTable};
use super::change_set::{
    ChangeKind, CodeChange, CodeChangeOptions, FileChangeConfig, MethodChanges, GLOBAL_METHOD,
};
use super::existence::{attribute_exists, chained_call_exists, fragment_exists, using_exists};
use super::normalize::{attribute_text, terminated, using_name};
use super::source_document::{ContainerRef, SourceDocument};
use super::summary::ChangeSummary;

/// What patching one file produced
#[derive(Debug, Clone, Default)]
pub struct FilePatchOutcome {
    pub summary: ChangeSummary,
    pub applied: usize,
    pub warnings: Vec<String>,
}

impl FilePatchOutcome {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Applies the fragments of every config targeting one file, in order
pub struct PatchApplicator<'a> {
    binder: VariableBinder<'a>,
}

impl<'a> PatchApplicator<'a> {
    pub fn new(registry: &'a BindingRegistry) -> Self {
        Self {
            binder: VariableBinder::new(registry),
        }
    }

    /// Patch `doc` in place. Fragments run strictly in config order because
    /// each one sees the tree left by the previous ones.
    pub fn apply(
        &self,
        doc: &mut SourceDocument,
        configs: &[&FileChangeConfig],
        options: &CodeChangeOptions,
        label: &str,
    ) -> Result<FilePatchOutcome> {
        let mut outcome = FilePatchOutcome::default();
        let file_table = self.binder.bind_file(doc);
        debug!("{}: {} placeholder binding(s)", label, file_table.len());

        for config in configs {
            for using in &config.usings {
                self.apply_using(doc, using, label, &mut outcome)?;
            }

            let class = config.class_name.as_deref();
            self.apply_members(doc, config, &file_table, options, label, &mut outcome)?;
            self.apply_attributes(doc, config, &file_table, options, label, &mut outcome)?;

            for (method, changes) in &config.methods {
                self.apply_method(doc, method, class, changes, &file_table, options, label, &mut outcome)?;
            }
        }

        Ok(outcome)
    }

    fn apply_using(
        &self,
        doc: &mut SourceDocument,
        using: &str,
        label: &str,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        if using_exists(&doc.usings(), using) {
            return Ok(());
        }

        let placement = using_placement(&doc.top_level_usings(), using);
        let description = format!("{}: added using {}", label, using_name(using));
        self.commit(doc, placement, description, outcome)
    }

    fn apply_members(
        &self,
        doc: &mut SourceDocument,
        config: &FileChangeConfig,
        table: &VariableBindingTable,
        options: &CodeChangeOptions,
        label: &str,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        if config.class_properties.is_empty() {
            return Ok(());
        }

        let target = ContainerRef::TypeBody { class: config.class_name.clone() };
        let Some(type_name) = doc.find_type(config.class_name.as_deref()).map(|t| t.name) else {
            outcome.warn(format!("{}: no target type found for properties", label));
            return Ok(());
        };

        for property in &config.class_properties {
            if !options.satisfies(&property.options) {
                continue;
            }
            let change = self.binder.apply(table, property);
            self.apply_fragment(doc, &target, &change, &type_name, label, outcome)?;
        }

        Ok(())
    }

    fn apply_attributes(
        &self,
        doc: &mut SourceDocument,
        config: &FileChangeConfig,
        table: &VariableBindingTable,
        options: &CodeChangeOptions,
        label: &str,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        for attribute in &config.class_attributes {
            if !options.satisfies(&attribute.options) {
                continue;
            }
            let change = self.binder.apply(table, attribute);

            let Some(ty) = doc.find_type(config.class_name.as_deref()) else {
                outcome.warn(format!("{}: no target type found for attributes", label));
                return Ok(());
            };
            if attribute_exists(&ty.attributes, change.check_text()) {
                continue;
            }

            let placement = attribute_placement(&ty, &change.block);
            let description = format!(
                "{}: added attribute [{}] to {}",
                label,
                attribute_text(&change.block),
                ty.name
            );
            self.commit(doc, placement, description, outcome)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_method(
        &self,
        doc: &mut SourceDocument,
        method: &str,
        class: Option<&str>,
        changes: &MethodChanges,
        file_table: &VariableBindingTable,
        options: &CodeChangeOptions,
        label: &str,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        let target = if method == GLOBAL_METHOD {
            ContainerRef::Global
        } else {
            ContainerRef::Method { name: method.to_string(), class: class.map(str::to_string) }
        };

        if doc.container(&target).is_none() {
            outcome.warn(format!("{}: method {} not found, skipping its fragments", label, method));
            return Ok(());
        }

        let parameters = self.binder.bind_parameters(doc, method, class, &changes.parameters);
        let table = file_table.overlaid(&parameters);

        for change in &changes.code_changes {
            if !options.satisfies(&change.options) {
                debug!("{}: fragment gated off by options: {}", label, change.block);
                continue;
            }
            let change = self.binder.apply(&table, change);
            self.apply_fragment(doc, &target, &change, method, label, outcome)?;
        }

        Ok(())
    }

    /// Check, place and splice one statement or member fragment
    fn apply_fragment(
        &self,
        doc: &mut SourceDocument,
        target: &ContainerRef,
        change: &CodeChange,
        scope: &str,
        label: &str,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        // Re-resolved per fragment: earlier splices shift every offset.
        let Some(container) = doc.container(target) else {
            outcome.warn(format!("{}: {} disappeared while patching", label, scope));
            return Ok(());
        };

        match &change.kind {
            ChangeKind::Default { insert_before, insert_after } => {
                if fragment_exists(&container, change.check_text()) {
                    debug!("{}: already present in {}: {}", label, scope, change.check_text());
                    return Ok(());
                }

                let anchor = resolve_anchor(&container, insert_before, insert_after);
                if anchor == Anchor::End && !(insert_before.is_empty() && insert_after.is_empty()) {
                    debug!("{}: no anchor matched in {}, appending", label, scope);
                }

                let block = terminated(&change.block);
                let placement =
                    sibling_placement(&container, anchor, &block, &change.leading_trivia, doc.text());
                let description = format!("{}: inserted `{}` in {}", label, first_line(&block), scope);
                self.commit(doc, placement, description, outcome)
            }
            ChangeKind::MemberAccess { parent } => {
                if change.check_block.is_some() && fragment_exists(&container, change.check_text()) {
                    return Ok(());
                }

                let Some(chain) = resolve_chain(doc, &container, parent) else {
                    outcome.warn(format!(
                        "{}: parent `{}` not found in {}, skipping `{}`",
                        label, parent, scope, first_line(&change.block)
                    ));
                    return Ok(());
                };
                if chained_call_exists(&chain.links, change.check_text()) {
                    debug!("{}: chain already carries {}", label, change.check_text());
                    return Ok(());
                }

                let placement = chain_placement(&chain, &change.block, &change.leading_trivia);
                let description = format!(
                    "{}: chained `.{}` onto `{}` in {}",
                    label,
                    first_line(change.block.trim().trim_start_matches('.')),
                    parent,
                    scope
                );
                self.commit(doc, placement, description, outcome)
            }
        }
    }

    /// Splice, then revert if a previously clean tree picked up syntax errors
    fn commit(
        &self,
        doc: &mut SourceDocument,
        placement: Placement,
        description: String,
        outcome: &mut FilePatchOutcome,
    ) -> Result<()> {
        let snapshot = (!doc.has_syntax_errors()).then(|| doc.text().to_string());

        doc.splice(placement.range, &placement.text)?;

        if let Some(snapshot) = snapshot {
            if doc.has_syntax_errors() {
                doc.replace_root(snapshot)?;
                outcome.warn(format!("rejected, would corrupt the file: {}", description));
                return Ok(());
            }
        }

        debug!("{}", description);
        outcome.summary.record(description);
        outcome.applied += 1;
        Ok(())
    }
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const STARTUP: &str = r#"using Microsoft.Extensions.DependencyInjection;

namespace WebApp
{
    public class Startup
    {
        public void ConfigureServices(IServiceCollection svc)
        {
            svc.AddControllers();
        }

        public void Configure(IApplicationBuilder app, bool isDev)
        {
            if (isDev)
            {
                app.UseDeveloperExceptionPage();
            }
            app.UseRouting();
            app.UseEndpoints(e => e.MapControllers());
        }
    }
}
"#;

    fn doc(name: &str, source: &str) -> SourceDocument {
        SourceDocument::from_source(name, source.to_string(), &Config::default().parsing).unwrap()
    }

    fn startup_config() -> FileChangeConfig {
        let methods = vec![
            (
                "ConfigureServices".to_string(),
                MethodChanges {
                    parameters: vec!["IServiceCollection".to_string()],
                    code_changes: vec![
                        CodeChange::new("services.AddAuthentication(\"Bearer\")"),
                        CodeChange::member_access("services.AddAuthentication(\"Bearer\")", "AddJwtBearer()"),
                    ],
                },
            ),
            (
                "Configure".to_string(),
                MethodChanges {
                    parameters: vec!["IApplicationBuilder".to_string()],
                    code_changes: vec![
                        CodeChange::new("app.UseDeveloperExceptionPage()"),
                        CodeChange::new("app.UseAuthentication()").insert_after("app.UseRouting()"),
                        CodeChange::new("app.UseAuthorization()").insert_after("app.UseAuthentication()"),
                    ],
                },
            ),
        ];

        FileChangeConfig {
            file_name: "Startup.cs".to_string(),
            usings: vec![
                "Microsoft.Identity.Web".to_string(),
                "Microsoft.Extensions.DependencyInjection".to_string(),
                "Microsoft.Identity.Web".to_string(),
            ],
            class_properties: vec![CodeChange::new("public string Name { get; set; }")],
            class_attributes: vec![CodeChange::new("Authorize")],
            methods,
            ..FileChangeConfig::default()
        }
    }

    #[test]
    fn test_applies_every_fragment_kind() {
        let registry = BindingRegistry::new(&Config::default().binding).unwrap();
        let applicator = PatchApplicator::new(&registry);
        let mut doc = doc("Startup.cs", STARTUP);
        let config = startup_config();

        let outcome = applicator
            .apply(&mut doc, &[&config], &CodeChangeOptions::default(), "Startup.cs")
            .unwrap();
        let text = doc.text();

        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(text.matches("using Microsoft.Identity.Web;").count(), 1);
        assert!(text.contains("[Authorize]\n    public class Startup"));
        assert!(text.contains("public string Name { get; set; }"));
        assert!(text.contains("svc.AddAuthentication(\"Bearer\").AddJwtBearer();"));
        assert!(text.contains("app.UseRouting();\n            app.UseAuthentication();\n            app.UseAuthorization();\n            app.UseEndpoints"));
        // present only inside the `if` block, so never duplicated at the top level
        assert_eq!(text.matches("app.UseDeveloperExceptionPage();").count(), 1);
        assert_eq!(outcome.applied, 7);
        assert_eq!(outcome.summary.len(), 7);
        assert!(!doc.has_syntax_errors());
    }

    #[test]
    fn test_second_application_is_a_no_op() {
        let registry = BindingRegistry::new(&Config::default().binding).unwrap();
        let applicator = PatchApplicator::new(&registry);
        let config = startup_config();
        let options = CodeChangeOptions::default();

        let mut once = doc("Startup.cs", STARTUP);
        applicator.apply(&mut once, &[&config], &options, "Startup.cs").unwrap();
        let after_first = once.text().to_string();

        let mut twice = doc("Startup.cs", &after_first);
        let outcome = applicator.apply(&mut twice, &[&config], &options, "Startup.cs").unwrap();

        assert_eq!(outcome.applied, 0);
        assert!(outcome.summary.is_empty());
        assert_eq!(twice.text(), after_first);
        assert!(!twice.is_modified());
    }

    #[test]
    fn test_missing_parent_and_method_are_warnings() {
        let registry = BindingRegistry::new(&Config::default().binding).unwrap();
        let applicator = PatchApplicator::new(&registry);
        let mut doc = doc("Startup.cs", STARTUP);

        let methods = vec![
            (
                "ConfigureServices".to_string(),
                MethodChanges {
                    parameters: vec![],
                    code_changes: vec![
                        CodeChange::member_access("svc.AddMvc()", "AddRazorRuntimeCompilation()"),
                        CodeChange::new("svc.AddRouting()"),
                    ],
                },
            ),
            ("Main".to_string(), MethodChanges::default()),
        ];
        let config = FileChangeConfig {
            file_name: "Startup.cs".to_string(),
            methods,
            ..FileChangeConfig::default()
        };

        let outcome = applicator
            .apply(&mut doc, &[&config], &CodeChangeOptions::default(), "Startup.cs")
            .unwrap();

        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.applied, 1);
        assert!(doc.text().contains("svc.AddControllers();\n            svc.AddRouting();"));
    }

    #[test]
    fn test_fragment_that_breaks_syntax_is_reverted() {
        let registry = BindingRegistry::new(&Config::default().binding).unwrap();
        let applicator = PatchApplicator::new(&registry);
        let mut doc = doc("Startup.cs", STARTUP);

        let methods = vec![
            (
                "Configure".to_string(),
                MethodChanges {
                    parameters: vec![],
                    code_changes: vec![CodeChange::new("app.Use((")],
                },
            ),
        ];
        let config = FileChangeConfig { file_name: "Startup.cs".to_string(), methods, ..Default::default() };

        let outcome = applicator
            .apply(&mut doc, &[&config], &CodeChangeOptions::default(), "Startup.cs")
            .unwrap();

        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(doc.text(), STARTUP);
    }

    #[test]
    fn test_fragment_options_gate_individual_changes() {
        let registry = BindingRegistry::new(&Config::default().binding).unwrap();
        let applicator = PatchApplicator::new(&registry);
        let mut doc = doc("Program.cs", "var builder = WebApplication.CreateBuilder(args);\nvar app = builder.Build();\napp.Run();\n");

        let methods = vec![
            (
                GLOBAL_METHOD.to_string(),
                MethodChanges {
                    parameters: vec![],
                    code_changes: vec![
                        CodeChange::new("builder.Services.AddGraph()").insert_before("var app = builder.Build()").with_options(&["MicrosoftGraph"]),
                        CodeChange::new("builder.Services.AddApi()").insert_before("var app = builder.Build()").with_options(&["!MicrosoftGraph"]),
                    ],
                },
            ),
        ];
        let config = FileChangeConfig { file_name: "Program.cs".to_string(), methods, ..Default::default() };

        applicator
            .apply(&mut doc, &[&config], &CodeChangeOptions::default(), "Program.cs")
            .unwrap();

        assert!(!doc.text().contains("AddGraph"));
        assert!(doc.text().contains("builder.Services.AddApi();\nvar app = builder.Build();"));
    }
}
