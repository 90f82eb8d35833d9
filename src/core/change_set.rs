//! Declarative change-set model.
//!
//! The JSON shape (PascalCase keys, `Files` -> `Methods` -> `CodeChanges`) is
//! the contract external collaborators author against. Fragments are read
//! through a flat wire struct and converted into [`CodeChange`], whose
//! [`ChangeKind`] carries only the fields each insertion style needs.

use std::collections::BTreeSet;
use std::path::Path;

use globset::Glob;
use serde::{Deserialize, Serialize};
use serde_with::formats::PreferMany;
use serde_with::{serde_as, Map, OneOrMany};

use crate::error::{GraftError, Result};

/// Reserved method key addressing top-level statements
pub const GLOBAL_METHOD: &str = "Global";

/// A complete change-set: every file the run may touch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    pub files: Vec<FileChangeConfig>,
}

/// Everything to ensure present in one target file
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileChangeConfig {
    /// File name, root-relative path, or glob
    pub file_name: String,

    /// Options that must all hold for this config to apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usings: Vec<String>,

    /// Type receiving properties and attributes (defaults to the file's main type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_properties: Vec<CodeChange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_attributes: Vec<CodeChange>,

    /// Method name (or `Global`) -> fragments for that body, in authored order
    #[serde_as(as = "Map<_, _>")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<(String, MethodChanges)>,
}

impl FileChangeConfig {
    /// Fragments for one method key
    pub fn method(&self, name: &str) -> Option<&MethodChanges> {
        self.methods
            .iter()
            .find(|(method, _)| method == name)
            .map(|(_, changes)| changes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodChanges {
    /// Parameter types whose actual names should be bound for these fragments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,

    #[serde(default)]
    pub code_changes: Vec<CodeChange>,
}

/// How a fragment attaches to existing code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// Sibling statement or member, placed by anchors or appended
    Default {
        insert_before: Vec<String>,
        insert_after: Vec<String>,
    },
    /// Chained onto the call expression matching `parent`
    MemberAccess { parent: String },
}

impl Default for ChangeKind {
    fn default() -> Self {
        ChangeKind::Default {
            insert_before: Vec::new(),
            insert_after: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChangeType {
    #[default]
    Default,
    MemberAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeadingTrivia {
    /// Blank line before a sibling fragment; own line for a chained call
    #[serde(default)]
    pub newline: bool,

    /// Indentation in spaces; absent means inherit from the neighbouring code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_spaces: Option<usize>,
}

/// A single edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireCodeChange", into = "WireCodeChange")]
pub struct CodeChange {
    pub block: String,
    pub check_block: Option<String>,
    pub kind: ChangeKind,
    pub leading_trivia: LeadingTrivia,
    pub options: Vec<String>,
}

impl CodeChange {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            check_block: None,
            kind: ChangeKind::default(),
            leading_trivia: LeadingTrivia::default(),
            options: Vec::new(),
        }
    }

    pub fn member_access(parent: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::MemberAccess { parent: parent.into() },
            ..Self::new(block)
        }
    }

    pub fn with_check_block(mut self, check: impl Into<String>) -> Self {
        self.check_block = Some(check.into());
        self
    }

    pub fn insert_before(mut self, anchor: impl Into<String>) -> Self {
        if let ChangeKind::Default { insert_before, .. } = &mut self.kind {
            insert_before.push(anchor.into());
        }
        self
    }

    pub fn insert_after(mut self, anchor: impl Into<String>) -> Self {
        if let ChangeKind::Default { insert_after, .. } = &mut self.kind {
            insert_after.push(anchor.into());
        }
        self
    }

    pub fn with_leading_trivia(mut self, newline: bool, number_of_spaces: Option<usize>) -> Self {
        self.leading_trivia = LeadingTrivia { newline, number_of_spaces };
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Text used for presence checks
    pub fn check_text(&self) -> &str {
        self.check_block.as_deref().unwrap_or(&self.block)
    }
}

/// Flat on-the-wire shape of a fragment
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCodeChange {
    block: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_block: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,

    #[serde_as(as = "OneOrMany<_, PreferMany>")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    insert_before: Vec<String>,

    #[serde_as(as = "OneOrMany<_, PreferMany>")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    insert_after: Vec<String>,

    #[serde(default)]
    code_change_type: CodeChangeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    leading_trivia: Option<LeadingTrivia>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

impl TryFrom<WireCodeChange> for CodeChange {
    type Error = String;

    fn try_from(wire: WireCodeChange) -> std::result::Result<Self, Self::Error> {
        let kind = match wire.code_change_type {
            CodeChangeType::Default => {
                if wire.parent.is_some() {
                    tracing::debug!("Ignoring Parent on a Default fragment: {}", wire.block);
                }
                ChangeKind::Default {
                    insert_before: wire.insert_before,
                    insert_after: wire.insert_after,
                }
            }
            CodeChangeType::MemberAccess => match wire.parent {
                Some(parent) if !parent.trim().is_empty() => ChangeKind::MemberAccess { parent },
                _ => {
                    return Err(format!(
                        "MemberAccess fragment `{}` has no Parent",
                        wire.block
                    ))
                }
            },
        };

        Ok(CodeChange {
            block: wire.block,
            check_block: wire.check_block,
            kind,
            leading_trivia: wire.leading_trivia.unwrap_or_default(),
            options: wire.options,
        })
    }
}

impl From<CodeChange> for WireCodeChange {
    fn from(change: CodeChange) -> Self {
        let leading_trivia = (change.leading_trivia != LeadingTrivia::default())
            .then_some(change.leading_trivia);

        let mut wire = WireCodeChange {
            block: change.block,
            check_block: change.check_block,
            leading_trivia,
            options: change.options,
            ..WireCodeChange::default()
        };

        match change.kind {
            ChangeKind::Default { insert_before, insert_after } => {
                wire.insert_before = insert_before;
                wire.insert_after = insert_after;
            }
            ChangeKind::MemberAccess { parent } => {
                wire.code_change_type = CodeChangeType::MemberAccess;
                wire.parent = Some(parent);
            }
        }

        wire
    }
}

/// Feature flags computed once per project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeChangeOptions {
    enabled: BTreeSet<String>,
}

impl CodeChangeOptions {
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: flags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }

    /// True when every required option holds; `!Flag` requires `Flag` to be unset.
    pub fn satisfies(&self, required: &[String]) -> bool {
        required.iter().all(|option| match option.strip_prefix('!') {
            Some(negated) => !self.is_enabled(negated.trim()),
            None => self.is_enabled(option.trim()),
        })
    }
}

impl ChangeSet {
    /// Load a change-set from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a change-set from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let change_set: ChangeSet = serde_json::from_str(content)
            .map_err(|e| GraftError::MalformedChangeSet(e.to_string()))?;
        change_set.validate()?;
        Ok(change_set)
    }

    /// Structural validation; any failure aborts the run before files are touched.
    pub fn validate(&self) -> Result<()> {
        for (index, file) in self.files.iter().enumerate() {
            let context = format!("Files[{}]", index);

            if file.file_name.trim().is_empty() {
                return Err(malformed(&context, "FileName is empty"));
            }
            if is_glob(&file.file_name) {
                Glob::new(&file.file_name)
                    .map_err(|e| malformed(&context, &format!("invalid glob: {}", e)))?;
            }
            for using in &file.usings {
                if super::normalize::using_name(using).is_empty() {
                    return Err(malformed(&context, "empty using"));
                }
            }
            for property in &file.class_properties {
                validate_change(&format!("{}.ClassProperties", context), property)?;
            }
            for attribute in &file.class_attributes {
                validate_change(&format!("{}.ClassAttributes", context), attribute)?;
            }
            let mut seen = BTreeSet::new();
            for (method, changes) in &file.methods {
                if method.trim().is_empty() {
                    return Err(malformed(&context, "empty method name in Methods"));
                }
                if !seen.insert(method.as_str()) {
                    return Err(malformed(&context, &format!("duplicate method {} in Methods", method)));
                }
                for change in &changes.code_changes {
                    validate_change(&format!("{}.Methods[{}]", context, method), change)?;
                }
            }
        }

        Ok(())
    }
}

fn validate_change(context: &str, change: &CodeChange) -> Result<()> {
    if change.block.trim().is_empty() {
        return Err(malformed(context, "fragment Block is empty"));
    }
    if matches!(&change.check_block, Some(check) if check.trim().is_empty()) {
        return Err(malformed(context, "fragment CheckBlock is empty"));
    }
    if let ChangeKind::MemberAccess { parent } = &change.kind {
        if parent.trim().is_empty() {
            return Err(malformed(context, "MemberAccess fragment has no Parent"));
        }
    }
    Ok(())
}

fn malformed(context: &str, message: &str) -> GraftError {
    GraftError::MalformedChangeSet(format!("{}: {}", context, message))
}

/// Whether a file name should be matched as a glob
pub fn is_glob(file_name: &str) -> bool {
    file_name.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Identifier": "webapi-auth",
        "Files": [
            {
                "FileName": "Program.cs",
                "Options": ["MinimalApp"],
                "Usings": ["Microsoft.Identity.Web"],
                "Methods": {
                    "Global": {
                        "CodeChanges": [
                            {
                                "Block": "builder.Services.AddAuthentication()",
                                "InsertAfter": "var builder = WebApplication.CreateBuilder(args)",
                                "LeadingTrivia": { "Newline": true, "NumberOfSpaces": 0 }
                            },
                            {
                                "Block": "AddMicrosoftIdentityWebApi(builder.Configuration)",
                                "Parent": "builder.Services.AddAuthentication()",
                                "CodeChangeType": "MemberAccess",
                                "Options": ["!MicrosoftGraph"]
                            }
                        ]
                    }
                }
            }
        ]
    }"#;

    #[test]
    fn test_parses_wire_format_into_tagged_kinds() {
        let change_set = ChangeSet::from_json(SAMPLE).unwrap();
        let file = &change_set.files[0];
        let changes = &file.method(GLOBAL_METHOD).unwrap().code_changes;

        assert_eq!(change_set.identifier.as_deref(), Some("webapi-auth"));
        assert_eq!(
            changes[0].kind,
            ChangeKind::Default {
                insert_before: vec![],
                insert_after: vec!["var builder = WebApplication.CreateBuilder(args)".to_string()],
            }
        );
        assert_eq!(changes[0].leading_trivia, LeadingTrivia { newline: true, number_of_spaces: Some(0) });
        assert_eq!(
            changes[1].kind,
            ChangeKind::MemberAccess { parent: "builder.Services.AddAuthentication()".to_string() }
        );
    }

    #[test]
    fn test_serializes_back_to_same_shape() {
        let change_set = ChangeSet::from_json(SAMPLE).unwrap();
        let json = serde_json::to_string(&change_set).unwrap();
        let reparsed = ChangeSet::from_json(&json).unwrap();

        assert_eq!(reparsed, change_set);
        assert!(json.contains("\"CodeChangeType\":\"MemberAccess\""));
        assert!(json.contains("\"InsertAfter\":[\"var builder = WebApplication.CreateBuilder(args)\"]"));
    }

    #[test]
    fn test_member_access_without_parent_is_malformed() {
        let json = r#"{ "Files": [ { "FileName": "A.cs", "Methods": { "Main": { "CodeChanges": [
            { "Block": "X()", "CodeChangeType": "MemberAccess" } ] } } } ] }"#;

        let err = ChangeSet::from_json(json).unwrap_err();
        assert!(matches!(err, GraftError::MalformedChangeSet(_)));
    }

    #[test]
    fn test_methods_keep_authored_order() {
        let json = r#"{ "Files": [ { "FileName": "Startup.cs", "Methods": {
            "ConfigureServices": { "CodeChanges": [ { "Block": "services.AddAuthorization()" } ] },
            "Configure": { "CodeChanges": [ { "Block": "app.UseAuthorization()" } ] }
        } } ] }"#;

        let change_set = ChangeSet::from_json(json).unwrap();
        let names: Vec<&str> = change_set.files[0].methods.iter().map(|(name, _)| name.as_str()).collect();

        assert_eq!(names, vec!["ConfigureServices", "Configure"]);
        assert!(change_set.files[0].method("Configure").is_some());
        assert!(change_set.files[0].method("Main").is_none());
    }

    #[test]
    fn test_duplicate_method_key_is_malformed() {
        let json = r#"{ "Files": [ { "FileName": "Startup.cs", "Methods": {
            "Configure": { "CodeChanges": [ { "Block": "app.UseRouting()" } ] },
            "Configure": { "CodeChanges": [ { "Block": "app.UseAuthorization()" } ] }
        } } ] }"#;

        let err = ChangeSet::from_json(json).unwrap_err();
        assert!(matches!(err, GraftError::MalformedChangeSet(ref m) if m.contains("duplicate method Configure")));
    }

    #[test]
    fn test_validate_rejects_empty_block_and_bad_glob() {
        let mut change_set = ChangeSet {
            identifier: None,
            files: vec![FileChangeConfig {
                file_name: "Startup.cs".to_string(),
                class_properties: vec![CodeChange::new("  ")],
                ..FileChangeConfig::default()
            }],
        };
        assert!(change_set.validate().is_err());

        change_set.files[0].class_properties.clear();
        change_set.files[0].file_name = "src/[.cs".to_string();
        assert!(change_set.validate().is_err());
    }

    #[test]
    fn test_options_filter_with_negation() {
        let options = CodeChangeOptions::new(["MinimalApp"]);

        assert!(options.satisfies(&[]));
        assert!(options.satisfies(&["MinimalApp".to_string()]));
        assert!(options.satisfies(&["MinimalApp".to_string(), "!MicrosoftGraph".to_string()]));
        assert!(!options.satisfies(&["MinimalApp".to_string(), "DownstreamApi".to_string()]));
        assert!(!options.satisfies(&["!MinimalApp".to_string()]));
    }
}
