mod anchor;
mod applicator;
mod binder;
mod change_set;
mod differ;
mod engine;
mod existence;
mod normalize;
mod orchestrator;
mod source_document;
mod summary;

// Language-specific parsing
mod languages;

pub use anchor::{Anchor, ChainTarget, Placement};
pub use applicator::{FilePatchOutcome, PatchApplicator};
pub use binder::{BindingRegistry, FactoryShape, VariableBinder, VariableBindingTable};
pub use change_set::{
    ChangeKind, ChangeSet, CodeChange, CodeChangeOptions, CodeChangeType, FileChangeConfig,
    LeadingTrivia, MethodChanges, GLOBAL_METHOD,
};
pub use differ::{content_hash, ContentDiffer};
pub use existence::{
    attribute_exists, chained_call_exists, fragment_exists, global_statement_exists,
    member_exists, statement_exists, using_exists,
};
pub use normalize::{normalize_compact, normalize_trim};
pub use orchestrator::BatchOrchestrator;
pub use source_document::{
    ContainerKind, ContainerRef, ContainerView, Declaration, SourceDocument, SyntaxItem, TypeView,
};
pub use summary::{BatchReport, ChangeSummary, FileReport};

// Export the main engine
pub use engine::Engine;
