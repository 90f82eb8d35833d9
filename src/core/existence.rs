//! Presence checks deciding whether a fragment is already in a file.

use super::normalize::{attribute_text, normalize_compact, normalize_lines, using_name};
use super::source_document::{ContainerKind, ContainerView, SyntaxItem};

/// A using is present when an existing directive has the same trimmed name.
pub fn using_exists(existing: &[SyntaxItem], candidate: &str) -> bool {
    let wanted = using_name(candidate);
    existing.iter().any(|item| using_name(&item.text) == wanted)
}

/// Members compare line by line after trimming whitespace and a trailing `;`,
/// so a multi-line member re-indented on insertion still matches.
pub fn member_exists(members: &ContainerView, candidate: &str) -> bool {
    let wanted = normalize_lines(candidate);
    members
        .items
        .iter()
        .any(|item| normalize_lines(&item.text) == wanted)
}

/// Attributes compare case-insensitively, with or without brackets.
pub fn attribute_exists(attributes: &[String], candidate: &str) -> bool {
    let wanted = attribute_text(candidate);
    attributes
        .iter()
        .any(|existing| attribute_text(existing).eq_ignore_ascii_case(wanted))
}

/// A statement is present when it appears anywhere in the block, including
/// inside nested conditionals and lambda bodies. A statement whose call chain
/// starts with the candidate also counts, so a base call that later fragments
/// chained onto is not inserted a second time.
pub fn statement_exists(block: &ContainerView, candidate: &str) -> bool {
    let wanted = normalize_compact(candidate);
    block
        .items
        .iter()
        .map(|item| item.text.as_str())
        .chain(block.nested.iter().map(String::as_str))
        .chain(block.chain_links.iter().map(String::as_str))
        .any(|text| normalize_compact(text) == wanted)
}

/// Top-level statements are compared as a flat sequence.
pub fn global_statement_exists(globals: &ContainerView, candidate: &str) -> bool {
    let wanted = normalize_compact(candidate);
    globals
        .items
        .iter()
        .map(|item| item.text.as_str())
        .chain(globals.chain_links.iter().map(String::as_str))
        .any(|text| normalize_compact(text) == wanted)
}

/// Dispatch on the container shape for sibling fragments.
pub fn fragment_exists(container: &ContainerView, candidate: &str) -> bool {
    match container.kind {
        ContainerKind::Members => member_exists(container, candidate),
        ContainerKind::Statements => statement_exists(container, candidate),
        ContainerKind::TopLevel => global_statement_exists(container, candidate),
    }
}

/// A chained call is present when one link of the chain spine equals it.
/// Calls nested in arguments of a link do not count.
pub fn chained_call_exists(links: &[String], candidate: &str) -> bool {
    let wanted = normalize_compact(candidate);
    let wanted = wanted.trim_start_matches('.');
    if wanted.is_empty() {
        return false;
    }
    links.iter().any(|link| normalize_compact(link) == wanted)
}
