//! Idempotent, declarative patching of C# source files.
//!
//! A change-set names target files and the usings, members, attributes and
//! statements each must contain. Running it inserts only what is missing,
//! next to the anchors it names, so a second run changes nothing.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
