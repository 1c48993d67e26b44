//! Markdown heading/section addressing and mutation engine.
//!
//! This module parses documents into ordered heading trees and performs
//! structural reads and writes addressed by slug or hierarchical slug path:
//! - Deterministic slug generation with sibling disambiguation
//! - Hierarchical slug-path resolution through ancestor chains
//! - Section CRUD that fails fast instead of producing malformed documents

pub mod edit;
pub mod parse;
pub mod resolve;

pub use edit::{
    delete_section, insert_relative, read_section, rename_heading, replace_section_body,
    section_content_for_removal, InsertMode, SectionContent,
};
pub use parse::{
    document_stats, document_title, parse_document, section_span, slugify, DocumentStats, Heading,
    ParsedDocument, TocNode, MAX_HEADING_DEPTH,
};
pub use resolve::{ancestor_chain, resolve_slug};
