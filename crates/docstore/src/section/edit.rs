//! Structural section mutations.
//!
//! Every operation reparses the document, resolves its target, and either
//! returns the full rewritten document or fails with a typed error leaving
//! the input untouched. Uniqueness among same-parent same-depth siblings is
//! enforced before any insert or rename, which is what keeps every
//! generated hierarchical path resolvable.

use super::parse::{
    parse_document, section_span, slugify, slugs_equivalent, Heading, ParsedDocument,
    MAX_HEADING_DEPTH,
};
use super::resolve::resolve_slug;
use crate::error::{DocStoreError, Result};

/// Placement of a newly inserted section relative to its reference heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Immediately above the reference heading.
    Before,
    /// After the reference heading's entire section, as its next sibling.
    After,
    /// As the reference heading's first child; depth is forced to
    /// `min(reference depth + 1, 6)`.
    AppendChild,
}

/// A heading plus the markdown of its section (heading line included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionContent {
    pub heading: Heading,
    pub content: String,
}

/// Reads one section by slug or hierarchical slug path.
///
/// Returns `None` for an unknown slug; missing sections are a condition
/// callers routinely branch on.
pub fn read_section(content: &str, slug: &str) -> Option<SectionContent> {
    let parsed = parse_document(content);
    let index = resolve_slug(&parsed, slug)?;
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_span(&parsed, index, lines.len());
    Some(SectionContent {
        heading: parsed.headings[index].clone(),
        content: lines[start..end].join("\n"),
    })
}

/// Replaces a section's body, preserving the heading line. The body spans
/// to the section's terminating heading, so subsections are replaced too.
pub fn replace_section_body(content: &str, slug: &str, body: &str) -> Result<String> {
    let parsed = parse_document(content);
    let index = resolve_slug(&parsed, slug)
        .ok_or_else(|| DocStoreError::HeadingNotFound(slug.to_string()))?;
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_span(&parsed, index, lines.len());

    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    result.extend_from_slice(&lines[..=start]);
    if !body.is_empty() {
        result.push("");
        result.extend(body.lines());
    }
    if end < lines.len() && result.last().is_some_and(|l| !l.is_empty()) {
        result.push("");
    }
    result.extend_from_slice(&lines[end..]);
    Ok(join_lines(&result, content))
}

/// Inserts a new heading and body relative to a reference heading.
pub fn insert_relative(
    content: &str,
    ref_slug: &str,
    mode: InsertMode,
    depth: u8,
    title: &str,
    body: &str,
) -> Result<String> {
    let parsed = parse_document(content);
    let ref_index = resolve_slug(&parsed, ref_slug)
        .ok_or_else(|| DocStoreError::HeadingNotFound(ref_slug.to_string()))?;
    let reference = &parsed.headings[ref_index];
    let lines: Vec<&str> = content.lines().collect();
    let (_, ref_end) = section_span(&parsed, ref_index, lines.len());

    let new_depth = match mode {
        InsertMode::AppendChild => (reference.depth + 1).min(MAX_HEADING_DEPTH),
        InsertMode::Before | InsertMode::After => depth.clamp(1, MAX_HEADING_DEPTH),
    };
    let insert_line = match mode {
        InsertMode::Before => reference.line,
        InsertMode::After => ref_end,
        // The reference's own body ends where its next heading begins.
        InsertMode::AppendChild => parsed.headings[ref_index + 1..]
            .iter()
            .map(|h| h.line)
            .find(|&l| l < ref_end)
            .unwrap_or(ref_end),
    };

    let new_slug = slugify(title);
    ensure_unique_sibling(&parsed, insert_line, new_depth, &new_slug, None)?;

    let heading_line = format!("{} {}", "#".repeat(new_depth as usize), title);
    let mut result: Vec<&str> = Vec::with_capacity(lines.len() + 4);
    result.extend_from_slice(&lines[..insert_line]);
    if result.last().is_some_and(|l| !l.is_empty()) {
        result.push("");
    }
    result.push(&heading_line);
    if !body.is_empty() {
        result.push("");
        result.extend(body.lines());
    }
    if insert_line < lines.len() && result.last().is_some_and(|l| !l.is_empty()) {
        result.push("");
    }
    result.extend_from_slice(&lines[insert_line..]);
    Ok(join_lines(&result, content))
}

/// Renames a heading in place; the slug changes with the title.
pub fn rename_heading(content: &str, slug: &str, new_title: &str) -> Result<String> {
    let parsed = parse_document(content);
    let index = resolve_slug(&parsed, slug)
        .ok_or_else(|| DocStoreError::HeadingNotFound(slug.to_string()))?;
    let heading = &parsed.headings[index];

    let new_slug = slugify(new_title);
    ensure_unique_sibling(&parsed, heading.line, heading.depth, &new_slug, Some(index))?;

    let mut lines: Vec<&str> = content.lines().collect();
    let heading_line = format!("{} {}", "#".repeat(heading.depth as usize), new_title);
    lines[heading.line] = &heading_line;
    Ok(join_lines(&lines, content))
}

/// Deletes a section, preserving the heading that terminates it (the next
/// heading at the same or smaller depth) so unrelated content is never
/// swallowed.
pub fn delete_section(content: &str, slug: &str) -> Result<String> {
    let parsed = parse_document(content);
    let index = resolve_slug(&parsed, slug)
        .ok_or_else(|| DocStoreError::HeadingNotFound(slug.to_string()))?;
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_span(&parsed, index, lines.len());

    let mut result: Vec<&str> = Vec::with_capacity(lines.len() - (end - start));
    result.extend_from_slice(&lines[..start]);
    result.extend_from_slice(&lines[end..]);
    // Collapse a doubled blank line left by the removal.
    if start > 0
        && start < result.len()
        && result[start - 1].is_empty()
        && result[start].is_empty()
    {
        result.remove(start);
    }
    Ok(join_lines(&result, content))
}

/// Read-only preview of exactly what [`delete_section`] would remove.
pub fn section_content_for_removal(content: &str, slug: &str) -> Option<String> {
    let parsed = parse_document(content);
    let index = resolve_slug(&parsed, slug)?;
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_span(&parsed, index, lines.len());
    Some(lines[start..end].join("\n"))
}

/// Rejects an insert or rename whose slug would collide with a sibling
/// (same computed parent, same depth).
fn ensure_unique_sibling(
    parsed: &ParsedDocument,
    at_line: usize,
    depth: u8,
    slug: &str,
    exclude: Option<usize>,
) -> Result<()> {
    // The prospective parent is the nearest heading above the insertion
    // point with a smaller depth.
    let parent = parsed
        .headings
        .iter()
        .take_while(|h| h.line < at_line)
        .filter(|h| h.depth < depth)
        .last()
        .map(|h| h.index);

    let collision = parsed.headings.iter().any(|h| {
        exclude != Some(h.index)
            && h.depth == depth
            && h.parent == parent
            && slugs_equivalent(&h.slug, slug)
    });
    if collision {
        return Err(DocStoreError::DuplicateHeading {
            slug: slug.to_string(),
            depth,
        });
    }
    Ok(())
}

/// Joins rewritten lines, preserving the original trailing-newline state.
fn join_lines(lines: &[&str], original: &str) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') && !joined.is_empty() {
        joined.push('\n');
    }
    joined
}
