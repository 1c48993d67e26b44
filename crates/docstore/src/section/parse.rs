//! Markdown heading parsing.
//!
//! Parses a document into an ordered heading list with deterministic,
//! collision-disambiguated slugs, a parent chain, and a table-of-contents
//! tree. Headings inside fenced code blocks are not headings.

use fnv::FnvHashMap;

/// Maximum ATX heading depth.
pub const MAX_HEADING_DEPTH: u8 = 6;

/// One node in a document's heading tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Zero-based document-order index.
    pub index: usize,
    /// Heading depth, 1-6.
    pub depth: u8,
    /// Title text without the leading hashes.
    pub title: String,
    /// Slug derived from the title, disambiguated among same-parent
    /// same-depth siblings with numeric suffixes.
    pub slug: String,
    /// Index of the nearest preceding heading of smaller depth.
    pub parent: Option<usize>,
    /// Zero-based line number of the heading in the document.
    pub line: usize,
}

/// A table-of-contents tree node referring into the flat heading list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub index: usize,
    pub children: Vec<TocNode>,
}

/// A parsed document: the flat heading list plus derived lookup structures.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub headings: Vec<Heading>,
    /// Slug to heading index. On cross-parent slug reuse the first heading
    /// in document order wins; hierarchical resolution disambiguates.
    pub slug_lookup: FnvHashMap<String, usize>,
    pub toc: Vec<TocNode>,
}

/// Word, link, and fenced-code-block counts for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentStats {
    pub word_count: usize,
    pub link_count: usize,
    pub code_block_count: usize,
}

/// Derives a URL-safe slug from a heading title.
///
/// Lowercases, maps runs of non-alphanumeric characters to a single `-`,
/// and trims. An all-punctuation title slugs to `section`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}

/// Strips a trailing numeric disambiguation suffix (`-1`, `-2`, ...).
pub fn strip_disambiguation(slug: &str) -> &str {
    match slug.rsplit_once('-') {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => slug,
    }
}

/// Whether two slugs address the same heading modulo disambiguation
/// suffixes (`authentication` matches `authentication-1` and vice versa).
pub fn slugs_equivalent(a: &str, b: &str) -> bool {
    a == b || strip_disambiguation(a) == b || a == strip_disambiguation(b)
}

/// Parses a markdown document into its heading structure.
pub fn parse_document(content: &str) -> ParsedDocument {
    let mut headings: Vec<Heading> = Vec::new();
    let mut base_slugs: Vec<String> = Vec::new();
    let mut fence: Option<char> = None;

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(fence_char) = fence_marker(trimmed) {
            match fence {
                Some(open) if open == fence_char => fence = None,
                Some(_) => {}
                None => fence = Some(fence_char),
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }

        let Some((depth, title)) = parse_atx_heading(line) else {
            continue;
        };

        let index = headings.len();
        let parent = headings
            .iter()
            .rev()
            .find(|h| h.depth < depth)
            .map(|h| h.index);
        let base = slugify(&title);
        let collisions = headings
            .iter()
            .filter(|h| h.parent == parent && h.depth == depth && base_slugs[h.index] == base)
            .count();
        let slug = if collisions == 0 {
            base.clone()
        } else {
            format!("{base}-{collisions}")
        };

        base_slugs.push(base);
        headings.push(Heading {
            index,
            depth,
            title,
            slug,
            parent,
            line: line_no,
        });
    }

    let mut slug_lookup = FnvHashMap::default();
    for heading in &headings {
        slug_lookup.entry(heading.slug.clone()).or_insert(heading.index);
    }
    let toc = build_toc(&headings);

    ParsedDocument {
        headings,
        slug_lookup,
        toc,
    }
}

/// Recognizes an ATX heading line, returning its depth and title.
fn parse_atx_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > MAX_HEADING_DEPTH as usize {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    // Strip an optional closing hash sequence ("## Title ##").
    let mut title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    if without_closing.len() < title.len() && without_closing.ends_with(' ') {
        title = without_closing.trim_end();
    }
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title.to_string()))
}

/// Returns the fence character if the line opens or closes a fenced block.
fn fence_marker(trimmed: &str) -> Option<char> {
    for fence_char in ['`', '~'] {
        let run = trimmed.chars().take_while(|&c| c == fence_char).count();
        if run >= 3 {
            return Some(fence_char);
        }
    }
    None
}

fn build_toc(headings: &[Heading]) -> Vec<TocNode> {
    fn children_of(headings: &[Heading], parent: Option<usize>) -> Vec<TocNode> {
        headings
            .iter()
            .filter(|h| h.parent == parent)
            .map(|h| TocNode {
                index: h.index,
                children: children_of(headings, Some(h.index)),
            })
            .collect()
    }
    children_of(headings, None)
}

/// Computes the line span `[start, end)` of a heading's section, including
/// the heading line itself. The section ends at the next heading of the
/// same or smaller depth, or at the end of the document.
pub fn section_span(parsed: &ParsedDocument, index: usize, line_count: usize) -> (usize, usize) {
    let heading = &parsed.headings[index];
    let end = parsed.headings[index + 1..]
        .iter()
        .find(|h| h.depth <= heading.depth)
        .map(|h| h.line)
        .unwrap_or(line_count);
    (heading.line, end)
}

/// Computes word, link, and code-block counts for a document.
pub fn document_stats(content: &str) -> DocumentStats {
    let mut code_block_count = 0;
    let mut fence: Option<char> = None;
    for line in content.lines() {
        if let Some(fence_char) = fence_marker(line.trim_start()) {
            match fence {
                Some(open) if open == fence_char => fence = None,
                Some(_) => {}
                None => {
                    fence = Some(fence_char);
                    code_block_count += 1;
                }
            }
        }
    }
    DocumentStats {
        word_count: content.split_whitespace().count(),
        link_count: memchr::memmem::find_iter(content.as_bytes(), b"](").count(),
        code_block_count,
    }
}

/// The document title: the first top-level heading, if any.
pub fn document_title(parsed: &ParsedDocument) -> Option<&str> {
    parsed
        .headings
        .iter()
        .find(|h| h.depth == 1)
        .map(|h| h.title.as_str())
}
