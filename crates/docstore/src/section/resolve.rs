//! Slug and hierarchical slug-path resolution.
//!
//! A flat slug addresses a heading through the parsed document's lookup
//! table. A hierarchical path like `api/auth/jwt-tokens` is resolved by
//! collecting candidate headings for the final segment and comparing each
//! candidate's reconstructed ancestor chain against the requested path.
//! Exact segment matches win over matches that only hold modulo numeric
//! disambiguation suffixes, so a generated path always resolves back to
//! the heading it was generated from.

use super::parse::{slugs_equivalent, ParsedDocument};

/// Resolves a flat slug or a hierarchical slug path to a heading index.
pub fn resolve_slug(parsed: &ParsedDocument, target: &str) -> Option<usize> {
    if target.contains('/') {
        resolve_hierarchical(parsed, target)
    } else {
        parsed.slug_lookup.get(target).copied()
    }
}

fn resolve_hierarchical(parsed: &ParsedDocument, target: &str) -> Option<usize> {
    let requested: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    if requested.is_empty() {
        return None;
    }

    // First pass: exact segment equality. Second pass: equality modulo
    // disambiguation suffixes (`authentication` matches `authentication-1`).
    find_match(parsed, &requested, |have, want| have == want)
        .or_else(|| find_match(parsed, &requested, slugs_equivalent))
}

fn find_match(
    parsed: &ParsedDocument,
    requested: &[&str],
    segment_eq: impl Fn(&str, &str) -> bool,
) -> Option<usize> {
    let leaf = *requested.last()?;
    for heading in &parsed.headings {
        if !segment_eq(&heading.slug, leaf) {
            continue;
        }
        let chain = ancestor_chain(parsed, heading.index);
        if chain_matches(&chain, requested, &segment_eq) {
            return Some(heading.index);
        }
    }
    None
}

/// Reconstructs the slug chain from the document root down to a heading by
/// walking its parent links (the nearest preceding heading of each smaller
/// depth).
pub fn ancestor_chain(parsed: &ParsedDocument, index: usize) -> Vec<String> {
    let mut chain = Vec::new();
    let mut cursor = Some(index);
    while let Some(idx) = cursor {
        let heading = &parsed.headings[idx];
        chain.push(heading.slug.clone());
        cursor = heading.parent;
    }
    chain.reverse();
    chain
}

/// A candidate chain matches a requested path when the shorter of the two
/// is a segment-wise suffix of the longer.
fn chain_matches(
    chain: &[String],
    requested: &[&str],
    segment_eq: impl Fn(&str, &str) -> bool,
) -> bool {
    let overlap = chain.len().min(requested.len());
    if overlap == 0 {
        return false;
    }
    chain
        .iter()
        .rev()
        .zip(requested.iter().rev())
        .take(overlap)
        .all(|(have, want)| segment_eq(have, want))
}
