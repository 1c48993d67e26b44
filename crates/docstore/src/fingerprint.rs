//! Fingerprint index: a lightweight inverted keyword index.
//!
//! Fingerprints are built from only the first bytes of each document (title
//! plus first lines), a deliberate precision/speed trade-off: the index is
//! a recall-oriented pre-filter for search, always followed by a precise
//! scoring pass over the reduced candidate set. A caller that skips the
//! index entirely must get identical final results, only slower.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use globset::GlobSet;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::path::{RootLayout, VirtualPath};

/// Minimum keyword length; shorter tokens carry too little signal.
const MIN_KEYWORD_LEN: usize = 3;

/// Common English words excluded from fingerprints. Sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
    "between", "both", "but", "can", "could", "did", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "her", "here", "hers", "him",
    "his", "how", "into", "its", "just", "more", "most", "not", "now", "off", "once", "only",
    "other", "our", "out", "over", "own", "same", "she", "should", "some", "such", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "those", "through", "too",
    "under", "until", "very", "was", "were", "what", "when", "where", "which", "while", "who",
    "why", "will", "with", "would", "you", "your",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Extracts up to `max` search keywords from a piece of text.
///
/// Tokens are lowercased, must be longer than two characters, not purely
/// numeric, and not stop words. Order of first occurrence is preserved.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if keywords.len() >= max {
            break;
        }
        if token.len() < MIN_KEYWORD_LEN {
            continue;
        }
        let word = token.to_lowercase();
        if word.chars().all(|c| c.is_ascii_digit()) || is_stop_word(&word) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// Truncated SHA-256 digest of a document's content preview.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Reads at most `limit` bytes of a file, lossily decoded, together with
/// its modification time. `Ok(None)` when the file does not exist.
pub fn read_preview(path: &Path, limit: usize) -> Result<Option<(String, SystemTime)>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let mtime = file.metadata()?.modified()?;
    let mut bytes = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut bytes)?;
    Ok(Some((String::from_utf8_lossy(&bytes).into_owned(), mtime)))
}

/// A per-document fingerprint.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub keywords: Vec<String>,
    pub modified_at: SystemTime,
    pub content_hash: String,
    pub namespace: String,
    pub generated_at: DateTime<Utc>,
}

/// Inverted index from keyword to document paths.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    keyword_paths: FnvHashMap<String, BTreeSet<String>>,
    fingerprints: FnvHashMap<String, Fingerprint>,
    preview_bytes: usize,
    max_keywords: usize,
}

impl FingerprintIndex {
    pub fn new(preview_bytes: usize, max_keywords: usize) -> Self {
        Self {
            keyword_paths: FnvHashMap::default(),
            fingerprints: FnvHashMap::default(),
            preview_bytes,
            max_keywords,
        }
    }

    /// Scans all markdown documents under both physical roots and builds
    /// fingerprints from their previews. Returns the number of indexed
    /// documents.
    pub fn initialize(&mut self, layout: &RootLayout, ignore: &GlobSet) -> Result<usize> {
        let mut indexed = 0;
        let mut files = Vec::new();
        collect_markdown_files(&layout.docs_root, &mut files)?;
        collect_markdown_files(&layout.coordinator_root, &mut files)?;

        for fs_path in files {
            let Some(vpath) = layout.virtual_path_for(&fs_path) else {
                continue;
            };
            if ignore.is_match(vpath.relative()) {
                continue;
            }
            let Some((preview, mtime)) = read_preview(&fs_path, self.preview_bytes)? else {
                continue;
            };
            self.insert_document(&vpath, &preview, mtime);
            indexed += 1;
        }
        log::debug!("fingerprint index initialized with {indexed} documents");
        Ok(indexed)
    }

    /// Inserts or refreshes a document's fingerprint from its preview.
    pub fn insert_document(&mut self, path: &VirtualPath, preview: &str, modified_at: SystemTime) {
        self.invalidate_document(path.as_str());

        let keywords = extract_keywords(preview, self.max_keywords);
        for keyword in &keywords {
            self.keyword_paths
                .entry(keyword.clone())
                .or_default()
                .insert(path.as_str().to_string());
        }
        self.fingerprints.insert(
            path.as_str().to_string(),
            Fingerprint {
                keywords,
                modified_at,
                content_hash: content_hash(preview),
                namespace: path.namespace().to_string(),
                generated_at: Utc::now(),
            },
        );
    }

    /// Removes a path from every keyword bucket and the fingerprint map.
    pub fn invalidate_document(&mut self, path: &str) {
        let Some(old) = self.fingerprints.remove(path) else {
            return;
        };
        for keyword in &old.keywords {
            if let Some(bucket) = self.keyword_paths.get_mut(keyword) {
                bucket.remove(path);
                if bucket.is_empty() {
                    self.keyword_paths.remove(keyword);
                }
            }
        }
    }

    /// Returns the union of documents containing any of the query's
    /// keywords: a recall-oriented candidate pre-filter, never an exact
    /// match.
    pub fn find_candidates(&self, query: &str) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for keyword in extract_keywords(query, self.max_keywords) {
            if let Some(bucket) = self.keyword_paths.get(&keyword) {
                candidates.extend(bucket.iter().cloned());
            }
        }
        candidates
    }

    pub fn fingerprint(&self, path: &str) -> Option<&Fingerprint> {
        self.fingerprints.get(path)
    }

    /// Whether any keyword bucket still references the path.
    pub fn references_path(&self, path: &str) -> bool {
        self.fingerprints.contains_key(path)
            || self.keyword_paths.values().any(|bucket| bucket.contains(path))
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// Recursively collects `.md` files under a root. A missing root is
/// treated as empty, not an error.
pub(crate) fn collect_markdown_files(root: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error.into()),
    };
    let mut children: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    children.sort();
    for child in children {
        if child.is_dir() {
            collect_markdown_files(&child, out)?;
        } else if child.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(child);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::fs;
    use tempfile::TempDir;

    fn layout_with_docs(docs: &[(&str, &str)]) -> (TempDir, RootLayout) {
        let temp = TempDir::new().unwrap();
        let docs_root = temp.path().join("docs");
        let coord_root = temp.path().join("coord");
        fs::create_dir_all(&docs_root).unwrap();
        fs::create_dir_all(&coord_root).unwrap();
        for (rel, content) in docs {
            let path = docs_root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (temp, RootLayout::new(docs_root, coord_root))
    }

    fn empty_ignore() -> GlobSet {
        StoreConfig::default().build_ignore_set().unwrap()
    }

    #[test]
    fn stop_words_are_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn keyword_extraction_rules() {
        let keywords = extract_keywords(
            "The JWT tokens and 12345 session-handling for OAuth2, by it",
            20,
        );
        assert_eq!(
            keywords,
            vec!["jwt", "tokens", "session", "handling", "oauth2"]
        );
    }

    #[test]
    fn keyword_cap_respected() {
        let text = (0..40).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(extract_keywords(&text, 20).len(), 20);
    }

    #[test]
    fn hash_is_truncated_and_stable() {
        let a = content_hash("# Title\n");
        assert_eq!(a.len(), 16);
        assert_eq!(a, content_hash("# Title\n"));
        assert_ne!(a, content_hash("# Other\n"));
    }

    #[test]
    fn initialize_indexes_both_roots() {
        let (_temp, layout) = layout_with_docs(&[
            ("specs/auth.md", "# Authentication\n\nJWT tokens.\n"),
            ("guides/setup.md", "# Setup Guide\n\nInstall dependencies.\n"),
        ]);
        fs::write(
            layout.coordinator_root.join("plan.md"),
            "# Sprint Plan\n\nAuthentication work.\n",
        )
        .unwrap();

        let mut index = FingerprintIndex::new(1500, 20);
        let count = index.initialize(&layout, &empty_ignore()).unwrap();
        assert_eq!(count, 3);

        let candidates = index.find_candidates("authentication");
        assert!(candidates.contains("/specs/auth.md"));
        assert!(candidates.contains("/coordinator/plan.md"));
        assert!(!candidates.contains("/guides/setup.md"));
    }

    #[test]
    fn preview_limit_bounds_keywords() {
        let mut content = String::from("# Padding\n\n");
        content.push_str(&"filler ".repeat(300)); // well past 1500 bytes
        content.push_str("\nuniquetrailer\n");
        let (_temp, layout) = layout_with_docs(&[("long.md", &content)]);

        let mut index = FingerprintIndex::new(1500, 20);
        index.initialize(&layout, &empty_ignore()).unwrap();

        // The trailer sits beyond the preview window.
        assert!(index.find_candidates("uniquetrailer").is_empty());
        assert!(index.find_candidates("padding").contains("/long.md"));
    }

    #[test]
    fn candidates_are_a_union_over_query_keywords() {
        let (_temp, layout) = layout_with_docs(&[
            ("a.md", "# Alpha\n\nrust caching\n"),
            ("b.md", "# Beta\n\neviction policy\n"),
            ("c.md", "# Gamma\n\nunrelated\n"),
        ]);
        let mut index = FingerprintIndex::new(1500, 20);
        index.initialize(&layout, &empty_ignore()).unwrap();

        let candidates = index.find_candidates("caching eviction");
        assert!(candidates.contains("/a.md"));
        assert!(candidates.contains("/b.md"));
        assert!(!candidates.contains("/c.md"));
    }

    #[test]
    fn candidates_superset_of_unindexed_scan() {
        let docs: &[(&str, &str)] = &[
            ("x/one.md", "# One\n\ncache invalidation strategy\n"),
            ("x/two.md", "# Two\n\nwatcher backoff polling\n"),
            ("y/three.md", "# Three\n\ninvalidation events\n"),
        ];
        let (_temp, layout) = layout_with_docs(docs);
        let mut index = FingerprintIndex::new(1500, 20);
        index.initialize(&layout, &empty_ignore()).unwrap();

        let query = "invalidation polling";
        let candidates = index.find_candidates(query);

        // Unindexed scan: recompute each document's keyword set and keep
        // those intersecting the query's keywords.
        let query_keywords = extract_keywords(query, 20);
        for (rel, _) in docs {
            let fs_path = layout.docs_root.join(rel);
            let (preview, _) = read_preview(&fs_path, 1500).unwrap().unwrap();
            let keywords = extract_keywords(&preview, 20);
            let matches = query_keywords.iter().any(|k| keywords.contains(k));
            if matches {
                let vpath = layout.virtual_path_for(&fs_path).unwrap();
                assert!(candidates.contains(vpath.as_str()), "missing {vpath}");
            }
        }
    }

    #[test]
    fn invalidation_clears_all_buckets() {
        let (_temp, layout) = layout_with_docs(&[("a.md", "# Alpha\n\ncaching eviction\n")]);
        let mut index = FingerprintIndex::new(1500, 20);
        index.initialize(&layout, &empty_ignore()).unwrap();
        assert!(index.references_path("/a.md"));

        index.invalidate_document("/a.md");
        assert!(!index.references_path("/a.md"));
        assert!(index.find_candidates("caching").is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn ignored_paths_are_skipped() {
        let (_temp, layout) = layout_with_docs(&[
            ("keep.md", "# Keep\n\nsignal\n"),
            ("drafts/skip.md", "# Skip\n\nsignal\n"),
        ]);
        let config = StoreConfig {
            watch_ignore: vec!["drafts/**".to_string()],
            ..StoreConfig::default()
        };
        let mut index = FingerprintIndex::new(1500, 20);
        index.initialize(&layout, &config.build_ignore_set().unwrap()).unwrap();

        let candidates = index.find_candidates("signal");
        assert!(candidates.contains("/keep.md"));
        assert!(!candidates.contains("/drafts/skip.md"));
    }
}
